//! # DownloaderConfigBuilder
//!
//! HTTP settings for playlist, key and segment requests. Many HLS CDNs
//! refuse requests without the `Referer` or cookies of the page that embeds
//! the player, so those have their own setters.
//!
//! ```
//! use std::time::Duration;
//! use hlsget_engine::DownloaderConfig;
//!
//! let config = DownloaderConfig::builder()
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_referer("https://player.example.com/")
//!     .with_cookie("session=abc")
//!     .build();
//! assert_eq!(config.headers["referer"], "https://player.example.com/");
//! ```

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER};
use tracing::warn;

use crate::{DownloaderConfig, proxy::ProxyConfig};

#[derive(Debug, Clone, Default)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-request timeout; zero leaves requests unbounded
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Longest gap allowed between two body chunks
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add one header. A name or value that is not valid HTTP is logged and dropped.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let (name, value) = (name.as_ref(), value.as_ref());
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            (Err(_), _) => warn!(header = name, "Dropping header with an invalid name"),
            (_, Err(_)) => warn!(header = name, "Dropping header with an invalid value"),
        }
        self
    }

    /// Replace all caller headers. The base set still applies underneath.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    pub fn with_referer(self, referer: impl AsRef<str>) -> Self {
        self.with_header(REFERER, referer)
    }

    pub fn with_cookie(self, cookie: impl AsRef<str>) -> Self {
        self.with_header(COOKIE, cookie)
    }

    /// An explicit proxy turns the system proxy off
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false;
        self
    }

    /// Ignored once an explicit proxy is set
    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.config.use_system_proxy = enabled && self.config.proxy.is_none();
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}
