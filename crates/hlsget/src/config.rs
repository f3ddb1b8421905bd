use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Headers every request carries unless the caller overrides them
const BASE_HEADERS: [(reqwest::header::HeaderName, &str); 3] = [
    (CONNECTION, "keep-alive"),
    (ACCEPT, "*/*"),
    (ACCEPT_LANGUAGE, "en-US,en;q=0.5,zh-CN;q=0.3,zh;q=0.2"),
];

/// HTTP options shared by playlist, key and segment requests
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Whole-request limit. Zero means none: segments can be large, and
    /// `read_timeout` already catches stalled bodies.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Max silence between two body chunks
    pub read_timeout: Duration,
    pub follow_redirects: bool,
    pub user_agent: String,
    /// Caller headers, layered over the base set when the client is built
    pub headers: HeaderMap,
    pub proxy: Option<ProxyConfig>,
    pub use_system_proxy: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30 * 60),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HeaderMap::new(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl DownloaderConfig {
    pub fn builder() -> crate::builder::DownloaderConfigBuilder {
        crate::builder::DownloaderConfigBuilder::new()
    }

    /// Headers actually sent: the base set with caller headers on top
    pub fn merged_headers(&self) -> HeaderMap {
        let mut headers: HeaderMap = BASE_HEADERS
            .into_iter()
            .map(|(name, value)| (name, HeaderValue::from_static(value)))
            .collect();
        headers.extend(self.headers.clone());
        headers
    }
}
