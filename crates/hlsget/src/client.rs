use reqwest::{Client, Proxy};
use tracing::{debug, info};

use crate::{DownloadError, DownloaderConfig};

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5) // Allow multiple connections to same host
        .user_agent(&config.user_agent)
        .default_headers(config.merged_headers())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        // Explicit proxy configuration takes precedence
        client_builder = client_builder.proxy(Proxy::try_from(proxy_config)?);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy for downloads");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings for downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for downloads");
    }

    client_builder.build().map_err(DownloadError::from)
}
