use reqwest::Client;
use std::time::Duration;

use super::providers::{ProviderError, ProxyConfig};

/// Common HTTP client builder shared by all provider clients. Handles the
/// per-provider proxy configuration and request timeout.
pub fn build_http_client(
    base_url: &str,
    proxy_config: Option<&ProxyConfig>,
    timeout: Option<Duration>,
) -> Result<Client, ProviderError> {
    let mut client_builder = Client::builder();

    if let Some(timeout) = timeout {
        client_builder = client_builder.timeout(timeout);
    }

    if let Some(proxy_config) = proxy_config {
        if proxy_config.enabled && !proxy_config.url.is_empty() {
            let proxy_url = reqwest::Url::parse(&proxy_config.url).map_err(|_| {
                ProviderError::Configuration("invalid proxy URL format".to_string())
            })?;
            match proxy_url.scheme() {
                "http" | "https" | "socks5" => {}
                scheme => {
                    return Err(ProviderError::Configuration(format!(
                        "unsupported proxy protocol '{}'",
                        scheme
                    )));
                }
            }

            // Respect the no_proxy list for the provider's own host.
            let should_use_proxy = if let Ok(url) = reqwest::Url::parse(base_url) {
                !proxy_config.no_proxy.iter().any(|no_proxy_host| {
                    url.host_str()
                        .map(|host| host.contains(no_proxy_host) || no_proxy_host.contains(host))
                        .unwrap_or(false)
                })
            } else {
                true
            };

            if should_use_proxy {
                let mut proxy = reqwest::Proxy::all(&proxy_config.url)?;

                if let (Some(username), Some(password)) =
                    (&proxy_config.username, &proxy_config.password)
                {
                    proxy = proxy.basic_auth(username, password);
                }

                client_builder = client_builder.proxy(proxy);
            }
        }

        if proxy_config.ignore_ssl_certificates {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }
    }

    Ok(client_builder.build()?)
}
