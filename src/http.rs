use crate::error::Error;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Per-VU HTTP client settings, from the script's `[http]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub insecure: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            insecure: false,
        }
    }
}

/// Build the HTTP client owned by a single VU. Every VU gets its own cookie
/// jar and connection pool; nothing is shared between VUs.
pub fn create_vu_client(settings: &HttpSettings) -> Result<Client, Error> {
    let client = Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.timeout)
        .tcp_nodelay(true)
        .gzip(true)
        .brotli(true)
        .user_agent(format!("stampede/{}", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(settings.insecure)
        .cookie_store(true)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}
