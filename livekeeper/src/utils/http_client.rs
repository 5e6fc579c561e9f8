//! Shared reqwest client construction.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

/// Install the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a client with `timeout` and an optional user agent.
///
/// Falls back to a default client if the builder rejects the settings.
pub fn build_client(timeout: Duration, user_agent: Option<&str>) -> Client {
    install_rustls_provider();

    let mut builder = Client::builder();
    if timeout > Duration::ZERO {
        builder = builder.timeout(timeout);
    }
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua.to_string());
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using defaults");
        Client::new()
    })
}
