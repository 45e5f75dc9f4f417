//! Shared HTTP client construction for provider adapters.

use std::time::Duration;

/// Upper bound for one provider call, sized for long recordings.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Create the HTTP client shared by all adapters.
///
/// Config: 30s connect timeout, `request_timeout` for the whole call, rustls TLS,
/// `vela/{version}` user-agent, redirect limit 10. A call that runs past the bound
/// fails with a timeout error, which classifies as transient.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn transcription_client(request_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(request_timeout)
        .user_agent(concat!("vela/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_default_timeout() {
        assert!(transcription_client(DEFAULT_REQUEST_TIMEOUT).is_ok());
    }
}
