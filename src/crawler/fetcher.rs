//! HTTP fetch layer
//!
//! Builds one HTTP client per identity, so proxy egress and browser
//! fingerprint stay paired for the life of a session, and classifies every
//! fetch into an outcome the throttling layer can reason about. Every fetch
//! runs under a hard deadline; a slow source can never wedge the pipeline.

use crate::config::FetchConfig;
use crate::identity::{BrowsingSession, Identity};
use crate::StatlineError;
use reqwest::{Client, Proxy, StatusCode};
use std::time::{Duration, Instant};

/// Classified result of a single fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx response with a body
    Success {
        /// Final URL after redirects
        final_url: String,
        status_code: u16,
        body: String,
        latency: Duration,
    },

    /// HTTP 429; the source is rate limiting us
    RateLimited,

    /// Any other non-2xx status
    HttpError { status_code: u16 },

    /// Connection-level failure (refused, reset, TLS, client timeout)
    Transport { message: String },

    /// The hard deadline elapsed before the response completed
    DeadlineExceeded,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether this outcome indicates the source (or the network) pushed
    /// back, as opposed to an ordinary HTTP error like a 404
    pub fn is_pushback(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Transport { .. } | Self::DeadlineExceeded
        )
    }
}

/// Builds an HTTP client bound to one identity
///
/// The user agent comes from the identity's header profile and the proxy
/// from its egress, so every request through this client presents the same
/// fingerprint from the same network location. No per-request timeout is
/// set on the client; the hard deadline in [`fetch_page`] owns that bound.
pub fn build_identity_client(
    identity: &Identity,
    config: &FetchConfig,
) -> Result<Client, StatlineError> {
    let mut builder = Client::builder()
        .user_agent(identity.profile.user_agent)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true);

    if let Some(proxy_url) = identity.proxy_url() {
        builder = builder.proxy(Proxy::all(&proxy_url)?);
    }

    Ok(builder.build()?)
}

/// Fetches a page under a hard deadline
///
/// The deadline covers the whole exchange including the body read. Request
/// headers come from the browsing session so the referer chain and
/// sec-fetch-* headers stay consistent across navigations.
pub async fn fetch_page(
    client: &Client,
    session: &BrowsingSession,
    url: &str,
    deadline: Duration,
) -> FetchOutcome {
    let started = Instant::now();

    let attempt = tokio::time::timeout(deadline, async {
        let response = client.get(url).headers(session.headers()).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((status, final_url, body))
    })
    .await;

    match attempt {
        Err(_) => {
            tracing::warn!("Fetch of {} exceeded {:?} deadline", url, deadline);
            FetchOutcome::DeadlineExceeded
        }
        Ok(Err(e)) => {
            let message = if e.is_timeout() {
                "request timeout".to_string()
            } else if e.is_connect() {
                "connection failed".to_string()
            } else {
                e.to_string()
            };
            tracing::debug!("Transport failure for {}: {}", url, message);
            FetchOutcome::Transport { message }
        }
        Ok(Ok((status, final_url, body))) => {
            if status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!("HTTP 429 from {}", url);
                return FetchOutcome::RateLimited;
            }
            if !status.is_success() {
                return FetchOutcome::HttpError {
                    status_code: status.as_u16(),
                };
            }
            FetchOutcome::Success {
                final_url,
                status_code: status.as_u16(),
                body,
                latency: started.elapsed(),
            }
        }
    }
}
