use std::time::Duration;

use reqwest::{Client, StatusCode};
use volley_core::error::AppError;
use volley_core::models::{DropReason, Outcome, Payload};
use volley_core::traits::Fetcher;

/// HTTP fetcher using reqwest.
///
/// Issues a plain GET with a fixed per-request timeout. Only a `200 OK`
/// with a non-empty body counts as a payload; everything else, including
/// other 2xx codes, is dropped.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("volley/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpClient(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Outcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Outcome::Dropped(classify(&e)),
        };

        let status = response.status();
        tracing::trace!(%url, status = status.as_u16(), "Response received");
        if status != StatusCode::OK {
            return Outcome::Dropped(DropReason::Status(status.as_u16()));
        }

        match response.bytes().await {
            Ok(body) if body.is_empty() => {
                Outcome::Dropped(DropReason::Body("empty response body".into()))
            }
            Ok(body) => Outcome::Payload(Payload(body.to_vec())),
            Err(e) if e.is_timeout() => Outcome::Dropped(DropReason::Timeout),
            Err(e) => Outcome::Dropped(DropReason::Body(e.to_string())),
        }
    }
}

fn classify(e: &reqwest::Error) -> DropReason {
    if e.is_timeout() {
        DropReason::Timeout
    } else if e.is_connect() {
        DropReason::Connect(e.to_string())
    } else {
        DropReason::Transport(e.to_string())
    }
}
