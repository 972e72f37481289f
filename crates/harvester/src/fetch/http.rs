use async_trait::async_trait;
use reqwest::{header, Client, Url};

use super::{FetchOptions, Fetcher, Payload};
use crate::error::FetchError;
use crate::sanitize::redact_target;

const USER_AGENT: &str = concat!("harvester/", env!("CARGO_PKG_VERSION"));

/// HTTP(S) fetcher built on a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn parse_target(target: &str) -> Result<Url, FetchError> {
    let url = Url::parse(target).map_err(|_| FetchError::InvalidTarget(target.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(FetchError::InvalidTarget(target.to_string())),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &str, options: &FetchOptions) -> Result<Payload, FetchError> {
        let url = parse_target(target)?;

        let mut response = self
            .client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(options.timeout)
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > options.max_payload_bytes {
                return Err(FetchError::PayloadTooLarge {
                    limit: options.max_payload_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > options.max_payload_bytes {
                return Err(FetchError::PayloadTooLarge {
                    limit: options.max_payload_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        log::debug!(
            "Fetched {} bytes from {}",
            bytes.len(),
            redact_target(target)
        );

        Ok(Payload::new(bytes, content_type))
    }
}
