use crate::config::FetchConfig;
use crate::constants::USER_AGENT;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

/// Something that can hand back the raw bytes of the source document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Human readable location, used in logs and errors.
    fn location(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// Fetches the source page over HTTP(S) with a timeout and bounded retries.
pub struct HttpDocumentSource {
    client: reqwest::Client,
    url: String,
    settings: FetchConfig,
}

impl HttpDocumentSource {
    pub fn new(url: impl Into<String>, settings: FetchConfig) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EtlError::Fetch {
                url: url.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url,
            settings,
        })
    }

    async fn attempt(&self) -> std::result::Result<Vec<u8>, Attempt> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Attempt::Retryable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("request failed with status: {}", status);
            return Err(if is_retryable_status(status) {
                Attempt::Retryable(message)
            } else {
                Attempt::Fatal(message)
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Attempt::Retryable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

enum Attempt {
    Retryable(String),
    Fatal(String),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    fn location(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<u8>> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!("Fetching source document (attempt {}/{})", attempt, max_attempts);
            match self.attempt().await {
                Ok(bytes) => {
                    info!("Fetched {} bytes", bytes.len());
                    return Ok(bytes);
                }
                Err(Attempt::Fatal(message)) => {
                    return Err(EtlError::Fetch {
                        url: self.url.clone(),
                        message,
                    });
                }
                Err(Attempt::Retryable(message)) if attempt >= max_attempts => {
                    return Err(EtlError::Fetch {
                        url: self.url.clone(),
                        message: format!("giving up after {} attempts: {}", attempt, message),
                    });
                }
                Err(Attempt::Retryable(message)) => {
                    let delay = self.settings.backoff(attempt);
                    warn!(
                        "Fetch attempt {} failed ({}); retrying in {:?}",
                        attempt, message, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// An in-memory document, for offline runs and tests.
pub struct StaticDocument {
    location: String,
    body: Vec<u8>,
}

impl StaticDocument {
    pub fn new(location: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            location: location.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for StaticDocument {
    fn location(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        Ok(self.body.clone())
    }
}
