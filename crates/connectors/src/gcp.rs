use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Metadata server returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Bearer credentials for Google Cloud APIs: either a fixed access token or
/// the instance metadata server.
pub enum GcpAuth {
    Static(String),
    MetadataServer {
        cached: Mutex<Option<(String, Instant)>>,
    },
}

impl GcpAuth {
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.is_empty() => GcpAuth::Static(token),
            _ => GcpAuth::MetadataServer {
                cached: Mutex::new(None),
            },
        }
    }

    pub async fn bearer(&self, client: &reqwest::Client) -> Result<String, AuthError> {
        match self {
            GcpAuth::Static(token) => Ok(token.clone()),
            GcpAuth::MetadataServer { cached } => {
                let mut cached = cached.lock().await;
                if let Some((token, expires_at)) = cached.as_ref()
                    && Instant::now() < *expires_at
                {
                    return Ok(token.clone());
                }

                debug!("Fetching access token from the metadata server");
                let response = client
                    .get(METADATA_TOKEN_URL)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(AuthError::Status(response.status().as_u16()));
                }

                let token: TokenResponse = response.json().await?;
                let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
                *cached = Some((token.access_token.clone(), Instant::now() + lifetime));
                Ok(token.access_token)
            }
        }
    }
}
