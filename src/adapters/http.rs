//! REST gateway stage executors
//!
//! Each port maps to one JSON endpoint under a shared base URL:
//!
//! | port      | request                      |
//! |-----------|------------------------------|
//! | balance   | `GET  {base}/balance/{wallet}` |
//! | bridge    | `POST {base}/bridge`         |
//! | generator | `POST {base}/generate`       |
//! | uploader  | `POST {base}/upload`         |
//! | minter    | `POST {base}/mint`           |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ExecutorsConfig;
use crate::domain::{LaunchConfig, MomentRef};
use crate::error::{
    BridgeError, GenerationError, LaunchError, MintError, Result, UploadError,
};
use crate::pipeline::{
    AssetDescriptor, BalanceProvider, BridgeReceipt, BridgeService, ChainMinter,
    MetadataGenerator, MintReceipt, StageExecutors, Uploader,
};

/// Why a gateway call failed, before mapping to a port error
#[derive(Debug, Clone, PartialEq, Eq)]
enum GatewayFailure {
    Timeout { elapsed_ms: u64 },
    Status { status: StatusCode, body: String },
    Transport(String),
    Decode(String),
}

impl GatewayFailure {
    fn describe(&self) -> String {
        match self {
            GatewayFailure::Timeout { elapsed_ms } => format!("gateway timeout after {elapsed_ms}ms"),
            GatewayFailure::Status { status, body } => format!("gateway returned {status}: {body}"),
            GatewayFailure::Transport(e) => format!("gateway unreachable: {e}"),
            GatewayFailure::Decode(e) => format!("invalid gateway response: {e}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgePayload<'a> {
    source_amount: Decimal,
    source_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct LiquidityRejection {
    requested: Decimal,
    available: Decimal,
}

#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    subject: &'a MomentRef,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MintPayload<'a> {
    content_uri: &'a str,
    config: &'a LaunchConfig,
    funding_amount: Decimal,
}

/// Stage executors backed by a REST gateway
#[derive(Debug, Clone)]
pub struct HttpExecutors {
    client: Client,
    base_url: Url,
}

impl HttpExecutors {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LaunchError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: normalize_base(base_url)?,
        })
    }

    pub fn from_config(config: &ExecutorsConfig) -> Result<Self> {
        let base = config.base_url.as_deref().ok_or_else(|| {
            LaunchError::Validation("executors.base_url is required in http mode".to_string())
        })?;
        Self::new(base, Duration::from_millis(config.request_timeout_ms))
    }

    pub fn into_executors(self) -> StageExecutors {
        let gateway = Arc::new(self);
        StageExecutors {
            balance: gateway.clone(),
            bridge: gateway.clone(),
            generator: gateway.clone(),
            uploader: gateway.clone(),
            minter: gateway,
        }
    }

    /// Append `segments` to the base path, percent-encoding each one.
    ///
    /// Caller-supplied values such as wallets stay inside a single segment and
    /// can never climb out of the base path or add a query or fragment.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, GatewayFailure> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(GatewayFailure::Transport(format!(
                "refusing path segment {bad:?}"
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GatewayFailure::Transport(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> std::result::Result<T, GatewayFailure> {
        let url = self.endpoint(segments)?;
        let started = Instant::now();
        let response = self.client.get(url).send().await;
        Self::decode(response, started).await
    }

    async fn post_json<B, T>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> std::result::Result<T, GatewayFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let started = Instant::now();
        let response = self.client.post(url).json(body).send().await;
        Self::decode(response, started).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Result<reqwest::Response>,
        started: Instant,
    ) -> std::result::Result<T, GatewayFailure> {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let response = response.map_err(|e| {
            if e.is_timeout() {
                GatewayFailure::Timeout { elapsed_ms }
            } else {
                GatewayFailure::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
            return Err(GatewayFailure::Timeout { elapsed_ms });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayFailure::Status { status, body });
        }

        debug!(%status, elapsed_ms, "gateway call succeeded");
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayFailure::Decode(e.to_string()))
    }
}

fn normalize_base(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim().trim_end_matches('/');
    Url::parse(&format!("{trimmed}/"))
        .map_err(|e| LaunchError::Validation(format!("invalid executor base URL {base_url}: {e}")))
}

fn bridge_error(failure: GatewayFailure, requested: Decimal) -> BridgeError {
    match failure {
        GatewayFailure::Timeout { elapsed_ms } => BridgeError::Timeout { elapsed_ms },
        GatewayFailure::Status { status, body } if status == StatusCode::CONFLICT => {
            match serde_json::from_str::<LiquidityRejection>(&body) {
                Ok(rejection) => BridgeError::InsufficientLiquidity {
                    requested: rejection.requested,
                    available: rejection.available,
                },
                Err(_) => BridgeError::InsufficientLiquidity {
                    requested,
                    available: Decimal::ZERO,
                },
            }
        }
        other => BridgeError::Unavailable(other.describe()),
    }
}

#[async_trait]
impl BalanceProvider for HttpExecutors {
    #[instrument(skip(self))]
    async fn balance(&self, wallet: &str) -> Result<Decimal> {
        let response: BalanceResponse = self
            .get_json(&["balance", wallet])
            .await
            .map_err(|f| LaunchError::Internal(format!("balance lookup failed: {}", f.describe())))?;
        Ok(response.balance)
    }
}

#[async_trait]
impl BridgeService for HttpExecutors {
    #[instrument(skip(self))]
    async fn bridge(
        &self,
        source_amount: Decimal,
        source_address: &str,
    ) -> std::result::Result<BridgeReceipt, BridgeError> {
        let payload = BridgePayload {
            source_amount,
            source_address,
        };
        self.post_json(&["bridge"], &payload).await.map_err(|f| {
            warn!(failure = %f.describe(), "bridge call failed");
            bridge_error(f, source_amount)
        })
    }
}

#[async_trait]
impl MetadataGenerator for HttpExecutors {
    #[instrument(skip(self, subject), fields(moment = %subject.id))]
    async fn build(&self, subject: &MomentRef) -> std::result::Result<AssetDescriptor, GenerationError> {
        self.post_json(&["generate"], &GeneratePayload { subject })
            .await
            .map_err(|f| GenerationError::new(f.describe()))
    }
}

#[async_trait]
impl Uploader for HttpExecutors {
    #[instrument(skip(self, asset), fields(asset_name = %asset.name))]
    async fn upload(&self, asset: &AssetDescriptor) -> std::result::Result<String, UploadError> {
        let response: UploadResponse = self
            .post_json(&["upload"], asset)
            .await
            .map_err(|f| UploadError::new(f.describe()))?;
        Ok(response.uri)
    }
}

#[async_trait]
impl ChainMinter for HttpExecutors {
    #[instrument(skip(self, config))]
    async fn mint(
        &self,
        content_uri: &str,
        config: &LaunchConfig,
        funding_amount: Decimal,
    ) -> std::result::Result<MintReceipt, MintError> {
        let payload = MintPayload {
            content_uri,
            config,
            funding_amount,
        };
        self.post_json(&["mint"], &payload)
            .await
            .map_err(|f| MintError::new(f.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_base_url_is_normalized_for_joining() {
        let gateway = HttpExecutors::new("http://gateway.internal:9000/v1", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            gateway.endpoint(&["bridge"]).unwrap().as_str(),
            "http://gateway.internal:9000/v1/bridge"
        );

        let gateway = HttpExecutors::new("http://gateway.internal:9000/v1///", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            gateway.endpoint(&["balance", "0xabc"]).unwrap().as_str(),
            "http://gateway.internal:9000/v1/balance/0xabc"
        );
    }

    #[test]
    fn test_wallet_cannot_escape_balance_path() {
        let gateway = HttpExecutors::new("http://gw.test/v1/", Duration::from_secs(1)).unwrap();

        let url = gateway
            .endpoint(&["balance", "../../admin?x=1#"])
            .unwrap();
        assert_eq!(url.host_str(), Some("gw.test"));
        assert!(url.path().starts_with("/v1/balance/"));
        assert_eq!(url.path_segments().unwrap().count(), 3);
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        for wallet in ["..", ".", ""] {
            assert!(gateway.endpoint(&["balance", wallet]).is_err());
        }
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(HttpExecutors::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_conflict_maps_to_insufficient_liquidity() {
        let failure = GatewayFailure::Status {
            status: StatusCode::CONFLICT,
            body: r#"{"requested":"5","available":"1.25"}"#.to_string(),
        };
        assert_eq!(
            bridge_error(failure, dec!(5)),
            BridgeError::InsufficientLiquidity {
                requested: dec!(5),
                available: dec!(1.25)
            }
        );

        let opaque = GatewayFailure::Status {
            status: StatusCode::CONFLICT,
            body: "no".to_string(),
        };
        assert_eq!(
            bridge_error(opaque, dec!(3)),
            BridgeError::InsufficientLiquidity {
                requested: dec!(3),
                available: Decimal::ZERO
            }
        );
    }

    #[test]
    fn test_timeouts_and_outages_map_to_bridge_errors() {
        assert_eq!(
            bridge_error(GatewayFailure::Timeout { elapsed_ms: 30_000 }, dec!(1)),
            BridgeError::Timeout { elapsed_ms: 30_000 }
        );
        assert!(matches!(
            bridge_error(
                GatewayFailure::Status {
                    status: StatusCode::BAD_GATEWAY,
                    body: String::new()
                },
                dec!(1)
            ),
            BridgeError::Unavailable(_)
        ));
    }
}
