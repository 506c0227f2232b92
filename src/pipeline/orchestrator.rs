//! Launch orchestrator: drives one launch request through the pipeline
//!
//! Each `start` call owns exactly one `LaunchRequest` and runs it through
//! `Validating → Bridging → Generating → Uploading → Minting → Complete`.
//! A stage is entered only after its executor call has returned, so a
//! failure in Uploading leaves the request in Generating and publishes no
//! `uploading` progress. Every stage entry is published to the
//! `mint_progress` channel and directly to the requester.
//!
//! Validation (request shape, balance, cost) happens before the state
//! machine starts and is reported to the caller only; nothing is published
//! for a rejected request. Executor failures end the run in `Error` and are
//! published on `mint_error`. There is no automatic retry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::ports::StageExecutors;
use crate::config::PipelineConfig;
use crate::domain::{CostEstimate, CostModel, LaunchRequest, LaunchResult, Stage};
use crate::error::{BridgeError, LaunchError, Result};
use crate::hub::{EventSink, OutboundMessage, MINT_CANCELLED, MINT_COMPLETE, MINT_ERROR, MINT_PROGRESS};

/// Sending half of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Request cancellation. Observed at the next stage boundary.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// Create a linked handle/signal pair
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(Arc::new(tx)), CancelSignal(rx))
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Releases a request id from the in-flight set on every exit path
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, Stage>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

/// Stage boundary: stop here if cancellation was requested.
fn checkpoint(request: &LaunchRequest, cancel: &CancelSignal) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(LaunchError::Cancelled(request.stage()));
    }
    Ok(())
}

/// Pipeline orchestrator
pub struct Orchestrator {
    executors: StageExecutors,
    sink: Arc<dyn EventSink>,
    cost_model: CostModel,
    settings: PipelineConfig,
    in_flight: DashMap<String, Stage>,
}

impl Orchestrator {
    pub fn new(
        executors: StageExecutors,
        sink: Arc<dyn EventSink>,
        cost_model: CostModel,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            executors,
            sink,
            cost_model,
            settings,
            in_flight: DashMap::new(),
        }
    }

    /// Current stage and progress of an in-flight request
    pub fn status(&self, request_id: &str) -> Option<(Stage, u8)> {
        self.in_flight
            .get(request_id)
            .map(|stage| (*stage, stage.progress().unwrap_or(0)))
    }

    /// Number of requests currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run a launch to its terminal state.
    pub async fn start(&self, request: LaunchRequest) -> Result<LaunchResult> {
        self.start_cancellable(request, CancelSignal::never()).await
    }

    /// Run a launch, checking `cancel` at every stage boundary.
    pub async fn start_cancellable(
        &self,
        request: LaunchRequest,
        cancel: CancelSignal,
    ) -> Result<LaunchResult> {
        let span = info_span!("launch", request_id = %request.id, subject = %request.subject.id);
        self.run(request, cancel).instrument(span).await
    }

    async fn run(&self, mut request: LaunchRequest, cancel: CancelSignal) -> Result<LaunchResult> {
        if request.stage() != Stage::Queued {
            warn!(stage = %request.stage(), "rejecting start of a request that already ran");
            return Err(LaunchError::InvalidStateTransition {
                from: request.stage(),
                to: Stage::Validating,
            });
        }

        let _guard = self.claim(&request.id)?;

        let estimate = match self.validate(&request).await {
            Ok(estimate) => estimate,
            Err(e) => {
                info!(error = %e, "launch rejected during validation");
                return Err(e);
            }
        };

        match self.drive(&mut request, &cancel, estimate).await {
            Ok(result) => {
                info!(
                    contract = %result.contract_address,
                    token_id = %result.token_id,
                    "launch complete"
                );
                Ok(result)
            }
            Err(e) => Err(self.terminate(&mut request, e)),
        }
    }

    fn claim(&self, request_id: &str) -> Result<InFlightGuard<'_>> {
        match self.in_flight.entry(request_id.to_string()) {
            Entry::Occupied(_) => {
                warn!(request_id, "duplicate start rejected");
                Err(LaunchError::DuplicateRequest(request_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Stage::Queued);
                Ok(InFlightGuard {
                    in_flight: &self.in_flight,
                    id: request_id.to_string(),
                })
            }
        }
    }

    async fn validate(&self, request: &LaunchRequest) -> Result<CostEstimate> {
        let cfg = &request.config;
        let limits = &self.settings;
        let mut problems = Vec::new();

        if request.subject.id.trim().is_empty() {
            problems.push("subject id is required".to_string());
        }
        if request.requester.wallet.trim().is_empty() {
            problems.push("requester wallet is required".to_string());
        }
        if request.requester.user_id.trim().is_empty() {
            problems.push("requester user id is required".to_string());
        }
        if cfg.supply == 0 || cfg.supply > limits.max_supply {
            problems.push(format!("supply must be between 1 and {}", limits.max_supply));
        }
        if cfg.price < Decimal::ZERO {
            problems.push("price must not be negative".to_string());
        }
        if cfg.royalty_bps > limits.max_royalty_bps {
            problems.push(format!(
                "royalty must not exceed {} bps",
                limits.max_royalty_bps
            ));
        }
        if cfg.duration_days == 0 || cfg.duration_days > limits.max_duration_days {
            problems.push(format!(
                "duration must be between 1 and {} days",
                limits.max_duration_days
            ));
        }
        if cfg.investment_amount <= Decimal::ZERO {
            problems.push("investment amount must be positive".to_string());
        }
        if !problems.is_empty() {
            return Err(LaunchError::Validation(problems.join("; ")));
        }

        let estimate = self.cost_model.estimate(cfg);
        let required = cfg.investment_amount + estimate.total;
        let available = self
            .execute(
                Stage::Validating,
                self.executors.balance.balance(&request.requester.wallet),
            )
            .await?;

        if available < required {
            return Err(LaunchError::InsufficientBalance {
                required,
                available,
            });
        }

        debug!(%required, %available, total_cost = %estimate.total, "validation passed");
        Ok(estimate)
    }

    async fn drive(
        &self,
        request: &mut LaunchRequest,
        cancel: &CancelSignal,
        estimate: CostEstimate,
    ) -> Result<LaunchResult> {
        checkpoint(request, cancel)?;
        self.enter(
            request,
            Stage::Validating,
            format!("Launch validated, estimated cost {}", estimate.total),
        )?;

        checkpoint(request, cancel)?;
        let wallet = request.requester.wallet.clone();
        let receipt = self
            .execute(
                Stage::Bridging,
                self.executors
                    .bridge
                    .bridge(request.config.investment_amount, &wallet),
            )
            .await?;
        self.enter(
            request,
            Stage::Bridging,
            format!("Bridged {} (fee {})", receipt.dest_amount, receipt.fee),
        )?;

        checkpoint(request, cancel)?;
        let subject = request.subject.clone();
        let asset = self
            .execute(Stage::Generating, self.executors.generator.build(&subject))
            .await?;
        self.enter(
            request,
            Stage::Generating,
            format!("Generated metadata for {}", asset.name),
        )?;

        checkpoint(request, cancel)?;
        let content_uri = self
            .execute(Stage::Uploading, self.executors.uploader.upload(&asset))
            .await?;
        self.enter(request, Stage::Uploading, format!("Uploaded to {content_uri}"))?;

        checkpoint(request, cancel)?;
        let config = request.config.clone();
        let mint = self
            .execute(
                Stage::Minting,
                self.executors
                    .minter
                    .mint(&content_uri, &config, receipt.dest_amount),
            )
            .await?;
        // The token exists once the mint returns; cancellation no longer applies.
        self.enter(
            request,
            Stage::Minting,
            format!("Minted token {} at {}", mint.token_id, mint.contract_address),
        )?;

        let result = LaunchResult {
            collection_url: self.collection_url(&mint.contract_address),
            contract_address: mint.contract_address,
            token_id: mint.token_id,
            tx_hash: mint.tx_hash,
            bridge_reference: receipt.reference,
            bridged_amount: receipt.dest_amount,
        };
        request.complete(result.clone())?;
        self.publish_progress(request, "Launch complete");
        let event = OutboundMessage::mint_complete(&request.id, &result);
        self.sink.broadcast(MINT_COMPLETE, event.clone());
        self.sink.send_to_user(&request.requester.user_id, event);
        Ok(result)
    }

    /// Move to `stage` once its executor has succeeded, and publish it.
    fn enter(&self, request: &mut LaunchRequest, stage: Stage, message: String) -> Result<()> {
        request.advance(stage)?;
        self.publish_progress(request, &message);
        Ok(())
    }

    /// Await an executor call under the stage timeout.
    async fn execute<T, E, F>(&self, stage: Stage, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<LaunchError>,
    {
        let timeout_ms = self.settings.stage_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(outcome) => outcome.map_err(Into::into),
            Err(_) if stage == Stage::Bridging => Err(BridgeError::Timeout {
                elapsed_ms: timeout_ms,
            }
            .into()),
            Err(_) => Err(LaunchError::StageTimeout { stage, timeout_ms }),
        }
    }

    fn publish_progress(&self, request: &LaunchRequest, message: &str) {
        let stage = request.stage();
        let progress = request.progress();
        if let Some(mut entry) = self.in_flight.get_mut(&request.id) {
            *entry = stage;
        }

        let event = OutboundMessage::mint_progress(&request.id, stage, message, progress);
        let broadcast = self.sink.broadcast(MINT_PROGRESS, event.clone());
        let direct = self.sink.send_to_user(&request.requester.user_id, event);
        info!(%stage, progress, broadcast, direct, "{}", message);
    }

    /// Move a failed run into its terminal state and publish it.
    fn terminate(&self, request: &mut LaunchRequest, err: LaunchError) -> LaunchError {
        if let LaunchError::Cancelled(_) = err {
            return match request.cancel() {
                Ok(at) => {
                    warn!(stage = %at, "launch cancelled");
                    let event = OutboundMessage::mint_cancelled(&request.id, at);
                    self.sink.broadcast(MINT_CANCELLED, event.clone());
                    self.sink.send_to_user(&request.requester.user_id, event);
                    LaunchError::Cancelled(at)
                }
                Err(e) => e,
            };
        }

        let message = err.to_string();
        match request.fail(&message) {
            Ok(failure) => {
                error!(stage = %failure.stage, error = %message, "launch failed");
                let event = OutboundMessage::mint_error(&request.id, &message, failure.stage);
                self.sink.broadcast(MINT_ERROR, event.clone());
                self.sink.send_to_user(&request.requester.user_id, event);
            }
            Err(e) => {
                error!(error = %e, original = %message, "failed run was already terminal");
            }
        }
        err
    }

    fn collection_url(&self, contract_address: &str) -> String {
        format!("{}{}", self.settings.collection_url_base, contract_address)
    }
}
