use async_trait::async_trait;
use launchhub::config::PipelineConfig;
use launchhub::domain::{CostModel, LaunchConfig, LaunchRequest, MomentRef, Rarity, Requester};
use launchhub::error::{BridgeError, GenerationError, LaunchError, MintError, UploadError};
use launchhub::hub::{
    ConnectionId, Envelope, Hub, MINT_CANCELLED, MINT_COMPLETE, MINT_ERROR, MINT_PROGRESS,
};
use launchhub::pipeline::{
    AssetDescriptor, BalanceProvider, BatchJob, BatchScheduler, BridgeReceipt, BridgeService,
    CancelSignal, ChainMinter, MetadataGenerator, MintReceipt, Orchestrator, StageExecutors,
    Uploader,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_test::{assert_err, assert_ok};

/// Scriptable in-process executors
#[derive(Default)]
struct FakeChain {
    balance: Decimal,
    /// Wallet whose bridge call fails with insufficient liquidity
    failing_wallet: Option<String>,
    fail_upload: bool,
    /// When set, the bridge waits for this before returning
    bridge_gate: Option<Arc<Notify>>,
    bridge_entered: Arc<Notify>,
    /// Fixed bridge latency instead of the per-wallet stagger
    bridge_latency: Option<Duration>,
    bridge_calls: AtomicUsize,
    active_bridges: AtomicUsize,
    peak_bridges: AtomicUsize,
    mint_calls: AtomicUsize,
}

impl FakeChain {
    fn funded() -> Self {
        Self {
            balance: dec!(100),
            ..Self::default()
        }
    }

    fn into_executors(self: Arc<Self>) -> StageExecutors {
        StageExecutors {
            balance: self.clone(),
            bridge: self.clone(),
            generator: self.clone(),
            uploader: self.clone(),
            minter: self,
        }
    }
}

#[async_trait]
impl BalanceProvider for FakeChain {
    async fn balance(&self, _wallet: &str) -> launchhub::Result<Decimal> {
        Ok(self.balance)
    }
}

#[async_trait]
impl BridgeService for FakeChain {
    async fn bridge(
        &self,
        source_amount: Decimal,
        source_address: &str,
    ) -> Result<BridgeReceipt, BridgeError> {
        self.bridge_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_bridges.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_bridges.fetch_max(active, Ordering::SeqCst);
        self.bridge_entered.notify_one();
        if let Some(gate) = &self.bridge_gate {
            gate.notified().await;
        }

        let latency = self.bridge_latency.unwrap_or_else(|| {
            // Later wallets finish first so completion order differs from input order
            let position: u64 = source_address
                .trim_start_matches("0xw")
                .parse()
                .unwrap_or(0);
            Duration::from_millis(30u64.saturating_sub(position * 5))
        });
        tokio::time::sleep(latency).await;
        self.active_bridges.fetch_sub(1, Ordering::SeqCst);

        if self.failing_wallet.as_deref() == Some(source_address) {
            return Err(BridgeError::InsufficientLiquidity {
                requested: source_amount,
                available: Decimal::ZERO,
            });
        }
        Ok(BridgeReceipt {
            dest_amount: source_amount - dec!(0.01),
            fee: dec!(0.01),
            reference: format!("bridge-{source_address}"),
        })
    }
}

#[async_trait]
impl MetadataGenerator for FakeChain {
    async fn build(&self, subject: &MomentRef) -> Result<AssetDescriptor, GenerationError> {
        Ok(AssetDescriptor {
            name: subject.title.clone(),
            description: subject.title.clone(),
            image_uri: format!("ipfs://{}", subject.id),
            animation_uri: None,
            attributes: Vec::new(),
        })
    }
}

#[async_trait]
impl Uploader for FakeChain {
    async fn upload(&self, asset: &AssetDescriptor) -> Result<String, UploadError> {
        if self.fail_upload {
            return Err(UploadError::new("storage unavailable"));
        }
        Ok(format!("ipfs://meta-{}", asset.name))
    }
}

#[async_trait]
impl ChainMinter for FakeChain {
    async fn mint(
        &self,
        content_uri: &str,
        _config: &LaunchConfig,
        _funding_amount: Decimal,
    ) -> Result<MintReceipt, MintError> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MintReceipt {
            contract_address: format!("0x{}", content_uri.len()),
            token_id: "1".to_string(),
            tx_hash: "0xfeed".to_string(),
        })
    }
}

fn launch_config() -> LaunchConfig {
    LaunchConfig {
        rarity: Rarity::Common,
        supply: 10,
        price: dec!(0.01),
        royalty_bps: 250,
        duration_days: 3,
        investment_amount: dec!(1),
    }
}

fn request(n: u64) -> LaunchRequest {
    LaunchRequest::with_id(
        format!("req-{n}"),
        MomentRef {
            id: format!("moment-{n}"),
            title: format!("Moment {n}"),
            creator: "alice".to_string(),
            media_uri: None,
        },
        Requester {
            wallet: format!("0xw{n}"),
            user_id: "alice".to_string(),
        },
        launch_config(),
    )
}

fn orchestrator(chain: Arc<FakeChain>, hub: Arc<Hub>) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        chain.into_executors(),
        hub,
        CostModel::default(),
        PipelineConfig::default(),
    ))
}

/// Register an observer subscribed to every launch channel
fn observe(hub: &Hub) -> (ConnectionId, mpsc::Receiver<Envelope>) {
    let (tx, mut rx) = mpsc::channel(512);
    let id = hub.register(tx);
    assert_eq!(rx.try_recv().unwrap().kind, "connection");
    for channel in [MINT_PROGRESS, MINT_COMPLETE, MINT_ERROR, MINT_CANCELLED] {
        hub.subscribe(id, channel);
    }
    (id, rx)
}

fn drain(rx: &mut mpsc::Receiver<Envelope>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}

fn for_request<'a>(events: &'a [Envelope], request_id: &str) -> Vec<&'a Envelope> {
    events
        .iter()
        .filter(|e| e.data["requestId"] == request_id)
        .collect()
}

fn progress_stages(events: &[&Envelope]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind == MINT_PROGRESS)
        .map(|e| e.data["stage"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn stages_are_observed_in_order_with_rising_progress() {
    let hub = Arc::new(Hub::new());
    let (_observer, mut rx) = observe(&hub);

    // A second connection bound to the requester but subscribed to nothing
    let (tx, mut direct_rx) = mpsc::channel(64);
    let direct = hub.register(tx);
    hub.authenticate(direct, "alice");
    direct_rx.try_recv().unwrap();

    let orchestrator = orchestrator(Arc::new(FakeChain::funded()), hub.clone());
    orchestrator.start(request(1)).await.unwrap();

    let events = drain(&mut rx);
    let mine = for_request(&events, "req-1");
    assert_eq!(
        progress_stages(&mine),
        vec!["validating", "bridging", "generating", "uploading", "minting", "complete"]
    );

    let progress: Vec<u64> = mine
        .iter()
        .filter(|e| e.kind == MINT_PROGRESS)
        .map(|e| e.data["progress"].as_u64().unwrap())
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));

    assert_eq!(mine.last().unwrap().kind, MINT_COMPLETE);
    assert!(mine.iter().all(|e| e.kind != MINT_ERROR));

    let direct_events = drain(&mut direct_rx);
    assert_eq!(direct_events.len(), 7);
    assert_eq!(direct_events.last().unwrap().kind, MINT_COMPLETE);
}

#[tokio::test]
async fn batch_isolates_a_bridge_failure_and_keeps_input_order() {
    let hub = Arc::new(Hub::new());
    let (_observer, mut rx) = observe(&hub);
    let chain = Arc::new(FakeChain {
        failing_wallet: Some("0xw3".to_string()),
        ..FakeChain::funded()
    });
    let scheduler = BatchScheduler::new(orchestrator(chain.clone(), hub.clone()));

    let requests: Vec<LaunchRequest> = (1..=5).map(request).collect();
    let outcomes = scheduler
        .run(BatchJob::new(requests, 2, Duration::from_millis(5)))
        .await;

    assert_eq!(outcomes.len(), 5);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.request_id, format!("req-{}", i + 1));
    }
    let failures: Vec<_> = outcomes.iter().filter(|o| !o.success).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].request_id, "req-3");
    assert!(failures[0].error.as_deref().unwrap().contains("liquidity"));
    assert_eq!(chain.bridge_calls.load(Ordering::SeqCst), 5);
    assert_eq!(chain.mint_calls.load(Ordering::SeqCst), 4);

    let events = drain(&mut rx);
    let failed = for_request(&events, "req-3");
    assert_eq!(progress_stages(&failed), vec!["validating"]);
    let errors: Vec<_> = failed.iter().filter(|e| e.kind == MINT_ERROR).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].data["stage"], "bridging");
}

#[tokio::test(start_paused = true)]
async fn batch_windows_bound_concurrency_and_pause_only_between_windows() {
    let hub = Arc::new(Hub::new());
    let chain = Arc::new(FakeChain {
        bridge_latency: Some(Duration::from_millis(100)),
        ..FakeChain::funded()
    });
    let scheduler = BatchScheduler::new(orchestrator(chain.clone(), hub));

    let requests: Vec<LaunchRequest> = (1..=5).map(request).collect();
    let started = tokio::time::Instant::now();
    let outcomes = scheduler
        .run(BatchJob::new(requests, 2, Duration::from_secs(1)))
        .await;
    let elapsed = started.elapsed();

    assert!(outcomes.iter().all(|o| o.success));
    assert_eq!(chain.bridge_calls.load(Ordering::SeqCst), 5);
    assert_eq!(chain.peak_bridges.load(Ordering::SeqCst), 2);

    // Three windows of one 100ms bridge each, with a pause before windows two and three
    let expected = Duration::from_millis(3 * 100 + 2 * 1000);
    assert!(elapsed >= expected, "finished too early: {elapsed:?}");
    assert!(
        elapsed < expected + Duration::from_millis(100),
        "paused after the last window: {elapsed:?}"
    );
}

#[tokio::test]
async fn insufficient_balance_never_reaches_the_bridge() {
    let hub = Arc::new(Hub::new());
    let (_observer, mut rx) = observe(&hub);
    let chain = Arc::new(FakeChain {
        balance: dec!(0.5),
        ..FakeChain::default()
    });
    let orchestrator = orchestrator(chain.clone(), hub);

    let err = orchestrator.start(request(1)).await.unwrap_err();
    assert!(matches!(err, LaunchError::InsufficientBalance { .. }));
    assert!(err.is_validation());
    assert_eq!(chain.bridge_calls.load(Ordering::SeqCst), 0);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(orchestrator.in_flight_count(), 0);
}

#[tokio::test]
async fn upload_failure_ends_with_one_error_and_no_minting() {
    let hub = Arc::new(Hub::new());
    let (_observer, mut rx) = observe(&hub);
    let chain = Arc::new(FakeChain {
        fail_upload: true,
        ..FakeChain::funded()
    });
    let orchestrator = orchestrator(chain.clone(), hub);

    let err = orchestrator.start(request(1)).await.unwrap_err();
    assert!(matches!(err, LaunchError::Upload(_)));

    let events = drain(&mut rx);
    let sequence: Vec<String> = for_request(&events, "req-1")
        .iter()
        .map(|e| format!("{}:{}", e.kind, e.data["stage"].as_str().unwrap_or_default()))
        .collect();
    assert_eq!(
        sequence,
        vec![
            "mint_progress:validating",
            "mint_progress:bridging",
            "mint_progress:generating",
            "mint_error:uploading",
        ]
    );
    assert_eq!(chain.mint_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_start_with_same_id_is_rejected_while_in_flight() {
    let hub = Arc::new(Hub::new());
    let gate = Arc::new(Notify::new());
    let chain = Arc::new(FakeChain {
        bridge_gate: Some(gate.clone()),
        ..FakeChain::funded()
    });
    let orchestrator = orchestrator(chain.clone(), hub);

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.start(request(1)).await })
    };
    chain.bridge_entered.notified().await;
    assert_eq!(orchestrator.in_flight_count(), 1);

    let err = assert_err!(orchestrator.start(request(1)).await);
    assert!(matches!(err, LaunchError::DuplicateRequest(ref id) if id == "req-1"));

    gate.notify_one();
    assert_ok!(first.await.unwrap());
    assert_eq!(chain.bridge_calls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.in_flight_count(), 0);

    // Finished ids may be launched again
    gate.notify_one();
    assert_ok!(orchestrator.start(request(1)).await);
}

#[tokio::test]
async fn cancellation_is_observed_at_the_next_stage_boundary() {
    let hub = Arc::new(Hub::new());
    let (_observer, mut rx) = observe(&hub);
    let gate = Arc::new(Notify::new());
    let chain = Arc::new(FakeChain {
        bridge_gate: Some(gate.clone()),
        ..FakeChain::funded()
    });
    let orchestrator = orchestrator(chain.clone(), hub);
    let (handle, signal) = CancelSignal::pair();

    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.start_cancellable(request(1), signal).await })
    };
    chain.bridge_entered.notified().await;
    handle.cancel();
    gate.notify_one();

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, LaunchError::Cancelled(launchhub::Stage::Bridging)));

    let events = drain(&mut rx);
    let mine = for_request(&events, "req-1");
    assert_eq!(progress_stages(&mine), vec!["validating", "bridging"]);
    let last = mine.last().unwrap();
    assert_eq!(last.kind, MINT_CANCELLED);
    assert_eq!(last.data["stage"], "bridging");
    assert!(mine.iter().all(|e| e.kind != MINT_ERROR));
    assert_eq!(chain.mint_calls.load(Ordering::SeqCst), 0);
}
