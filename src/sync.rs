use std::{path::PathBuf, sync::Arc};

use chrono::{Local, NaiveDate};
use color_eyre::{Result, eyre::Context};
use tokio::{
    select,
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod delta;
pub mod model;
pub mod patch;
pub mod paths;
pub mod projection;
pub mod scan;
pub mod store;

use crate::export::{self, ExportKind};
use delta::FeedEvent;
use model::{CustomerReference, Moment};
use patch::PatchSummary;
use scan::{ScanOutcome, ScanRequest};
use store::{MultiPathUpdate, RemoteStore, SharedStore, StoreError};

#[derive(Debug, Clone)]
pub enum Command {
    /// (Re-)subscribe to every feed, dropping earlier subscriptions.
    Attach,
    Scan {
        request: ScanRequest,
        customers: Arc<[CustomerReference]>,
    },
    Patch(String),
    Reset,
    Export(ExportKind),
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Sent before any feed event of the new attachment.
    Attached { generation: u64, today: NaiveDate },
    Feed { generation: u64, event: FeedEvent },
    Connectivity(bool),
    ScanCommitted(ScanOutcome),
    PatchApplied(PatchSummary),
    ResetDone,
    Exported(Vec<PathBuf>),
    Failure(String),
}

pub fn start_async(
    store: SharedStore,
    cmd_rx: UnboundedReceiver<Command>,
    evt_tx: UnboundedSender<Event>,
    export_dir: PathBuf,
) -> JoinHandle<()> {
    let handler = SyncHandler {
        store,
        cmd_rx,
        evt_tx,
        export_dir,
        attachment: None,
        generation: 0,
    };
    tokio::spawn(handler.run())
}

struct SyncHandler {
    store: SharedStore,
    cmd_rx: UnboundedReceiver<Command>,
    evt_tx: UnboundedSender<Event>,
    export_dir: PathBuf,
    attachment: Option<CancellationToken>,
    generation: u64,
}

impl SyncHandler {
    async fn run(mut self) {
        loop {
            select! {
                biased; // Stop should take prio
                _ = self.evt_tx.closed() => {
                    debug!("Sync events channel closed, shutting down sync handler...");
                    break;
                },
                work_opt = self.cmd_rx.recv() => {
                    let Some(work) = work_opt else {
                        debug!("Sync commands channel closed, shutting down sync handler...");
                        break;
                    };
                    info!("Sync command: {work:?}");
                    self.try_handle(work).await;
                }
            }
        }
        self.detach();
    }

    async fn try_handle(&mut self, cmd: Command) {
        let event = match self.handle(cmd).await {
            Ok(event) => event,
            Err(err) => {
                error!("Error handling sync command: {err:?}");
                Event::Failure(format!("{err:#}"))
            }
        };
        self.notify(event);
        self.notify(Event::Connectivity(self.store.is_connected()));
    }

    fn notify(&self, event: Event) {
        if let Err(err) = self.evt_tx.send(event) {
            debug!("Unable to send sync event: {err:?}");
        }
    }

    async fn handle(&mut self, cmd: Command) -> Result<Event> {
        let store = self.store.clone();
        match cmd {
            Command::Attach => {
                let today = Local::now().date_naive();
                self.attach(today).await?;
                Ok(Event::Connectivity(store.is_connected()))
            }
            Command::Scan { request, customers } => {
                let outcome = scan::scan(store.as_ref(), &request, &customers, Moment::now())
                    .await
                    .wrap_err_with(|| format!("{} scan of {:?}", request.mode, request.code))?;
                Ok(Event::ScanCommitted(outcome))
            }
            Command::Patch(raw) => {
                let summary = patch::apply(store.as_ref(), &raw, Moment::now())
                    .await
                    .wrap_err("applying patch")?;
                Ok(Event::PatchApplied(summary))
            }
            Command::Reset => {
                reset(store.as_ref()).await.wrap_err("resetting history")?;
                Ok(Event::ResetDone)
            }
            Command::Export(kind) => {
                let today = Local::now().date_naive();
                let written = export::export(store.as_ref(), kind, &self.export_dir, today)
                    .await
                    .wrap_err_with(|| format!("exporting {kind}"))?;
                Ok(Event::Exported(written))
            }
        }
    }

    async fn attach(&mut self, today: NaiveDate) -> Result<()> {
        self.detach();
        self.generation += 1;
        let generation = self.generation;
        self.notify(Event::Attached { generation, today });

        let streams = delta::subscribe_all(self.store.as_ref())
            .await
            .wrap_err("subscribing to remote collections")?;
        let token = CancellationToken::new();
        for (feed, mut stream) in streams {
            let token = token.clone();
            let evt_tx = self.evt_tx.clone();
            tokio::spawn(async move {
                loop {
                    select! {
                        _ = token.cancelled() => break,
                        next = stream.recv() => {
                            let Some(event) = next else {
                                warn!("Feed {feed} closed");
                                let _ = evt_tx.send(Event::Connectivity(false));
                                break;
                            };
                            let event = Event::Feed { generation, event: FeedEvent { feed, event } };
                            if evt_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
        self.attachment = Some(token);
        info!("Attached feeds for {today} (generation {generation})");
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(token) = self.attachment.take() {
            token.cancel();
        }
    }
}

/// Clears the prepared history and every user tally in one write.
pub async fn reset(store: &dyn RemoteStore) -> Result<(), StoreError> {
    let mut update = MultiPathUpdate::new();
    update.remove(paths::collection(paths::PREPARED_BOWLS)?);
    update.remove(paths::collection(paths::MY_SCANS)?);
    store.atomic_update(update).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{
        delta::DeltaSync,
        model::ScanMode,
        projection::ProjectionState,
        store::MemoryStore,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::{sync::mpsc, time::timeout};

    struct Harness {
        cmd_tx: UnboundedSender<Command>,
        evt_rx: UnboundedReceiver<Event>,
        engine: Option<DeltaSync>,
        generation: u64,
        state: ProjectionState,
        failures: Vec<String>,
        committed: Vec<ScanOutcome>,
    }

    impl Harness {
        fn start(store: SharedStore) -> Self {
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let (evt_tx, evt_rx) = mpsc::unbounded_channel();
            start_async(store, cmd_rx, evt_tx, std::env::temp_dir());
            Self {
                cmd_tx,
                evt_rx,
                engine: None,
                generation: 0,
                state: ProjectionState::default(),
                failures: vec![],
                committed: vec![],
            }
        }

        /// Feeds events to the projection until nothing arrives for a while.
        async fn settle(&mut self) {
            while let Ok(Some(event)) = timeout(Duration::from_millis(100), self.evt_rx.recv()).await
            {
                match event {
                    Event::Attached { generation, today } => {
                        let engine = DeltaSync::new(today);
                        engine.start(&mut self.state);
                        self.engine = Some(engine);
                        self.generation = generation;
                    }
                    Event::Feed { generation, event } if generation == self.generation => {
                        if let Some(engine) = &self.engine {
                            engine.apply(&mut self.state, &event);
                        }
                    }
                    Event::ScanCommitted(outcome) => self.committed.push(outcome),
                    Event::Failure(msg) => self.failures.push(msg),
                    _ => {}
                }
            }
        }

        async fn send(&mut self, cmd: Command) {
            self.cmd_tx.send(cmd).unwrap();
            self.settle().await;
        }

        async fn scan(&mut self, code: &str, mode: ScanMode) {
            let request = ScanRequest {
                code: code.into(),
                mode,
                user: "Hamid".into(),
                dish: Some("A".into()),
            };
            let customers = self.state.customers.clone();
            self.send(Command::Scan { request, customers }).await;
        }
    }

    #[tokio::test]
    async fn test_counters_follow_scans() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut harness = Harness::start(store);
        harness.send(Command::Attach).await;

        for code in ["B1", "B2", "B3"] {
            harness.scan(code, ScanMode::Prep).await;
        }
        harness.scan("B2", ScanMode::Return).await;
        harness.scan("B404", ScanMode::Return).await;

        assert_eq!(harness.state.active_count, 2);
        assert_eq!(harness.state.prepared_today_count, 3);
        assert_eq!(harness.state.prepared_today.len(), 3);
        assert_eq!(harness.state.returned_today_count, 1);
        assert_eq!(harness.state.tally_for("Hamid"), 4);
        assert_eq!(harness.committed.len(), 4);
        assert_eq!(harness.failures.len(), 1);
        assert!(harness.failures[0].contains("not in circulation"));
    }

    #[tokio::test]
    async fn test_reattach_does_not_double_count() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut harness = Harness::start(store);
        harness.send(Command::Attach).await;
        harness.scan("B1", ScanMode::Prep).await;

        harness.send(Command::Attach).await;
        harness.scan("B2", ScanMode::Prep).await;

        assert_eq!(harness.state.active_count, 2);
        assert_eq!(harness.state.prepared_today_count, 2);
    }

    #[tokio::test]
    async fn test_reset_clears_prepared_today() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut harness = Harness::start(store);
        harness.send(Command::Attach).await;
        harness.scan("B1", ScanMode::Prep).await;
        harness.scan("B2", ScanMode::Prep).await;

        harness.send(Command::Reset).await;

        assert_eq!(harness.state.prepared_today_count, 0);
        assert!(harness.state.prepared_today.is_empty());
        assert_eq!(harness.state.tally_for("Hamid"), 0);
        assert_eq!(harness.state.active_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reset_then_prep_keeps_the_new_bowl() {
        for _ in 0..50 {
            let store: SharedStore = Arc::new(MemoryStore::new());
            let mut harness = Harness::start(store);
            let prep = |code: &str| Command::Scan {
                request: ScanRequest {
                    code: code.into(),
                    mode: ScanMode::Prep,
                    user: "Hamid".into(),
                    dish: Some("A".into()),
                },
                customers: Vec::new().into(),
            };
            for cmd in [Command::Attach, prep("B1"), Command::Reset, prep("B2")] {
                harness.cmd_tx.send(cmd).unwrap();
            }
            harness.settle().await;

            assert!(harness.failures.is_empty(), "{:?}", harness.failures);
            assert_eq!(harness.state.prepared_today_count, 1);
            assert_eq!(
                harness.state.prepared_today.values().map(|it| it.code.as_str()).collect::<Vec<_>>(),
                vec!["B2"]
            );
            assert_eq!(harness.state.tally_for("Hamid"), 1);
        }
    }

    #[tokio::test]
    async fn test_patch_feeds_customer_reference_into_prep() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut harness = Harness::start(store.clone());
        harness.send(Command::Attach).await;
        let raw = r#"{"name": "Acme", "deliveries": [{"id": "D1", "dishes": [
            {"label": "A", "bowlCodes": ["B100"], "users": [{"username": "Co1"}]}
        ]}]}"#;

        harness.send(Command::Patch(raw.to_owned())).await;
        harness.scan("B100", ScanMode::Prep).await;

        assert_eq!(harness.state.customers.len(), 1);
        assert!(harness.state.last_sync.is_some());
        assert_eq!(harness.committed[0].bowl.company, "Acme");
        assert_eq!(harness.committed[0].bowl.customer, "Co1");
        // the patched bowl was already active, re-prep is an overwrite
        assert_eq!(harness.state.active_count, 1);
    }

    #[tokio::test]
    async fn test_offline_scan_reports_failure() {
        let memory = Arc::new(MemoryStore::new());
        let store: SharedStore = memory.clone();
        let mut harness = Harness::start(store);
        harness.send(Command::Attach).await;
        memory.set_connected(false);

        harness.scan("B1", ScanMode::Prep).await;

        assert_eq!(harness.failures.len(), 1);
        assert!(harness.failures[0].contains("not connected"));
        assert_eq!(harness.state.active_count, 0);
        assert_eq!(memory.snapshot(), serde_json::json!({}));
    }
}
