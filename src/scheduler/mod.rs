//! Scheduler module for running one polling loop per target.

use crate::db::{HistoryRecord, Outcome, Store};
use crate::notify::Notifier;
use crate::probe::HttpProber;
use crate::state::{StateTracker, Transition};
use crate::targets::{Target, TargetRegistry};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Collaborators shared by every target loop.
#[derive(Clone)]
pub struct Engine {
    prober: HttpProber,
    store: Store,
    tracker: Arc<StateTracker>,
    notifier: Notifier,
}

/// What a single cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: Outcome,
    pub transition: Transition,
    /// Sequence id of the history record, `None` if the append failed.
    pub record_id: Option<i64>,
    /// In-flight notification deliveries, empty when nothing changed.
    pub deliveries: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(
        prober: HttpProber,
        store: Store,
        tracker: Arc<StateTracker>,
        notifier: Notifier,
    ) -> Self {
        Self {
            prober,
            store,
            tracker,
            notifier,
        }
    }

    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    /// Probe, record, detect a transition, notify on change, log.
    ///
    /// Never fails: storage and delivery errors are logged and absorbed.
    pub async fn run_cycle(&self, target: &Target) -> CycleReport {
        let outcome = self.prober.probe(target).await;

        let record = HistoryRecord::new(target, &outcome);
        let record_id = match self
            .store
            .blocking(move |s| {
                let mut record = record;
                s.append(&mut record)
            })
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!("Failed to record check for {}: {}", target.name, e);
                None
            }
        };

        let transition = self.tracker.observe(&target.url, outcome.status);
        let deliveries = if transition.changed {
            tracing::info!(
                "{} changed {} -> {}",
                target.name,
                transition
                    .previous
                    .map(|s| s.as_str())
                    .unwrap_or("UNKNOWN"),
                outcome.status
            );
            self.notifier.notify(target, &outcome)
        } else {
            Vec::new()
        };

        tracing::info!(
            "{} {} -> {} ({})",
            target.name,
            target.url,
            outcome.status,
            outcome.detail
        );

        CycleReport {
            outcome,
            transition,
            record_id,
            deliveries,
        }
    }
}

/// Owns one supervised polling task per target.
pub struct Scheduler {
    engine: Engine,
    default_interval: Duration,
    stop_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(engine: Engine, default_interval: Duration) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            engine,
            default_interval,
            stop_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register every target as unknown and start its loop.
    pub async fn start(&self, registry: &TargetRegistry) {
        if registry.is_empty() {
            tracing::warn!("Scheduler: no targets to start");
            return;
        }
        tracing::info!("Starting scheduler with {} targets", registry.len());

        for target in registry.targets() {
            self.engine.tracker().register(&target.url);
        }

        let mut tasks = self.tasks.lock().await;
        for target in registry.targets() {
            let interval = target.effective_interval(self.default_interval);
            tracing::info!(
                "Scheduler: Adding target {} every {:?}",
                target.name,
                interval
            );

            let handle = tokio::spawn(run_target_loop(
                self.engine.clone(),
                target.clone(),
                interval,
                self.stop_tx.subscribe(),
            ));
            tasks.push((target.name.clone(), handle));
        }
    }

    /// Number of loops still running.
    pub async fn running(&self) -> usize {
        let tasks = self.tasks.lock().await;
        tasks.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Signal every loop to stop and wait for them to exit.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler: loop for {} ended abnormally: {}", name, e);
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

/// Check, then sleep the interval, until stopped.
async fn run_target_loop(
    engine: Engine,
    target: Target,
    interval: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    loop {
        // Deliveries finish on their own.
        let _ = engine.run_cycle(&target).await;

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Status;
    use crate::notify::testing::RecordingTransport;
    use crate::notify::Transport;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Store,
        transport: Arc<RecordingTransport>,
        engine: Engine,
    }

    fn harness(timeout: Duration) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("history.db")).unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(vec![transport.clone() as Arc<dyn Transport>]);
        let engine = Engine::new(
            HttpProber::new(timeout).unwrap(),
            store.clone(),
            Arc::new(StateTracker::new()),
            notifier,
        );
        Harness {
            _dir: dir,
            store,
            transport,
            engine,
        }
    }

    async fn settle(mut report: CycleReport) -> CycleReport {
        for handle in report.deliveries.drain(..) {
            handle.await.unwrap();
        }
        report
    }

    async fn cycle_with(
        server: &mut mockito::ServerGuard,
        engine: &Engine,
        target: &Target,
        code: usize,
    ) -> CycleReport {
        let mock = server
            .mock("GET", "/health")
            .with_status(code)
            .create_async()
            .await;
        let report = settle(engine.run_cycle(target).await).await;
        mock.remove_async().await;
        report
    }

    #[tokio::test]
    async fn test_notifies_only_on_transitions() {
        let h = harness(Duration::from_secs(5));
        let mut server = mockito::Server::new_async().await;
        let target = Target::new("api", &format!("{}/health", server.url()));

        let first = cycle_with(&mut server, &h.engine, &target, 200).await;
        assert_eq!(first.outcome.status, Status::Up);
        assert!(first.transition.changed);
        assert_eq!(first.transition.previous, None);

        let second = cycle_with(&mut server, &h.engine, &target, 503).await;
        assert_eq!(second.outcome.status, Status::Down);
        assert!(second.transition.changed);
        assert_eq!(second.transition.previous, Some(Status::Up));

        let third = cycle_with(&mut server, &h.engine, &target, 500).await;
        assert!(!third.transition.changed);

        let fourth = cycle_with(&mut server, &h.engine, &target, 404).await;
        assert_eq!(fourth.outcome.status, Status::Up);
        assert!(fourth.transition.changed);

        let sent = h.transport.messages();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].text.contains("-> UP\nHTTP 200"));
        assert!(sent[1].text.contains("-> DOWN\nHTTP 503"));
        assert!(sent[2].text.contains("-> UP\nHTTP 404"));

        let history = h.store.recent_records(10).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(
            history.iter().map(|r| r.http_code).collect::<Vec<_>>(),
            vec![Some(404), Some(500), Some(503), Some(200)]
        );
        assert_eq!(history[0].id, fourth.record_id.unwrap());
    }

    #[tokio::test]
    async fn test_timeouts_notify_once() {
        let h = harness(Duration::from_millis(200));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let target = Target::new("slow", &format!("http://{}/", addr));

        let first = settle(h.engine.run_cycle(&target).await).await;
        let second = settle(h.engine.run_cycle(&target).await).await;
        silent.abort();

        assert_eq!(first.outcome.status, Status::Down);
        assert!(first.outcome.detail.starts_with("timeout"));
        assert!(first.transition.changed);
        assert!(!second.transition.changed);
        assert_eq!(h.transport.messages().len(), 1);

        let history = h.store.recent_records(10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.http_code.is_none() && r.latency_ms.is_none()));
    }

    #[tokio::test]
    async fn test_failed_append_still_notifies() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("history.db")).unwrap();
        drop(dir);

        let transport = Arc::new(RecordingTransport::default());
        let engine = Engine::new(
            HttpProber::new(Duration::from_secs(2)).unwrap(),
            store,
            Arc::new(StateTracker::new()),
            Notifier::new(vec![transport.clone() as Arc<dyn Transport>]),
        );

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .create_async()
            .await;
        let target = Target::new("api", &format!("{}/", server.url()));

        let report = settle(engine.run_cycle(&target).await).await;
        assert!(report.record_id.is_none());
        assert!(report.transition.changed);
        assert_eq!(transport.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_runs_each_target_until_stopped() {
        let h = harness(Duration::from_secs(2));
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_status(200)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_status(503)
            .create_async()
            .await;

        let registry = TargetRegistry::new(vec![
            Target::new("a", &format!("{}/a", server.url())).with_interval(Duration::from_millis(50)),
            Target::new("b", &format!("{}/b", server.url())),
        ])
        .unwrap();

        let scheduler = Scheduler::new(h.engine.clone(), Duration::from_secs(3600));
        scheduler.start(&registry).await;
        assert_eq!(scheduler.running().await, 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop().await;
        assert_eq!(scheduler.running().await, 0);

        let a_url = &registry.targets()[0].url;
        let b_url = &registry.targets()[1].url;
        let a_checks = h.store.recent_records_for(a_url, 100).unwrap();
        let b_checks = h.store.recent_records_for(b_url, 100).unwrap();
        assert!(a_checks.len() >= 3, "fast target ran {} times", a_checks.len());
        assert_eq!(b_checks.len(), 1);
        assert!(b_checks.iter().all(|r| r.status == Status::Down));

        // Give detached deliveries a moment to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.transport.messages().len(), 2);

        let count = h.store.count().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.store.count().unwrap(), count);
    }
}
