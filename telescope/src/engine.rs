//! Telescope engine
//!
//! A background task owns the driver and the job queue. On every iteration
//! it connects, runs at most one queued job, reads the position and
//! disconnects, then publishes an immutable [`TelescopeSnapshot`]. Readers
//! and job producers only ever touch the cloneable [`TelescopeHandle`].

use crate::driver::TelescopeDriver;
use crate::error::TelescopeResult;
use crate::status::StatusClassifier;
use chrono::{DateTime, Utc};
use crac_core::{AltazCoords, EquatorialCoords, TelescopeSpeed, TelescopeStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A queued telescope action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Sync,
    SetSpeed(TelescopeSpeed),
    Park(TelescopeSpeed),
    Flat(TelescopeSpeed),
}

/// Everything known about the telescope after one polling iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelescopeSnapshot {
    pub status: TelescopeStatus,
    pub speed: TelescopeSpeed,
    pub aa: Option<AltazCoords>,
    pub eq: Option<EquatorialCoords>,
    /// A sync job completed since startup
    pub synced: bool,
    pub sync_time: Option<DateTime<Utc>>,
}

impl TelescopeSnapshot {
    pub fn disconnected() -> Self {
        Self {
            status: TelescopeStatus::Disconnected,
            speed: TelescopeSpeed::Error,
            aa: None,
            eq: None,
            synced: false,
            sync_time: None,
        }
    }
}

impl Default for TelescopeSnapshot {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// Reader and producer side of the engine
#[derive(Clone)]
pub struct TelescopeHandle {
    jobs: mpsc::UnboundedSender<Job>,
    snapshot: watch::Receiver<TelescopeSnapshot>,
    tracking_off: bool,
}

impl TelescopeHandle {
    /// Latest published snapshot
    pub fn snapshot(&self) -> TelescopeSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> TelescopeStatus {
        self.snapshot.borrow().status
    }

    pub fn speed(&self) -> TelescopeSpeed {
        self.snapshot.borrow().speed
    }

    pub fn tracking_off_capability(&self) -> bool {
        self.tracking_off
    }

    pub fn queue_sync(&self) {
        self.enqueue(Job::Sync);
    }

    pub fn queue_set_speed(&self, speed: TelescopeSpeed) {
        self.enqueue(Job::SetSpeed(self.supported_speed(speed)));
    }

    pub fn queue_park(&self, speed: TelescopeSpeed) {
        self.enqueue(Job::Park(self.supported_speed(speed)));
    }

    pub fn queue_flat(&self, speed: TelescopeSpeed) {
        self.enqueue(Job::Flat(self.supported_speed(speed)));
    }

    /// Mounts that cannot stop tracking keep tracking instead
    fn supported_speed(&self, speed: TelescopeSpeed) -> TelescopeSpeed {
        if speed == TelescopeSpeed::NotTracking && !self.tracking_off {
            TelescopeSpeed::Tracking
        } else {
            speed
        }
    }

    fn enqueue(&self, job: Job) {
        debug!(?job, "queueing telescope job");
        if self.jobs.send(job).is_err() {
            warn!(?job, "Telescope engine is gone, job dropped");
        }
    }
}

struct Worker {
    driver: Box<dyn TelescopeDriver>,
    jobs: mpsc::UnboundedReceiver<Job>,
    classifier: StatusClassifier,
    publisher: Arc<watch::Sender<TelescopeSnapshot>>,
    poll_interval: Duration,
}

enum WorkerSlot {
    Idle(Worker),
    Running(JoinHandle<Worker>),
    /// The polling task panicked and took the driver with it
    Poisoned,
}

/// Owns the polling task and its driver
pub struct TelescopeEngine {
    handle: TelescopeHandle,
    polling: Arc<AtomicBool>,
    publisher: Arc<watch::Sender<TelescopeSnapshot>>,
    worker: Mutex<WorkerSlot>,
}

impl TelescopeEngine {
    pub fn new(
        driver: Box<dyn TelescopeDriver>,
        classifier: StatusClassifier,
        poll_interval: Duration,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(TelescopeSnapshot::disconnected());
        let publisher = Arc::new(snapshot_tx);

        let handle = TelescopeHandle {
            jobs: jobs_tx,
            snapshot: snapshot_rx,
            tracking_off: driver.tracking_off_capability(),
        };
        let worker = Worker {
            driver,
            jobs: jobs_rx,
            classifier,
            publisher: publisher.clone(),
            poll_interval,
        };

        Self {
            handle,
            polling: Arc::new(AtomicBool::new(false)),
            publisher,
            worker: Mutex::new(WorkerSlot::Idle(worker)),
        }
    }

    pub fn handle(&self) -> TelescopeHandle {
        self.handle.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Start the polling task; no-op when already running
    pub async fn polling_start(&self) {
        let mut slot = self.worker.lock().await;
        *slot = match std::mem::replace(&mut *slot, WorkerSlot::Poisoned) {
            WorkerSlot::Idle(worker) => {
                self.polling.store(true, Ordering::SeqCst);
                WorkerSlot::Running(tokio::spawn(worker.run(self.polling.clone())))
            }
            WorkerSlot::Running(task) => WorkerSlot::Running(task),
            WorkerSlot::Poisoned => {
                error!("Telescope polling task was lost, cannot restart polling");
                WorkerSlot::Poisoned
            }
        };
    }

    /// Stop the polling task and wait for it; no-op when not running.
    ///
    /// Publishes DISCONNECTED with no coordinates and speed ERROR.
    pub async fn polling_end(&self) {
        let mut slot = self.worker.lock().await;
        self.polling.store(false, Ordering::SeqCst);

        *slot = match std::mem::replace(&mut *slot, WorkerSlot::Poisoned) {
            WorkerSlot::Running(task) => match task.await {
                Ok(worker) => WorkerSlot::Idle(worker),
                Err(e) => {
                    error!("Telescope polling task failed: {}", e);
                    WorkerSlot::Poisoned
                }
            },
            other => other,
        };

        self.publisher.send_modify(|snapshot| {
            snapshot.status = TelescopeStatus::Disconnected;
            snapshot.speed = TelescopeSpeed::Error;
            snapshot.aa = None;
            snapshot.eq = None;
        });
    }
}

impl Drop for TelescopeEngine {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::SeqCst);
    }
}

impl Worker {
    async fn run(mut self, polling: Arc<AtomicBool>) -> Self {
        info!("Telescope polling started ({} driver)", self.driver.name());
        while polling.load(Ordering::SeqCst) {
            self.poll_once().await;
            tokio::time::sleep(self.poll_interval).await;
        }
        info!("Telescope polling stopped");
        self
    }

    async fn poll_once(&mut self) {
        if let Err(e) = self.driver.connect().await {
            warn!("Telescope connection failed: {}", e);
            self.publish_fault(TelescopeStatus::Lost);
            return;
        }

        let failed = match self.jobs.try_recv() {
            Ok(job) => match self.execute(job).await {
                Ok(()) => false,
                Err(e) => {
                    error!(?job, "Telescope job failed, dropping it: {}", e);
                    self.publish_fault(TelescopeStatus::Error);
                    true
                }
            },
            Err(_) => false,
        };

        if !failed {
            self.refresh().await;
        }

        if let Err(e) = self.driver.disconnect().await {
            debug!("Telescope disconnect failed: {}", e);
        }
    }

    async fn execute(&mut self, job: Job) -> TelescopeResult<()> {
        debug!(?job, "executing telescope job");
        match job {
            Job::Sync => {
                self.driver.sync().await?;
                let now = Utc::now();
                self.publisher.send_modify(|snapshot| {
                    snapshot.synced = true;
                    snapshot.sync_time = Some(now);
                });
                info!("Telescope synced on park position at {}", now);
            }
            Job::SetSpeed(speed) => self.driver.set_speed(speed).await?,
            Job::Park(speed) => self.driver.park(speed).await?,
            Job::Flat(speed) => self.driver.flat(speed).await?,
        }
        Ok(())
    }

    async fn refresh(&mut self) {
        match self.driver.retrieve().await {
            Ok(reading) => {
                let status = self.classifier.classify(Some(reading.aa));
                self.publisher.send_modify(|snapshot| {
                    snapshot.status = status;
                    snapshot.speed = reading.speed;
                    snapshot.aa = Some(reading.aa);
                    snapshot.eq = Some(reading.eq);
                });
            }
            Err(e) => {
                let status = if e.is_connection_loss() {
                    TelescopeStatus::Lost
                } else {
                    TelescopeStatus::Error
                };
                warn!("Telescope position unavailable: {}", e);
                self.publish_fault(status);
            }
        }
    }

    /// Publish an unsafe status, keeping the last known coordinates
    fn publish_fault(&self, status: TelescopeStatus) {
        self.publisher.send_modify(|snapshot| {
            snapshot.status = status;
            snapshot.speed = TelescopeSpeed::Error;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Reading;
    use crate::error::TelescopeError;
    use async_trait::async_trait;
    use crac_core::AzimuthConfig;
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Script {
        calls: Vec<String>,
        unreachable: bool,
        failing_jobs: u32,
        reading: Option<Reading>,
    }

    /// Driver replaying a shared script and logging every call
    struct ScriptedDriver {
        script: Arc<StdMutex<Script>>,
        tracking_off: bool,
    }

    impl ScriptedDriver {
        fn job(&self, call: String) -> TelescopeResult<()> {
            let mut script = self.script.lock().unwrap();
            script.calls.push(call);
            if script.failing_jobs > 0 {
                script.failing_jobs -= 1;
                return Err(TelescopeError::Protocol("scripted failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TelescopeDriver for ScriptedDriver {
        fn name(&self) -> &str {
            "scripted"
        }

        fn tracking_off_capability(&self) -> bool {
            self.tracking_off
        }

        async fn connect(&mut self) -> TelescopeResult<()> {
            let mut script = self.script.lock().unwrap();
            script.calls.push("connect".to_string());
            if script.unreachable {
                return Err(TelescopeError::NotConnected);
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> TelescopeResult<()> {
            self.script.lock().unwrap().calls.push("disconnect".to_string());
            Ok(())
        }

        async fn sync(&mut self) -> TelescopeResult<()> {
            self.job("sync".to_string())
        }

        async fn set_speed(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
            self.job(format!("speed {:?}", speed))
        }

        async fn park(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
            self.job(format!("park {:?}", speed))
        }

        async fn flat(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
            self.job(format!("flat {:?}", speed))
        }

        async fn retrieve(&mut self) -> TelescopeResult<Reading> {
            let mut script = self.script.lock().unwrap();
            script.calls.push("retrieve".to_string());
            script
                .reading
                .ok_or_else(|| TelescopeError::Parse("no reading".to_string()))
        }
    }

    fn classifier() -> StatusClassifier {
        StatusClassifier {
            park: AltazCoords::new(0.0, 180.0),
            flat: AltazCoords::new(5.0, 90.0),
            max_secure_alt: 15.0,
            azimuth: AzimuthConfig::default(),
        }
    }

    fn reading(alt: f64, az: f64, speed: TelescopeSpeed) -> Reading {
        Reading {
            aa: AltazCoords::new(alt, az),
            eq: EquatorialCoords::new(1.0, 2.0),
            speed,
        }
    }

    fn engine(tracking_off: bool) -> (TelescopeEngine, Arc<StdMutex<Script>>) {
        engine_with_interval(tracking_off, Duration::from_millis(2))
    }

    fn engine_with_interval(
        tracking_off: bool,
        poll_interval: Duration,
    ) -> (TelescopeEngine, Arc<StdMutex<Script>>) {
        let script = Arc::new(StdMutex::new(Script {
            reading: Some(reading(45.0, 90.0, TelescopeSpeed::Tracking)),
            ..Default::default()
        }));
        let driver = ScriptedDriver {
            script: script.clone(),
            tracking_off,
        };
        let engine = TelescopeEngine::new(Box::new(driver), classifier(), poll_interval);
        (engine, script)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn calls(script: &Arc<StdMutex<Script>>) -> Vec<String> {
        script.lock().unwrap().calls.clone()
    }

    #[tokio::test]
    async fn test_initially_disconnected() {
        let (engine, script) = engine(true);
        assert_eq!(engine.handle().snapshot(), TelescopeSnapshot::disconnected());
        assert!(!engine.is_polling());
        assert!(calls(&script).is_empty());
    }

    #[tokio::test]
    async fn test_polling_publishes_position() {
        let (engine, _script) = engine(true);
        let handle = engine.handle();
        engine.polling_start().await;
        engine.polling_start().await;

        wait_until(|| handle.status() == TelescopeStatus::East).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.speed, TelescopeSpeed::Tracking);
        assert_eq!(snapshot.aa, Some(AltazCoords::new(45.0, 90.0)));

        engine.polling_end().await;
    }

    #[tokio::test]
    async fn test_polling_end_resets_state() {
        let (engine, script) = engine(true);
        let handle = engine.handle();
        engine.polling_start().await;
        wait_until(|| handle.status() == TelescopeStatus::East).await;

        engine.polling_end().await;
        engine.polling_end().await;
        assert!(!engine.is_polling());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, TelescopeStatus::Disconnected);
        assert_eq!(snapshot.speed, TelescopeSpeed::Error);
        assert_eq!(snapshot.aa, None);
        assert_eq!(snapshot.eq, None);

        // Loop has joined: no more driver traffic
        let seen = calls(&script).len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls(&script).len(), seen);
    }

    #[tokio::test]
    async fn test_restart_after_end() {
        let (engine, _script) = engine(true);
        let handle = engine.handle();
        engine.polling_start().await;
        engine.polling_end().await;
        engine.polling_start().await;
        wait_until(|| handle.status() == TelescopeStatus::East).await;
        engine.polling_end().await;
    }

    #[tokio::test]
    async fn test_connection_failure_is_lost_and_keeps_jobs() {
        let (engine, script) = engine(true);
        script.lock().unwrap().unreachable = true;
        let handle = engine.handle();
        handle.queue_park(TelescopeSpeed::NotTracking);

        engine.polling_start().await;
        wait_until(|| handle.status() == TelescopeStatus::Lost).await;
        assert!(!calls(&script).iter().any(|c| c.starts_with("park")));

        script.lock().unwrap().unreachable = false;
        wait_until(|| calls(&script).iter().any(|c| c.starts_with("park"))).await;
        engine.polling_end().await;
    }

    #[tokio::test]
    async fn test_failed_job_reports_error_and_is_dropped() {
        // Long interval so the ERROR snapshot stays up between iterations
        let (engine, script) = engine_with_interval(true, Duration::from_millis(300));
        script.lock().unwrap().failing_jobs = 1;
        let handle = engine.handle();
        handle.queue_sync();

        engine.polling_start().await;
        wait_until(|| handle.status() == TelescopeStatus::Error).await;
        assert!(!handle.snapshot().synced);

        wait_until(|| handle.status() == TelescopeStatus::East).await;
        engine.polling_end().await;

        let all = calls(&script);
        assert_eq!(all.iter().filter(|c| *c == "sync").count(), 1);
        // The failing iteration skipped the position read
        let sync_at = all.iter().position(|c| c == "sync").unwrap();
        assert_eq!(all[sync_at + 1], "disconnect");
    }

    #[tokio::test]
    async fn test_jobs_run_one_per_iteration_in_order() {
        let (engine, script) = engine(true);
        let handle = engine.handle();
        handle.queue_sync();
        handle.queue_set_speed(TelescopeSpeed::Slewing);
        handle.queue_flat(TelescopeSpeed::NotTracking);

        engine.polling_start().await;
        wait_until(|| calls(&script).iter().any(|c| c.starts_with("flat"))).await;
        engine.polling_end().await;

        let all = calls(&script);
        let jobs: Vec<&String> = all
            .iter()
            .filter(|c| !matches!(c.as_str(), "connect" | "disconnect" | "retrieve"))
            .collect();
        assert_eq!(jobs, ["sync", "speed Slewing", "flat NotTracking"]);

        let connects = all.iter().filter(|c| *c == "connect").count();
        assert!(connects >= 3);
        assert!(handle.snapshot().synced);
        assert!(handle.snapshot().sync_time.is_some());
    }

    #[tokio::test]
    async fn test_not_tracking_upgraded_without_capability() {
        let (engine, script) = engine(false);
        let handle = engine.handle();
        handle.queue_set_speed(TelescopeSpeed::NotTracking);
        handle.queue_park(TelescopeSpeed::NotTracking);

        engine.polling_start().await;
        wait_until(|| calls(&script).iter().any(|c| c.starts_with("park"))).await;
        engine.polling_end().await;

        let all = calls(&script);
        assert!(all.contains(&"speed Tracking".to_string()));
        assert!(all.contains(&"park Tracking".to_string()));
    }

    #[tokio::test]
    async fn test_retrieve_failure_is_error() {
        let (engine, script) = engine(true);
        script.lock().unwrap().reading = None;
        let handle = engine.handle();
        engine.polling_start().await;
        wait_until(|| handle.status() == TelescopeStatus::Error).await;
        assert_eq!(handle.speed(), TelescopeSpeed::Error);
        engine.polling_end().await;
    }
}
