use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::{Camera, CameraLease, FaceError, FaceMatch, FaceRecognizer};
use crate::db;
use crate::engine::AttendanceEngine;
use crate::error::AppError;
use crate::models::Member;

pub const DEFAULT_WARMUP: Duration = Duration::from_millis(2000);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

/// Result of one scan tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    NotConfigured,
    NoFrame,
    NotRecognized,
    /// The vendor matched a face whose label belongs to no member.
    Mismatch { label: String },
    CheckedIn { member_id: i64, first_name: String },
    Failed { message: String },
}

impl ScanOutcome {
    /// Text for the operator's screen.
    pub fn feedback(&self) -> String {
        match self {
            ScanOutcome::NotConfigured => "API Config Missing".to_string(),
            ScanOutcome::NoFrame => "Waiting for camera".to_string(),
            ScanOutcome::NotRecognized => "Not Recognized".to_string(),
            ScanOutcome::Mismatch { label } => format!("ID Mismatch: {}", label),
            ScanOutcome::CheckedIn { first_name, .. } => format!("Welcome, {}!", first_name),
            ScanOutcome::Failed { message } => format!("Error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub at: NaiveDateTime,
    pub feedback: String,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

/// Background loop that grabs a frame every interval, identifies the face
/// and checks the member in.
#[derive(Clone)]
pub struct FaceScanner {
    engine: AttendanceEngine,
    recognizer: Arc<dyn FaceRecognizer>,
    camera: Camera,
    warmup: Duration,
    interval: Duration,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    last_report: Arc<RwLock<Option<ScanReport>>>,
}

impl FaceScanner {
    pub fn new(
        engine: AttendanceEngine,
        recognizer: Arc<dyn FaceRecognizer>,
        camera: Camera,
        warmup: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            recognizer,
            camera,
            warmup,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task: Arc::new(Mutex::new(None)),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<ScanReport> {
        self.last_report
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes the camera and spawns the loop. Returns `false` if a loop is
    /// already running.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<bool, AppError> {
        let mut task = self.task.lock().await;

        if self.is_running() {
            info!("Scanner already running");
            return Ok(false);
        }
        // A loop told to stop may still be finishing its tick.
        Self::join(task.take()).await;

        let lease = self.camera.acquire()?;
        self.running.store(true, Ordering::SeqCst);

        let scanner = self.clone();
        *task = Some(tokio::spawn(async move { scanner.run(lease).await }));
        info!("Scanner started");

        Ok(true)
    }

    /// Stops the loop and waits for it to hand the camera back. A tick in
    /// progress is finished first. Returns `false` if nothing was running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> bool {
        let mut task = self.task.lock().await;

        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            info!("Scanner stopping");
            self.wake.notify_waiters();
        }
        Self::join(task.take()).await;

        was_running
    }

    async fn join(handle: Option<JoinHandle<()>>) {
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scanner task ended abnormally");
            }
        }
    }

    async fn run(self, lease: CameraLease) {
        self.pause(self.warmup).await;

        while self.is_running() {
            let outcome = self.scan_once(&lease).await;
            self.record(outcome);
            self.pause(self.interval).await;
        }

        drop(lease);
        info!("Scanner stopped");
    }

    /// Sleeps for `period` unless `stop()` comes first.
    async fn pause(&self, period: Duration) {
        let stopped = self.wake.notified();
        tokio::pin!(stopped);
        // Registered before the flag is read, so a stop in between still wakes us.
        stopped.as_mut().enable();
        if !self.is_running() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = stopped => {}
        }
    }

    fn record(&self, outcome: ScanOutcome) {
        let report = ScanReport {
            at: self.engine.clock().now(),
            feedback: outcome.feedback(),
            outcome,
        };
        *self
            .last_report
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
    }

    /// One grab, identify and check-in cycle.
    #[instrument(skip(self, lease))]
    pub async fn scan_once(&self, lease: &CameraLease) -> ScanOutcome {
        if !self.recognizer.is_configured() {
            return ScanOutcome::NotConfigured;
        }

        let frame = match lease.grab().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return ScanOutcome::NoFrame,
            Err(e) => {
                e.log_and_record("Scanner frame grab");
                return ScanOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        let found = match self.recognizer.recognize_face(&frame).await {
            Ok(Some(found)) => found,
            Ok(None) => return ScanOutcome::NotRecognized,
            Err(FaceError::NotConfigured) => return ScanOutcome::NotConfigured,
            Err(e) => {
                warn!(error = %e, "Recognition request failed");
                return ScanOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        let member = match self.resolve_member(&found).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                warn!(label = %found.label, "Recognized face has no matching member");
                return ScanOutcome::Mismatch { label: found.label };
            }
            Err(e) => {
                e.log_and_record("Scanner member lookup");
                return ScanOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        match self.engine.check_in(member.id).await {
            Ok(_) => ScanOutcome::CheckedIn {
                member_id: member.id,
                first_name: member.first_name,
            },
            Err(e) => {
                e.log_and_record("Scanner check-in");
                ScanOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Stored face token first, then the enrollment label as a full name.
    async fn resolve_member(&self, found: &FaceMatch) -> Result<Option<Member>, AppError> {
        if let Some(token) = found.token.as_deref() {
            if let Some(member) = db::find_member_by_face_id(self.engine.pool(), token).await? {
                return Ok(Some(member));
            }
        }
        db::find_member_by_full_name(self.engine.pool(), &found.label).await
    }
}
