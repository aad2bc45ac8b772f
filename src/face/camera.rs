use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::{debug, info, instrument, warn};

use crate::error::AppError;

/// Anything that can hand out encoded still frames.
pub trait FrameSource: Send {
    fn open(&mut self) -> io::Result<()>;
    fn close(&mut self);
    /// `Ok(None)` when the device has nothing to offer yet.
    fn grab(&mut self) -> io::Result<Option<Vec<u8>>>;
}

struct CameraState {
    source: Box<dyn FrameSource>,
    open: bool,
    leased: bool,
}

/// Shared handle to the single capture device.
///
/// At most one [`CameraLease`] exists at a time. The device is opened on
/// acquire and closed when the lease is dropped.
#[derive(Clone)]
pub struct Camera {
    state: Arc<Mutex<CameraState>>,
}

impl Camera {
    pub fn new(source: impl FrameSource + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState {
                source: Box::new(source),
                open: false,
                leased: false,
            })),
        }
    }

    fn lock(state: &Mutex<CameraState>) -> MutexGuard<'_, CameraState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(skip(self))]
    pub fn acquire(&self) -> Result<CameraLease, AppError> {
        let mut state = Self::lock(&self.state);

        if state.leased {
            return Err(AppError::CameraUnavailable(
                "Camera is already in use.".to_string(),
            ));
        }

        if !state.open {
            state.source.open().map_err(|e| {
                warn!(error = %e, "Failed to open camera");
                AppError::CameraUnavailable(format!("Could not open camera: {}", e))
            })?;
            state.open = true;
            info!("Camera opened");
        }

        state.leased = true;
        Ok(CameraLease {
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_open(&self) -> bool {
        Self::lock(&self.state).open
    }

    pub fn is_leased(&self) -> bool {
        Self::lock(&self.state).leased
    }
}

/// Exclusive use of the camera. Dropping it releases the device.
pub struct CameraLease {
    state: Arc<Mutex<CameraState>>,
}

impl CameraLease {
    pub async fn grab(&self) -> Result<Option<Vec<u8>>, AppError> {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let mut state = Camera::lock(&state);
            if !state.open {
                return Ok(None);
            }
            state.source.grab()
        })
        .await
        .map_err(|e| AppError::Internal(format!("Frame capture task failed: {}", e)))?
        .map_err(|e| AppError::CameraUnavailable(format!("Could not read frame: {}", e)))
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        let mut state = Camera::lock(&self.state);
        if state.open {
            state.source.close();
            state.open = false;
            info!("Camera released");
        }
        state.leased = false;
    }
}

/// Reads the newest image from a directory that a capture process writes
/// into.
#[derive(Debug)]
pub struct SpoolDirFrameSource {
    dir: PathBuf,
    open: bool,
}

impl SpoolDirFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: false,
        }
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false)
    }

    fn newest_frame(&self) -> io::Result<Option<PathBuf>> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || !Self::is_image(&path) {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }

        Ok(newest.map(|(_, path)| path))
    }
}

impl FrameSource for SpoolDirFrameSource {
    fn open(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn grab(&mut self) -> io::Result<Option<Vec<u8>>> {
        if !self.open {
            return Ok(None);
        }
        match self.newest_frame()? {
            Some(path) => {
                debug!(path = %path.display(), "Read frame");
                fs::read(path).map(Some)
            }
            None => Ok(None),
        }
    }
}
