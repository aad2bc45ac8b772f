//! Face-recognition check-in: the vendor client, the camera handle and the
//! polling scan loop.

pub mod camera;
pub mod luxand;
pub mod scanner;

pub use camera::*;
pub use luxand::*;
pub use scanner::*;

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use thiserror::Error;
use tracing::{info, instrument};

use crate::db;
use crate::error::AppError;

/// Best candidate returned by the vendor for a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    /// Label given at enrollment, the member's full name.
    pub label: String,
    /// Vendor's person id, when the response carries one.
    pub token: Option<String>,
    pub probability: f64,
}

#[derive(Debug, Error)]
pub enum FaceError {
    #[error("recognition API key is not set")]
    NotConfigured,

    #[error("request to recognition service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("recognition service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("no face detected in the image")]
    NoFaceDetected,

    #[error("unexpected response from recognition service: {0}")]
    UnexpectedResponse(String),
}

impl From<FaceError> for AppError {
    fn from(error: FaceError) -> Self {
        match error {
            FaceError::NotConfigured => AppError::NotConfigured(error.to_string()),
            other => AppError::Recognition(other.to_string()),
        }
    }
}

#[rocket::async_trait]
pub trait FaceRecognizer: Send + Sync {
    /// Whether credentials for the remote service are present.
    fn is_configured(&self) -> bool;

    /// Registers `image` under `label` and returns the vendor's token.
    async fn enroll_face(&self, label: &str, image: &[u8]) -> Result<String, FaceError>;

    /// `None` when no enrolled face matches with enough confidence.
    async fn recognize_face(&self, image: &[u8]) -> Result<Option<FaceMatch>, FaceError>;
}

/// Captures one frame, enrolls it under the member's full name and stores
/// the returned token on the member.
#[instrument(skip(pool, recognizer, camera))]
pub async fn enroll_member_face(
    pool: &Pool<Sqlite>,
    recognizer: &dyn FaceRecognizer,
    camera: &Camera,
    member_id: i64,
) -> Result<String, AppError> {
    if !recognizer.is_configured() {
        return Err(FaceError::NotConfigured.into());
    }

    let member = db::get_member(pool, member_id).await?;

    let frame = {
        let lease = camera.acquire()?;
        lease.grab().await?
    }
    .ok_or_else(|| AppError::CameraUnavailable("Camera is not ready.".to_string()))?;

    let token = recognizer.enroll_face(&member.full_name(), &frame).await?;
    db::set_member_face_id(pool, member_id, &token).await?;
    info!("Face enrolled for member");

    Ok(token)
}
