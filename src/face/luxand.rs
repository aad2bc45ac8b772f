use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{FaceError, FaceMatch, FaceRecognizer};

pub const DEFAULT_LUXAND_URL: &str = "https://api.luxand.cloud";
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Luxand.cloud client. The key travels in the `token` header.
pub struct LuxandClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    name: String,
    #[serde(default)]
    probability: f64,
    #[serde(default)]
    uuid: Option<String>,
}

impl LuxandClient {
    pub fn new(base_url: &str, api_key: Option<String>, threshold: f64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            threshold,
        }
    }

    fn api_key(&self) -> Result<&str, FaceError> {
        self.api_key.as_deref().ok_or(FaceError::NotConfigured)
    }

    fn photo_part(image: &[u8]) -> Result<Part, FaceError> {
        Ok(Part::bytes(image.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?)
    }

    async fn post(&self, path: &str, form: Form) -> Result<Value, FaceError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("token", self.api_key()?)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Recognition service rejected request");
            if mentions_missing_face(&body) {
                return Err(FaceError::NoFaceDetected);
            }
            return Err(FaceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| FaceError::UnexpectedResponse(e.to_string()))
    }
}

fn mentions_missing_face(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("no face") || body.contains("face not found") || body.contains("no faces")
}

/// Reads the person id out of an enrollment response.
pub fn parse_enroll_response(value: &Value) -> Result<String, FaceError> {
    if let Some(uuid) = value.get("uuid").and_then(Value::as_str) {
        return Ok(uuid.to_string());
    }

    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if mentions_missing_face(message) {
        Err(FaceError::NoFaceDetected)
    } else {
        Err(FaceError::UnexpectedResponse(value.to_string()))
    }
}

/// Picks the most probable candidate at or above `threshold`.
pub fn parse_search_response(value: &Value, threshold: f64) -> Result<Option<FaceMatch>, FaceError> {
    let candidates = match value {
        Value::Array(_) => Vec::<Candidate>::deserialize(value)
            .map_err(|e| FaceError::UnexpectedResponse(e.to_string()))?,
        Value::Object(obj) if obj.get("status").and_then(Value::as_str) == Some("failure") => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if mentions_missing_face(message) {
                return Ok(None);
            }
            return Err(FaceError::UnexpectedResponse(message.to_string()));
        }
        other => return Err(FaceError::UnexpectedResponse(other.to_string())),
    };

    Ok(candidates
        .into_iter()
        .filter(|c| c.probability >= threshold)
        .max_by(|a, b| a.probability.total_cmp(&b.probability))
        .map(|c| FaceMatch {
            label: c.name,
            token: c.uuid,
            probability: c.probability,
        }))
}

#[rocket::async_trait]
impl FaceRecognizer for LuxandClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn enroll_face(&self, label: &str, image: &[u8]) -> Result<String, FaceError> {
        info!("Enrolling face");
        let form = Form::new()
            .text("name", label.to_string())
            .text("store", "1")
            .part("photos", Self::photo_part(image)?);

        let value = self.post("/v2/person", form).await?;
        parse_enroll_response(&value)
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn recognize_face(&self, image: &[u8]) -> Result<Option<FaceMatch>, FaceError> {
        info!("Searching for face");
        let form = Form::new().part("photo", Self::photo_part(image)?);

        match self.post("/photo/search/v2", form).await {
            Ok(value) => parse_search_response(&value, self.threshold),
            Err(FaceError::NoFaceDetected) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
