//! Typed view of the backend REST surface.

use crate::transport::{
    FilePart, HttpTransport, Method, MultipartBody, RequestBody, Transport, TransportError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{Alert, DetectionPayload, EnrollMode, EnrollmentSubmission, User};

/// Clone-safe client for the appliance backend.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    /// Client over reqwest with the given per-request timeout.
    pub fn http(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(base_url, timeout)?;
        Ok(Self::new(Arc::new(transport), base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// MJPEG stream for live-feed surfaces. Never polled here.
    pub fn video_feed_url(&self) -> String {
        format!("{}/video-feed", self.base_url)
    }

    /// `GET /`, answered with the backend's status string.
    pub async fn health(&self) -> Result<String, TransportError> {
        let body = self.get_json("/").await?;
        body.get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TransportError::Decode(format!("no status in {body}")))
    }

    pub async fn alerts(&self) -> Result<Vec<Alert>, TransportError> {
        let body = self.get_json("/alerts").await?;
        Alert::list_from_json(body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub async fn current_detection(&self) -> Result<DetectionPayload, TransportError> {
        let body = self.get_json("/current-detection").await?;
        serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub async fn users(&self) -> Result<Vec<User>, TransportError> {
        let body = self.get_json("/users").await?;
        User::list_from_json(body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// `POST /enroll` or `POST /re-enroll` as one multipart request.
    pub async fn enroll(
        &self,
        mode: EnrollMode,
        submission: &EnrollmentSubmission,
    ) -> Result<(), TransportError> {
        let path = match mode {
            EnrollMode::Enroll => "/enroll",
            EnrollMode::ReEnroll => "/re-enroll",
        };
        let body = MultipartBody::default()
            .text("name", submission.name.clone())
            .file(FilePart {
                field: "image".to_string(),
                file_name: submission.image.file_name.clone(),
                content_type: submission.image.content_type.clone(),
                bytes: submission.image.bytes.clone(),
            });
        self.mutate(Method::Post, path, Some(RequestBody::Multipart(body)))
            .await
    }

    /// `DELETE /users/{name}`.
    pub async fn delete_user(&self, name: &str) -> Result<(), TransportError> {
        let path = user_path(name)?;
        self.mutate(Method::Delete, &path, None).await
    }

    /// `POST /update-reminders` with the complete replacement list.
    pub async fn update_reminders(
        &self,
        name: &str,
        reminders: &[String],
    ) -> Result<(), TransportError> {
        let body = json!({ "name": name, "reminders": reminders });
        self.mutate(Method::Post, "/update-reminders", Some(RequestBody::Json(body)))
            .await
    }

    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        self.transport
            .request(Method::Get, path, None)
            .await?
            .json()
    }

    async fn mutate(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<(), TransportError> {
        let response = self.transport.request(method, path, body).await?;
        // The backend reports most failures as 200 with an error envelope.
        match response.json() {
            Ok(value) => check_envelope(&value),
            Err(_) => Ok(()),
        }
    }
}

fn check_envelope(body: &Value) -> Result<(), TransportError> {
    match body.get("error") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(message)) => Err(TransportError::Rejected(message.clone())),
        Some(other) => Err(TransportError::Rejected(other.to_string())),
    }
}

fn user_path(name: &str) -> Result<String, TransportError> {
    let mut url = reqwest::Url::parse("http://backend/users")
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidRequest("cannot-be-a-base URL".to_string()))?
        .push(name);
    Ok(url.path().to_string())
}
