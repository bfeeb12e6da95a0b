//! # Transcription Client
//!
//! Speech-to-text through an AssemblyAI-style REST API. The service is job
//! based, so one call to [`Transcriber::transcribe`] walks three steps:
//!
//! 1. **Upload**: `POST /v2/upload` with the raw audio, returns an `upload_url`
//! 2. **Create**: `POST /v2/transcript` with `{"audio_url": ...}`, returns a job id
//! 3. **Poll**: `GET /v2/transcript/{id}` every `poll_interval` until the job is
//!    `completed` or `error`
//!
//! The poll loop has a hard budget (`max_poll_attempts`). A job that is still
//! queued or processing when the budget runs out fails with
//! `TranscriptionTimeout` instead of stalling the session forever.

use super::{describe_failure, http_client, Transcriber};
use crate::config::TranscriptionConfig;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of a remote transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// A transcription job as reported by the service.
///
/// Only lives for the duration of one `transcribe` call.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct CreateTranscript<'a> {
    audio_url: &'a str,
}

/// HTTP client for the transcription service.
#[derive(Debug, Clone)]
pub struct AssemblyAiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl AssemblyAiTranscriber {
    pub fn new(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    /// Hand the audio to the service's storage and get a reference back.
    async fn upload(&self, audio: Vec<u8>) -> RelayResult<String> {
        let bytes = audio.len();
        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header("authorization", &self.api_key)
            .header("content-type", "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|e| RelayError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::Upload(describe_failure(response).await));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Upload(format!("invalid upload response: {}", e)))?;

        debug!(bytes, "Uploaded audio for transcription");
        Ok(upload.upload_url)
    }

    async fn create_job(&self, audio_url: &str) -> RelayResult<TranscriptJob> {
        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&CreateTranscript { audio_url })
            .send()
            .await
            .map_err(|e| RelayError::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::Transcription(describe_failure(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::Transcription(format!("invalid job response: {}", e)))
    }

    async fn fetch_job(&self, id: &str) -> RelayResult<TranscriptJob> {
        let response = self
            .client
            .get(format!("{}/v2/transcript/{}", self.base_url, id))
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| RelayError::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::Transcription(describe_failure(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::Transcription(format!("invalid job response: {}", e)))
    }

    /// Poll until the job is terminal or the attempt budget is spent.
    async fn await_job(&self, id: &str) -> RelayResult<String> {
        for attempt in 1..=self.max_poll_attempts {
            let job = self.fetch_job(id).await?;

            match job.status {
                JobStatus::Completed => return Ok(job.text.unwrap_or_default()),
                JobStatus::Error => {
                    let message = job
                        .error
                        .unwrap_or_else(|| "transcription job failed".to_string());
                    return Err(RelayError::Transcription(message));
                }
                JobStatus::Queued | JobStatus::Processing => {
                    debug!(job_id = %id, attempt, status = ?job.status, "Transcription pending");
                }
            }

            if attempt < self.max_poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        warn!(job_id = %id, attempts = self.max_poll_attempts, "Transcription poll budget exhausted");
        Err(RelayError::TranscriptionTimeout {
            attempts: self.max_poll_attempts,
        })
    }
}

#[async_trait]
impl Transcriber for AssemblyAiTranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> RelayResult<String> {
        let started = Instant::now();
        let audio_url = self.upload(audio).await?;
        let job = self.create_job(&audio_url).await?;

        let text = self.await_job(&job.id).await?;
        info!(
            job_id = %job.id,
            chars = text.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Transcription completed"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake;
    use actix_web::{web, HttpRequest, HttpResponse};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config_for(base_url: String, max_poll_attempts: u32) -> TranscriptionConfig {
        TranscriptionConfig {
            base_url,
            api_key: "test-key".to_string(),
            poll_interval_ms: 5,
            max_poll_attempts,
            request_timeout_secs: 5,
        }
    }

    /// Vendor that reports `pending_polls` non-terminal answers, then `terminal`.
    fn vendor(pending_polls: u32, terminal: serde_json::Value, polls: Arc<AtomicU32>) -> String {
        fake::serve(move |cfg| {
            let polls = polls.clone();
            let terminal = terminal.clone();
            cfg.route(
                "/v2/upload",
                web::post().to(|req: HttpRequest, body: web::Bytes| async move {
                    let key = req.headers().get("authorization").and_then(|v| v.to_str().ok());
                    if key != Some("test-key") {
                        return HttpResponse::Unauthorized().finish();
                    }
                    assert!(!body.is_empty());
                    HttpResponse::Ok().json(json!({ "upload_url": "https://cdn.example/upload/1" }))
                }),
            )
            .route(
                "/v2/transcript",
                web::post().to(|body: web::Json<serde_json::Value>| async move {
                    assert_eq!(body["audio_url"], "https://cdn.example/upload/1");
                    HttpResponse::Ok().json(json!({ "id": "job-1", "status": "queued" }))
                }),
            )
            .route(
                "/v2/transcript/{id}",
                web::get().to(move |id: web::Path<String>| {
                    let polls = polls.clone();
                    let terminal = terminal.clone();
                    async move {
                        assert_eq!(id.as_str(), "job-1");
                        let seen = polls.fetch_add(1, Ordering::SeqCst);
                        if seen < pending_polls {
                            HttpResponse::Ok().json(json!({ "id": "job-1", "status": "processing" }))
                        } else {
                            HttpResponse::Ok().json(terminal)
                        }
                    }
                }),
            );
        })
    }

    #[actix_web::test]
    async fn test_completed_job_returns_text() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = vendor(
            2,
            json!({ "id": "job-1", "status": "completed", "text": "turn on the lights" }),
            polls.clone(),
        );
        let transcriber = AssemblyAiTranscriber::new(&config_for(base, 10)).unwrap();

        let text = transcriber.transcribe(vec![1, 2, 3, 4]).await.unwrap();
        assert_eq!(text, "turn on the lights");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[actix_web::test]
    async fn test_completed_without_text_is_empty() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = vendor(0, json!({ "id": "job-1", "status": "completed", "text": null }), polls);
        let transcriber = AssemblyAiTranscriber::new(&config_for(base, 3)).unwrap();

        assert_eq!(transcriber.transcribe(vec![0; 8]).await.unwrap(), "");
    }

    #[actix_web::test]
    async fn test_error_job_carries_vendor_message() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = vendor(
            1,
            json!({ "id": "job-1", "status": "error", "error": "Audio file is empty" }),
            polls,
        );
        let transcriber = AssemblyAiTranscriber::new(&config_for(base, 10)).unwrap();

        let err = transcriber.transcribe(vec![0; 8]).await.unwrap_err();
        assert_eq!(err, RelayError::Transcription("Audio file is empty".to_string()));
    }

    #[actix_web::test]
    async fn test_poll_budget_is_enforced() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = vendor(u32::MAX, json!({}), polls.clone());
        let transcriber = AssemblyAiTranscriber::new(&config_for(base, 4)).unwrap();

        let err = transcriber.transcribe(vec![0; 8]).await.unwrap_err();
        assert_eq!(err, RelayError::TranscriptionTimeout { attempts: 4 });
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[actix_web::test]
    async fn test_rejected_upload_is_upload_error() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = vendor(0, json!({}), polls.clone());
        let mut config = config_for(base, 3);
        config.api_key = "wrong".to_string();
        let transcriber = AssemblyAiTranscriber::new(&config).unwrap();

        let err = transcriber.transcribe(vec![0; 8]).await.unwrap_err();
        assert!(matches!(err, RelayError::Upload(ref msg) if msg.contains("401")));
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_job_status_parsing() {
        let job: TranscriptJob =
            serde_json::from_str(r#"{"id":"a","status":"processing","text":null}"#).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(!job.status.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }
}
