use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::request::GenerationRequest;

/// Request parameters as they appear in the activity log. The bearer token is
/// never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub model_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl From<&GenerationRequest> for RequestSummary {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            model_id: request.model_id.clone(),
            prompt: request.prompt.clone(),
            negative_prompt: request.effective_negative_prompt().map(str::to_string),
            width: request.width,
            height: request.height,
            num_inference_steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    GenerationStarted {
        request: RequestSummary,
    },
    GenerationSucceeded {
        request: RequestSummary,
        path: String,
        bytes: u64,
        mime_type: String,
    },
    GenerationCancelled {
        request: RequestSummary,
    },
    GenerationFailed {
        request: RequestSummary,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    HistoryCleared,
    ApiKeySaved,
}

impl ActivityEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityEvent::GenerationStarted { .. } => "generation_started",
            ActivityEvent::GenerationSucceeded { .. } => "generation_succeeded",
            ActivityEvent::GenerationCancelled { .. } => "generation_cancelled",
            ActivityEvent::GenerationFailed { .. } => "generation_failed",
            ActivityEvent::HistoryCleared => "history_cleared",
            ActivityEvent::ApiKeySaved => "api_key_saved",
        }
    }
}

/// One line of `events.jsonl`: the event's own fields plus `type`,
/// `session_id` and `ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub session_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub event: ActivityEvent,
}

/// Append-only JSONL activity log shared by every command of one session.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    session_id: String,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self, event: ActivityEvent) -> anyhow::Result<LogEntry> {
        let entry = LogEntry {
            session_id: self.session_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            event,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(entry)
    }

    /// Every parseable entry, oldest first. A missing log is empty.
    pub fn entries(&self) -> anyhow::Result<Vec<LogEntry>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
