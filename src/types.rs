use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SdError};

/// Opaque backend task identifier.
///
/// The backend hands out numeric ids today; string ids are accepted too and
/// echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Number(i64),
    Text(String),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Number(n) => write!(f, "{}", n),
            TaskId::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome of a finished task.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub task_id: TaskId,
    pub width: u32,
    pub height: u32,
    /// Decoded image files in backend order.
    pub images: Vec<Vec<u8>>,
    /// Seed actually used. `None` for upscale results.
    pub seed: Option<i64>,
}

/// Backend-reported lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Error,
}

impl TaskStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Pending),
            1 => Some(TaskStatus::Running),
            2 => Some(TaskStatus::Finished),
            3 => Some(TaskStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Finished => "finished",
            TaskStatus::Error => "error",
        }
    }
}

/// Result fields of a finished task, images still base64 encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub width: u32,
    pub height: u32,
    pub images: Vec<String>,
    pub seed: Option<i64>,
}

impl TaskOutput {
    /// Decode the images and attach the task id.
    pub fn into_result(self, task_id: TaskId) -> Result<ProcessResult> {
        let images = self
            .images
            .iter()
            .map(|b64| base64::engine::general_purpose::STANDARD.decode(b64))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SdError::InvalidResponse(format!("Bad result image: {}", e)))?;

        Ok(ProcessResult {
            task_id,
            width: self.width,
            height: self.height,
            images,
            seed: self.seed,
        })
    }
}

/// One observation of a task, as returned by a single state query.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Running { progress: Option<f64> },
    Finished(TaskOutput),
    Error { message: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Running { .. } => TaskStatus::Running,
            TaskState::Finished(_) => TaskStatus::Finished,
            TaskState::Error { .. } => TaskStatus::Error,
        }
    }

    /// Interpret the `data` object of a `getTaskState` response.
    pub fn from_value(data: serde_json::Value) -> Result<Self> {
        let raw: RawTaskState = serde_json::from_value(data)
            .map_err(|e| SdError::InvalidResponse(format!("Bad task state: {}", e)))?;

        let status = TaskStatus::from_code(raw.status).ok_or_else(|| {
            SdError::InvalidResponse(format!("Unknown task status {}", raw.status))
        })?;

        Ok(match status {
            TaskStatus::Pending => TaskState::Pending,
            TaskStatus::Running => TaskState::Running {
                progress: raw.progress,
            },
            TaskStatus::Error => TaskState::Error {
                message: raw.err_msg.unwrap_or_default(),
            },
            TaskStatus::Finished => {
                let (width, height) = match (raw.result_width, raw.result_height) {
                    (Some(w), Some(h)) => (w, h),
                    _ => {
                        return Err(SdError::InvalidResponse(
                            "Finished task state missing result size".into(),
                        ))
                    }
                };
                TaskState::Finished(TaskOutput {
                    width,
                    height,
                    images: raw.result_images.unwrap_or_default(),
                    seed: raw.result_seed,
                })
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaskState {
    status: i64,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    err_msg: Option<String>,
    #[serde(default)]
    result_width: Option<u32>,
    #[serde(default)]
    result_height: Option<u32>,
    #[serde(default)]
    result_images: Option<Vec<String>>,
    #[serde(default)]
    result_seed: Option<i64>,
}

/// Who asked for a job. Rendered into the opaque `comment` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub from: String,
    pub name: String,
    pub id: u64,
    pub ch_id: u64,
}

impl Attribution {
    pub fn new(from: impl Into<String>, name: impl Into<String>, id: u64, ch_id: u64) -> Self {
        Self {
            from: from.into(),
            name: name.into(),
            id,
            ch_id,
        }
    }

    /// JSON text suitable for `ProcessArguments::comment`.
    pub fn to_comment(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
