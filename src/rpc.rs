//! JSON request and response bodies of the executor and store HTTP APIs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{ExecutionRecord, EXIT_CODE_UNSET};

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// `POST /exec-cmd`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecCmdRequest {
    pub cmd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecCmdResponse {
    pub std_out: String,
    pub std_err: String,
    pub exit_code: i32,
    pub err: Option<String>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// `POST /store`
///
/// Every field is optional on the wire so that validation, not decoding,
/// decides what a usable record is. A missing `exit_code` decodes to
/// [`EXIT_CODE_UNSET`] and is then rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreRequest {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub timestamp_exec: DateTime<Utc>,
    #[serde(default)]
    pub success: bool,
    #[serde(default = "unset_exit_code")]
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

fn unset_exit_code() -> i32 {
    EXIT_CODE_UNSET
}

impl From<StoreRequest> for ExecutionRecord {
    fn from(req: StoreRequest) -> Self {
        Self {
            cmd: req.cmd,
            timestamp_exec: req.timestamp_exec,
            success: req.success,
            exit_code: req.exit_code,
            stdout: req.stdout,
            stderr: req.stderr,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreResponse {
    pub err: Option<String>,
}

/// `POST /get-from-to`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFromToRequest {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Body of `POST /get-from-to` and `GET /history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub res: Vec<ExecutionRecord>,
    pub err: Option<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
