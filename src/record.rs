//! The execution record shared by the executor, the forwarder and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code carried by a record whose command never ran (or was invalid).
pub const EXIT_CODE_UNSET: i32 = -999;

/// Exit code reported when a process produced no exit status: it could not be
/// spawned, or it was terminated by a signal.
pub const EXIT_CODE_NO_STATUS: i32 = -1;

/// Outcome of one command execution, as persisted by the history store.
///
/// The JSON shape is the body of `POST /store` and the element type of every
/// history query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub cmd: String,
    /// When the outcome was recorded. Set by the forwarding side.
    pub timestamp_exec: DateTime<Utc>,
    pub success: bool,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl ExecutionRecord {
    /// Build a record stamped with the current time.
    pub fn now(
        cmd: impl Into<String>,
        success: bool,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            timestamp_exec: Utc::now(),
            success,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// True if `timestamp_exec` lies strictly inside `(from, to)`.
    pub fn within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        from < self.timestamp_exec && self.timestamp_exec < to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_within_is_exclusive_on_both_ends() {
        let rec = ExecutionRecord::now("echo hi", true, 0, "hi\n", "");
        let t = rec.timestamp_exec;

        assert!(rec.within(t - Duration::seconds(1), t + Duration::seconds(1)));
        assert!(!rec.within(t, t + Duration::seconds(1)));
        assert!(!rec.within(t - Duration::seconds(1), t));
        assert!(!rec.within(t + Duration::seconds(1), t - Duration::seconds(1)));
    }

    #[test]
    fn test_empty_outputs_are_omitted_from_json() {
        let rec = ExecutionRecord::now("true", true, 0, "", "");
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("stdout").is_none());
        assert!(json.get("stderr").is_none());
        assert_eq!(json["exit_code"], 0);

        let back: ExecutionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }
}
