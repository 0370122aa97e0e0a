//! Decorators around [`ExecService`]: structured logging and forwarding of
//! every outcome to the history store.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExecOutcome, ExecService, Middleware};
use crate::forward::Forwarder;
use crate::record::ExecutionRecord;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct LoggingService {
    next: Arc<dyn ExecService>,
}

#[async_trait]
impl ExecService for LoggingService {
    async fn exec_cmd(&self, cmd: &str) -> ExecOutcome {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let outcome = self.next.exec_cmd(cmd).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome.error {
            None => info!(
                method = "exec_cmd",
                %request_id,
                cmd,
                exit_code = outcome.exit_code,
                elapsed_ms,
                "command executed"
            ),
            Some(err) => warn!(
                method = "exec_cmd",
                %request_id,
                cmd,
                exit_code = outcome.exit_code,
                elapsed_ms,
                error = %err,
                "command failed"
            ),
        }
        debug!(%request_id, stdout = %outcome.stdout, stderr = %outcome.stderr, "command output");

        outcome
    }
}

/// Log every call with its outcome.
pub fn logging() -> Middleware {
    Box::new(|next| Arc::new(LoggingService { next }))
}

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

struct ForwardingService {
    forwarder: Arc<Forwarder>,
    next: Arc<dyn ExecService>,
}

#[async_trait]
impl ExecService for ForwardingService {
    async fn exec_cmd(&self, cmd: &str) -> ExecOutcome {
        let outcome = self.next.exec_cmd(cmd).await;

        // A rejected command never ran, so there is nothing to record.
        if outcome.error.as_ref().is_some_and(|e| e.is_invalid_command()) {
            return outcome;
        }

        let record = ExecutionRecord::now(
            cmd,
            outcome.is_success(),
            outcome.exit_code,
            outcome.stdout.as_str(),
            outcome.stderr.as_str(),
        );
        match self.forwarder.forward(&record).await {
            Ok(()) => debug!(cmd, "execution recorded in history store"),
            Err(e) => warn!(cmd, error = %e, "failed to record execution in history store"),
        }

        outcome
    }
}

/// Ship every outcome to the history store through `forwarder`.
///
/// With no forwarder this is the identity: the chain is left untouched and no
/// network call is ever attempted.
pub fn forwarding(forwarder: Option<Arc<Forwarder>>) -> Middleware {
    match forwarder {
        None => {
            info!(call_to = "none", "history forwarding disabled");
            Box::new(|next| next)
        }
        Some(forwarder) => {
            info!(call_to = ?forwarder.addresses(), "history forwarding enabled");
            Box::new(move |next| Arc::new(ForwardingService { forwarder, next }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{self, BasicExecService, ExecError};
    use crate::forward::{Endpoint, ForwardError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: AtomicUsize,
        records: Mutex<Vec<ExecutionRecord>>,
    }

    #[async_trait]
    impl Endpoint for Recorder {
        async fn call(&self, record: &ExecutionRecord) -> Result<(), ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Endpoint for Failing {
        async fn call(&self, _record: &ExecutionRecord) -> Result<(), ForwardError> {
            Err(ForwardError::Rejected {
                instance: "failing".into(),
                status: 500,
                message: "boom".into(),
            })
        }
    }

    fn chain(forwarder: Option<Arc<Forwarder>>) -> Arc<dyn ExecService> {
        exec::new(
            Arc::new(BasicExecService::default()),
            vec![logging(), forwarding(forwarder)],
        )
    }

    #[tokio::test]
    async fn test_no_forwarder_leaves_outcome_untouched() {
        let svc = chain(None);
        let out = svc.exec_cmd("echo hi").await;
        assert!(out.error.is_none());
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.stderr, "");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_outcome_is_forwarded_with_timestamp() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = Arc::new(Forwarder::from_endpoints(
            vec![recorder.clone() as Arc<dyn Endpoint>],
            &Default::default(),
        ));
        let before = chrono::Utc::now();
        let out = chain(Some(forwarder)).exec_cmd("echo hi").await;
        assert!(out.is_success());

        let records = recorder.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.cmd, "echo hi");
        assert!(rec.success);
        assert_eq!(rec.exit_code, 0);
        assert_eq!(rec.stdout, "hi\n");
        assert!(rec.timestamp_exec >= before);
    }

    #[tokio::test]
    async fn test_failed_command_is_forwarded_as_unsuccessful() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = Arc::new(Forwarder::from_endpoints(
            vec![recorder.clone() as Arc<dyn Endpoint>],
            &Default::default(),
        ));
        let out = chain(Some(forwarder)).exec_cmd("false").await;
        assert_eq!(out.exit_code, 1);

        let records = recorder.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].exit_code, 1);
    }

    #[tokio::test]
    async fn test_invalid_command_is_not_forwarded() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = Arc::new(Forwarder::from_endpoints(
            vec![recorder.clone() as Arc<dyn Endpoint>],
            &Default::default(),
        ));
        let out = chain(Some(forwarder)).exec_cmd("ls").await;
        assert!(matches!(out.error, Some(ExecError::InvalidCommand)));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forwarding_failure_does_not_change_outcome() {
        let forwarder = Arc::new(Forwarder::from_endpoints(
            vec![Arc::new(Failing) as Arc<dyn Endpoint>],
            &Default::default(),
        ));
        let out = chain(Some(forwarder)).exec_cmd("echo hi").await;
        assert!(out.error.is_none());
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.exit_code, 0);
    }
}
