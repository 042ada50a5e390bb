//! Remote execution transport seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::info;

/// Boxed future returned by [`RemoteExec::execute`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// The fleet's remote-execution endpoint.
///
/// `control` is the serialized placement directive and is opaque to the
/// transport; the remote scheduler interprets it. `Ok(())` means the
/// command was acknowledged.
pub trait RemoteExec: Send + Sync {
    fn execute<'a>(&'a self, control: &'a str, command: &'a str) -> ExecFuture<'a>;
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub control: String,
    pub command: String,
}

impl ExecCall {
    /// File name of the script the command invokes.
    pub fn script(&self) -> &str {
        let path = self.command.split_whitespace().next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<ExecCall>,
    fail_patterns: Vec<String>,
}

/// Dry-run transport: logs and records every call, acknowledging all of
/// them unless the command matches a configured failure pattern.
#[derive(Debug, Clone, Default)]
pub struct RecordingExec {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every later command containing `pattern`.
    pub fn fail_matching(&self, pattern: &str) {
        self.lock().fail_patterns.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().fail_patterns.clear();
    }

    /// Every call attempted so far, failed ones included.
    pub fn calls(&self) -> Vec<ExecCall> {
        self.lock().calls.clone()
    }

    /// Calls whose script file name is `script`.
    pub fn calls_to(&self, script: &str) -> Vec<ExecCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.script() == script)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        // A poisoned recording is still a valid recording.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RemoteExec for RecordingExec {
    fn execute<'a>(&'a self, control: &'a str, command: &'a str) -> ExecFuture<'a> {
        let outcome = {
            let mut rec = self.lock();
            rec.calls.push(ExecCall {
                control: control.to_string(),
                command: command.to_string(),
            });
            match rec.fail_patterns.iter().find(|p| command.contains(p.as_str())) {
                Some(pattern) => Err(format!("injected failure for {pattern:?}")),
                None => Ok(()),
            }
        };
        info!(%control, %command, ok = outcome.is_ok(), "dry-run execute");
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let exec = RecordingExec::new();
        exec.execute("inter=1", "/opt/x/clear_vm.sh '1'").await.unwrap();
        exec.execute("inter=2", "/opt/x/action_vm.sh '2' 'start'")
            .await
            .unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].script(), "clear_vm.sh");
        assert_eq!(calls[1].control, "inter=2");
        assert_eq!(exec.calls_to("action_vm.sh").len(), 1);
    }

    #[tokio::test]
    async fn failure_pattern_rejects_matching_commands() {
        let exec = RecordingExec::new();
        exec.fail_matching("clear_vm.sh");

        assert!(exec.execute("inter=1", "/opt/x/clear_vm.sh '1'").await.is_err());
        assert!(exec.execute("inter=1", "/opt/x/action_vm.sh '1'").await.is_ok());
        // Failed attempts are still recorded.
        assert_eq!(exec.calls().len(), 2);

        exec.clear_failures();
        assert!(exec.execute("inter=1", "/opt/x/clear_vm.sh '1'").await.is_ok());
    }
}
