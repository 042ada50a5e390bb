//! Dispatcher: serializes a directive and issues exactly one remote call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use vmgrid_core::RequestContext;
use vmgrid_placement::PlacementDirective;

use crate::commands::Command;
use crate::error::{DispatchError, DispatchResult};
use crate::exec::RemoteExec;

#[derive(Clone)]
pub struct Dispatcher {
    exec: Arc<dyn RemoteExec>,
}

impl Dispatcher {
    pub fn new(exec: Arc<dyn RemoteExec>) -> Self {
        Self { exec }
    }

    /// Execute `command` wherever `directive` points.
    ///
    /// An empty directive is a deliberate no-op and succeeds without
    /// contacting the fleet. Any transport error is terminal.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        directive: &PlacementDirective,
        command: &Command,
    ) -> DispatchResult<()> {
        if directive.is_none() {
            debug!(script = command.script(), "no placement, skipping dispatch");
            return Ok(());
        }
        if ctx.is_cancelled() {
            return Err(DispatchError::Cancelled {
                script: command.script().to_string(),
            });
        }

        let control = directive.to_string();
        let line = command.to_string();
        info!(%control, script = command.script(), "dispatching command");

        let outcome = tokio::select! {
            res = self.exec.execute(&control, &line) => Some(res),
            _ = ctx.cancelled() => None,
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(message)) => {
                warn!(%control, script = command.script(), %message, "remote execution failed");
                Err(DispatchError::Remote {
                    control,
                    script: command.script().to_string(),
                    message,
                })
            }
            None => {
                warn!(%control, script = command.script(), "dispatch cancelled");
                Err(DispatchError::Cancelled {
                    script: command.script().to_string(),
                })
            }
        }
    }
}
