//! vmgrid-dispatch: turns (directive, command) pairs into remote calls.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher
//!   ├── PlacementDirective → control string (select= / inter= / toall=)
//!   ├── Command → script path + quoted args + optional heredoc payload
//!   └── RemoteExec (transport seam, one method)
//!       ├── production transport (outside this workspace)
//!       └── RecordingExec (dry-run: logs and records every call)
//! ```
//!
//! Dispatch never retries. Timeouts belong to the transport; cancellation
//! comes from the caller's [`vmgrid_core::RequestContext`].

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod exec;

pub use commands::{Command, ScriptSet};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use exec::{ExecCall, ExecFuture, RecordingExec, RemoteExec};
