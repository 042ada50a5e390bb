pub mod config;
pub mod context;

pub use config::{ConfigError, VmgridConfig};
pub use context::RequestContext;
