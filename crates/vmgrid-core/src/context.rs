//! Per-request context passed explicitly through every operation.
//!
//! Caller identity (creator/owner stamping, list visibility) and the
//! cancellation signal are resolved once at the caller boundary and
//! carried here, never read from ambient state inside the core.

use tokio::sync::watch;

/// Identity and cancellation for one inbound call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// User that issued the request (stamped as creator).
    pub user_id: u64,
    /// Organization the user acts for (stamped as owner).
    pub org_id: u64,
    /// When `true`, the caller also sees rows owned by other orgs.
    pub is_admin: bool,
    cancel: Option<watch::Receiver<bool>>,
}

impl RequestContext {
    pub fn new(user_id: u64, org_id: u64) -> Self {
        Self {
            user_id,
            org_id,
            is_admin: false,
            cancel: None,
        }
    }

    pub fn admin(user_id: u64, org_id: u64) -> Self {
        Self {
            is_admin: true,
            ..Self::new(user_id, org_id)
        }
    }

    /// Attach a cancellation signal; sending `true` aborts in-flight dispatches.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the request is cancelled. Never resolves without a signal.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancel else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling.
                return std::future::pending().await;
            }
        }
    }
}
