//! Cooperative shutdown propagation.
//!
//! Every long-running component receives a [`Shutdown`] handle and is
//! expected to observe it between units of work. Audit writes that must
//! not be abandoned mid-flight (the terminal status transitions) run
//! under [`Shutdown::detached`], which never fires.

use tokio_util::sync::CancellationToken;

/// A cancellation scope handed to workers and repository calls.
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: Option<CancellationToken>,
}

impl Shutdown {
    /// Create a root shutdown scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Some(CancellationToken::new()),
        }
    }

    /// A scope that is never cancelled.
    ///
    /// Used for the final audit transition of a side effect that has
    /// already happened: the row must not be left in a processing state
    /// because the process is going down.
    #[must_use]
    pub const fn detached() -> Self {
        Self { token: None }
    }

    /// Signal every clone of this scope.
    pub fn trigger(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    /// Whether the scope has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Wait until the scope is triggered. Pends forever on a detached
    /// scope.
    pub async fn triggered(&self) {
        match &self.token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
