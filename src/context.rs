//! Caller-supplied cancellation for backend calls.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{KvError, Result};

/// Carries cancellation and an optional deadline into every backend call.
///
/// Cloning is cheap and clones observe the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a context plus the token that cancels it.
    pub fn with_cancel() -> (Self, CancellationToken) {
        let token = CancellationToken::new();
        let ctx = Self {
            token: Some(token.clone()),
            deadline: None,
        };
        (ctx, token)
    }

    /// Derive a context bound to an existing token.
    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: self.deadline,
        }
    }

    /// Derive a context that expires after `timeout`, keeping the parent's
    /// token and the earlier of the two deadlines.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.clone(),
            deadline: Some(match self.deadline {
                Some(d) if d < deadline => d,
                _ => deadline,
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_canceled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Fails with `Canceled` or `DeadlineExceeded` once the context is done.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(KvError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(KvError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}
