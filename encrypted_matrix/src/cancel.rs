use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
/// A cooperative cancellation flag shared between the caller and a running operation.
///
/// # Remarks
/// Clones share the same flag. Operations check it before each HE operation and return
/// [`Error::Cancelled`] once it's set; work already handed to the engine runs to completion.
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that isn't cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every operation observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`CancelToken::cancel`] has been called on this token or a clone of it.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns [`Error::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
