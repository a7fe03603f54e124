use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::Error;
use crate::lock;

pub(crate) type Outcome = Result<Option<Value>, Error>;
pub(crate) type Pending = Shared<BoxFuture<'static, Outcome>>;

/// Role assigned to a caller by [`Debouncer::acquire`].
pub(crate) enum Slot {
    /// A call is already in the window; wait for its outcome.
    Join(Pending),
    /// Start the call and report its outcome through the sender.
    Lead(Pending, oneshot::Sender<Outcome>),
}

/// Leading-edge debouncer.
///
/// The first call in a quiet period leads; calls within `window` of the
/// previous call join the leader. Every call restarts the window.
pub(crate) struct Debouncer {
    window: Duration,
    last: Mutex<Option<(Instant, Pending)>>,
}

impl Debouncer {
    pub(crate) const fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    pub(crate) const fn window(&self) -> Duration {
        self.window
    }

    /// Forgets the pending call so the next caller leads.
    pub(crate) fn reset(&self) {
        lock(&self.last).take();
    }

    pub(crate) fn acquire(&self) -> Slot {
        let now = Instant::now();
        let mut last = lock(&self.last);

        if let Some((at, pending)) = last.as_mut() {
            if now.duration_since(*at) < self.window {
                *at = now;
                return Slot::Join(pending.clone());
            }
        }

        let (tx, rx) = oneshot::channel();
        let pending = rx
            .map(|outcome| {
                outcome.unwrap_or_else(|_| Err(Error::Aborted("debounced call dropped".to_string())))
            })
            .boxed()
            .shared();
        *last = Some((now, pending.clone()));
        Slot::Lead(pending, tx)
    }
}
