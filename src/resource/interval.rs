use std::sync::Weak;
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;

use super::{Inner, Resource};

/// Background task reloading a resource on a fixed period.
///
/// Holds only a weak reference, so polling ends once every handle to the
/// resource is gone. Dropping the poller stops the task.
pub(crate) struct Poller {
    period: Duration,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Poller {
    pub(crate) fn spawn(handle: &Handle, period: Duration, resource: Weak<Inner>) -> Self {
        let token = CancellationToken::new();
        let stopped = token.clone();

        let task = handle.spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = IntervalStream::new(timer).skip(1);

            loop {
                tokio::select! {
                    biased;
                    () = stopped.cancelled() => break,
                    tick = ticks.next() => {
                        if tick.is_none() {
                            break;
                        }
                        let Some(inner) = resource.upgrade() else {
                            break;
                        };
                        // Fire and forget; the reload settles on its own task.
                        drop(Resource::from_inner(inner).reload(true));
                    }
                }
            }
        });

        Self {
            period,
            token,
            task,
        }
    }

    pub(crate) const fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}
