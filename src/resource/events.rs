use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tracing::error;

use super::Resource;
use crate::error::Error;
use crate::lock;

/// Lifecycle events emitted by a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Loading,
    Success,
    Error,
    Timeout,
    Cancel,
}

impl Event {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Cancel => "cancel",
        }
    }
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loading" => Ok(Self::Loading),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            "cancel" => Ok(Self::Cancel),
            _ => Err(Error::InvalidOptions(format!("unknown event: {s}"))),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Listener = Arc<dyn Fn(&Resource) + Send + Sync>;

/// Ordered listener registry.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: Mutex<Vec<(Event, Listener)>>,
}

impl EventBus {
    pub(crate) fn on(&self, event: Event, listener: Listener) {
        lock(&self.listeners).push((event, listener));
    }

    /// Runs every listener registered for `event`, in registration order.
    ///
    /// The registry is not locked while listeners run, so a listener may
    /// register further listeners or trigger other events.
    pub(crate) fn emit(&self, event: Event, resource: &Resource) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(resource))).is_err() {
                error!(event = %event, "resource listener panicked");
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }
}
