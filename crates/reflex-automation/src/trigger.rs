//! Trigger watchers
//!
//! A trigger watches a value source and invokes a callback when the observed
//! value undergoes a qualifying transition. Constructing a trigger subscribes
//! it to its source and spawns the watcher task; dropping the returned handle
//! aborts the task, which unsubscribes it.
//!
//! Two comparison semantics exist for state triggers: *exact-transition*
//! (previous value must equal `from`, new value must equal `to` - boolean and
//! string state changes) and *range-membership* (new value must fall inside
//! the inclusive band derived from `from`/`to` - numeric thresholds).
//!
//! Every trigger takes a hold duration: when non-zero, the watcher waits that
//! long after a qualifying transition and re-confirms the condition still
//! holds before firing. Callbacks always run on the watcher task, never
//! inline in the source's `set` path.

use std::sync::{Arc, Weak};
use std::time::Duration;

use reflex_core::{EventSource, ObservableValue};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Trigger errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("state trigger `from` and `to` are identical; nothing to transition between")]
    FromEqualsTo,
}

/// Result type for trigger construction
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Callback invoked with the observed value when a trigger fires
pub type TriggerCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// RAII subscription handle for a watcher task
///
/// Dropping the handle aborts the watcher, detaching it from the source.
#[derive(Debug)]
pub struct TriggerHandle {
    task: JoinHandle<()>,
}

impl TriggerHandle {
    /// Whether the watcher task is still running
    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watches an [`ObservableValue`] for a qualifying state transition
pub struct StateTrigger {
    watcher: TriggerHandle,
}

impl StateTrigger {
    /// Exact-transition trigger: fires when the value moves from `from` to
    /// `to`.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::FromEqualsTo`] when `from == to`.
    pub fn exact<T>(
        source: &Arc<ObservableValue<T>>,
        from: T,
        to: T,
        hold: Duration,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> TriggerResult<Self>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        if from == to {
            return Err(TriggerError::FromEqualsTo);
        }

        let confirm_to = to.clone();
        let matcher = move |old: &T, new: &T| *old == from && *new == to;
        let confirm = move |current: &T| *current == confirm_to;

        Ok(Self {
            watcher: spawn_state_watcher(source, matcher, confirm, hold, Arc::new(callback)),
        })
    }

    /// Range-membership trigger: fires when the new value falls within the
    /// inclusive band spanned by `from` and `to`, in either order.
    pub fn range<T>(
        source: &Arc<ObservableValue<T>>,
        from: T,
        to: T,
        hold: Duration,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Self
    where
        T: Clone + PartialOrd + Send + Sync + 'static,
    {
        let (lower, upper) = if from > to { (to, from) } else { (from, to) };

        let in_band = move |value: &T| *value >= lower && *value <= upper;
        let confirm = in_band.clone();
        let matcher = move |_old: &T, new: &T| in_band(new);

        Self {
            watcher: spawn_state_watcher(source, matcher, confirm, hold, Arc::new(callback)),
        }
    }

    /// Detach the trigger from this wrapper; dropping the handle
    /// unsubscribes it
    pub fn into_handle(self) -> TriggerHandle {
        self.watcher
    }

    /// Whether the watcher is still subscribed
    pub fn is_attached(&self) -> bool {
        self.watcher.is_attached()
    }
}

/// Watches an [`EventSource`] and fires on every occurrence
pub struct EventTrigger {
    watcher: TriggerHandle,
}

impl EventTrigger {
    /// Subscribe to `source`; every emitted payload invokes `callback`,
    /// after `hold` when non-zero.
    pub fn new<T>(
        source: &EventSource<T>,
        hold: Duration,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> Self
    where
        T: Clone + Send + 'static,
    {
        let mut rx = source.subscribe();
        let callback: TriggerCallback<T> = Arc::new(callback);

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        if hold.is_zero() {
                            debug!("event trigger fired");
                            callback(payload);
                            continue;
                        }
                        // Each payload gets its own hold task, so a burst
                        // of events is not serialized behind one hold
                        let callback = Arc::clone(&callback);
                        tokio::spawn(async move {
                            tokio::time::sleep(hold).await;
                            debug!(held = ?hold, "event trigger fired");
                            callback(payload);
                        });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "event trigger lagged behind its source");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self {
            watcher: TriggerHandle { task },
        }
    }

    /// Detach the trigger from this wrapper; dropping the handle
    /// unsubscribes it
    pub fn into_handle(self) -> TriggerHandle {
        self.watcher
    }

    /// Whether the watcher is still subscribed
    pub fn is_attached(&self) -> bool {
        self.watcher.is_attached()
    }
}

fn spawn_state_watcher<T>(
    source: &Arc<ObservableValue<T>>,
    matcher: impl Fn(&T, &T) -> bool + Send + 'static,
    confirm: impl Fn(&T) -> bool + Send + 'static,
    hold: Duration,
    callback: TriggerCallback<T>,
) -> TriggerHandle
where
    T: Clone + Send + Sync + 'static,
{
    let mut rx = source.subscribe();
    // Weak back-reference only: the watcher never owns the source's lifetime
    let source: Weak<ObservableValue<T>> = Arc::downgrade(source);

    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if !matcher(&change.old, &change.new) {
                        trace!("transition does not qualify");
                        continue;
                    }

                    if hold.is_zero() {
                        debug!("state trigger fired");
                        callback(change.new);
                        continue;
                    }

                    tokio::time::sleep(hold).await;

                    let Some(source) = source.upgrade() else {
                        break;
                    };
                    let current = source.get();
                    if confirm(&current) {
                        debug!(held = ?hold, "state trigger fired after hold");
                        callback(current);
                    } else {
                        trace!("value moved away during hold; fire cancelled");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "state trigger lagged behind its source");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    TriggerHandle { task }
}
