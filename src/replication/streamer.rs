use std::{
    error::Error as StdError,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, warn};
use thiserror::Error;

use super::BinlogEvent;

#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("get event timeout, try get later")]
    Timeout,

    #[error("last sync error or closed, try sync and get event again")]
    NeedSyncAgain,

    #[error("sync was closed")]
    SyncClosed,

    #[error("producer failed: {0}")]
    Producer(Arc<dyn StdError + Send + Sync>),
}

impl StreamError {
    pub fn producer(err: impl StdError + Send + Sync + 'static) -> Self {
        StreamError::Producer(Arc::new(err))
    }
}

#[derive(Default)]
struct State {
    /// The single event in flight; the producer blocks until it is taken.
    slot: Option<BinlogEvent>,
    /// Sticky failure, set once and never cleared.
    failed: Option<StreamError>,
    /// Failure handed to the next consumer that wakes up.
    handoff: Option<StreamError>,
    waiters: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// Rendezvous between one binlog producer and one consumer.
///
/// Nothing is buffered: [`push_event`](Self::push_event) returns once the
/// consumer has taken the event. After the stream fails, every read returns
/// [`StreamError::NeedSyncAgain`] and the caller has to start a new sync.
#[derive(Clone, Default)]
pub struct BinlogStreamer {
    shared: Arc<Shared>,
}

impl BinlogStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until an event or an error arrives.
    pub fn get_event(&self) -> Result<BinlogEvent, StreamError> {
        self.next_event(None)
    }

    /// Like [`get_event`](Self::get_event), giving up with
    /// [`StreamError::Timeout`] after `timeout`. A timeout consumes nothing.
    pub fn get_event_timeout(&self, timeout: Duration) -> Result<BinlogEvent, StreamError> {
        self.next_event(Some(Instant::now() + timeout))
    }

    fn next_event(&self, deadline: Option<Instant>) -> Result<BinlogEvent, StreamError> {
        let mut state = self.lock();
        if state.failed.is_some() {
            return Err(StreamError::NeedSyncAgain);
        }

        loop {
            if let Some(event) = state.slot.take() {
                self.shared.changed.notify_all();
                return Ok(event);
            }

            state.waiters += 1;
            state = match deadline {
                None => self
                    .shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        state.waiters -= 1;
                        return Err(StreamError::Timeout);
                    }
                    self.shared
                        .changed
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
            state.waiters -= 1;

            if let Some(err) = state.handoff.take() {
                return Err(err);
            }
            if state.failed.is_some() {
                return Err(StreamError::NeedSyncAgain);
            }
        }
    }

    /// Hands `event` to the consumer, blocking until it is taken. Fails with
    /// the stream's error if the stream is closed first.
    pub fn push_event(&self, event: BinlogEvent) -> Result<(), StreamError> {
        let mut state = self.lock();
        while state.slot.is_some() && state.failed.is_none() {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if let Some(err) = &state.failed {
            return Err(err.clone());
        }

        state.slot = Some(event);
        self.shared.changed.notify_all();

        while state.slot.is_some() && state.failed.is_none() {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let undelivered = state.slot.take();
        match (undelivered, &state.failed) {
            (Some(event), Some(err)) => {
                debug!("event at {} not delivered", event.position());
                Err(err.clone())
            }
            _ => Ok(()),
        }
    }

    pub fn close(&self) {
        self.close_with_error(StreamError::SyncClosed);
    }

    /// Fails the stream. Closing an already failed stream records
    /// [`StreamError::SyncClosed`].
    pub fn close_with_error(&self, err: StreamError) {
        let mut state = self.lock();
        let err = if state.failed.is_some() {
            StreamError::SyncClosed
        } else {
            err
        };
        warn!("binlog stream closed: {err}");

        state.failed = Some(err.clone());
        if state.waiters > 0 {
            state.handoff = Some(err);
        }
        self.shared.changed.notify_all();
    }

    /// The sticky error, if the stream has failed.
    pub fn error(&self) -> Option<StreamError> {
        self.lock().failed.clone()
    }
}
