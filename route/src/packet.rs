//! Unit of transfer carried by a [crate::Route].

use crate::{completion::Notifier, Error};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};
use tracing::warn;

/// Source of process-unique packet identifiers.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier of a [Packet].
///
/// Identifiers are unique within the process but carry no ordering meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u64);

impl Id {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Remaining bytes of one logical transfer and the notification to fire once they reach zero.
#[derive(Debug)]
pub struct Packet {
    id: Id,
    remaining: u64,
    notifier: Option<Notifier>,
    ready: SystemTime,
}

impl Packet {
    /// Create a packet of `size` bytes that became ready for transfer at `ready`.
    pub fn new(size: u64, notifier: Notifier, ready: SystemTime) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidSize);
        }
        if notifier.is_canceled() {
            return Err(Error::InvalidNotifier);
        }
        Ok(Self {
            id: Id::next(),
            remaining: size,
            notifier: Some(notifier),
            ready,
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Bytes left to transfer.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Virtual time at which the packet joined its route.
    pub fn ready(&self) -> SystemTime {
        self.ready
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Account for up to `max` transferred bytes, firing the notifier (with `at`) when the
    /// packet reaches zero.
    ///
    /// Returns the number of bytes deducted. Calling this on a complete packet is a no-op.
    pub fn decrement(&mut self, max: u64, at: SystemTime) -> u64 {
        let chunk = self.remaining.min(max);
        self.remaining -= chunk;
        if self.remaining == 0 {
            if let Some(notifier) = self.notifier.take() {
                if !notifier.fire(at) {
                    warn!(packet = %self.id, "completion dropped by submitter");
                }
            }
        }
        chunk
    }
}
