//! Identities and time sources injected by the host.
//!
//! Every object with a stable identity (documents, marker layers, markers, sessions,
//! selections, decorations) draws its id from an [`IdGenerator`] handed in at construction.
//! Time-dependent behavior (undo grouping, the stopped-changing debounce) reads a [`Clock`].
//! Tests substitute [`SequentialIdGenerator`] and [`ManualClock`] to get deterministic runs.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of fresh identities.
pub trait IdGenerator: Send + Sync {
    /// Return an id never returned before by this generator.
    fn next_id(&self) -> u64;
}

/// Monotonic counter starting at a configurable value.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Counter whose first id is `1`.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Draw a fresh id from `ids`.
            pub fn next(ids: &dyn IdGenerator) -> Self {
                Self(ids.next_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a [`Document`](crate::Document).
    DocumentId
);
define_id!(
    /// Identity of a [`MarkerLayer`](crate::MarkerLayer).
    LayerId
);
define_id!(
    /// Identity of a [`Marker`](crate::Marker).
    MarkerId
);
define_id!(
    /// Identity of an [`EditorSession`](crate::EditorSession).
    SessionId
);
define_id!(
    /// Identity of a selection (and of its cursor).
    SelectionId
);
define_id!(
    /// Identity of a decoration.
    DecorationId
);

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// A clock whose origin is the moment of creation.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    /// A clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Jump to an absolute reading.
    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
