use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// A reading of the process-wide logical clock.
///
/// Strictly increasing: two reads never return the same value, even within
/// the same instant. `Stamp::ZERO` is older than every reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Stamp(u64);

impl Stamp {
    pub const ZERO: Stamp = Stamp(0);

    pub fn now() -> Stamp {
        Stamp(CLOCK.fetch_add(1, Ordering::SeqCst))
    }

    /// A fixed reading, for replaying a known ordering
    pub fn from_raw(value: u64) -> Stamp {
        Stamp(value)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}
