pub mod clock;
pub mod command_queue;
pub mod coordinator;
pub mod debounce;
pub mod reveal;
pub mod selection;
pub mod session;
pub mod staleness;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::Stamp;
pub use command_queue::{CommandQueue, QueueProbe, RefreshSink, SettledRun};
pub use coordinator::{OutlineAction, PassReport, RefreshCoordinator};
pub use debounce::Debouncer;
pub use reveal::{RevealHandle, RevealSerializer};
pub use selection::{Selection, SelectionSources, TimestampedSelection};
pub use session::{OutlineSession, SelectOutcome};
pub use staleness::{StalenessResolver, StalenessView};

/// Lock a mutex, recovering the data if a previous holder panicked.
/// Critical sections in this crate never leave state half-written.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
