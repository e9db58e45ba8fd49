use std::sync::Arc;
use std::time::Duration;

use log::{trace, warn};

use super::{PaneError, PaneKind, PaneRefresher};
use crate::sync::debounce::Debouncer;

/// A pane whose refreshes are coalesced by its own debounce window.
///
/// `refresh` always succeeds immediately; the real refresh runs later and
/// any failure it reports is logged and contained to this pane.
pub struct DebouncedPane {
    kind: PaneKind,
    inner: Arc<dyn PaneRefresher>,
    debouncer: Debouncer,
}

impl DebouncedPane {
    pub fn new(kind: PaneKind, inner: Arc<dyn PaneRefresher>, delay: Duration) -> Self {
        DebouncedPane {
            kind,
            inner,
            debouncer: Debouncer::new(delay),
        }
    }

    pub fn kind(&self) -> PaneKind {
        self.kind
    }
}

impl PaneRefresher for DebouncedPane {
    fn refresh(&self) -> Result<(), PaneError> {
        let inner = Arc::clone(&self.inner);
        let kind = self.kind;
        trace!("{} refresh scheduled", kind);
        self.debouncer.call(async move {
            if let Err(e) = inner.refresh() {
                warn!("{} refresh failed: {}", kind, e);
            }
        });
        Ok(())
    }
}
