use std::path::PathBuf;

use tracing::{debug, warn};

/// Durable slot holding the last selected entity id.
///
/// Persistence is best-effort: a failed write must never break selection,
/// so implementations log and swallow I/O errors.
pub trait SelectionStore: Send + Sync {
    /// Read the persisted id, if any.
    fn load(&self) -> Option<String>;

    /// Persist the given id.
    fn store(&self, id: &str);
}

/// File-backed selection slot: the id string in a small state file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SelectionStore for FileStore {
    fn load(&self) -> Option<String> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        let id = data.trim();
        if id.is_empty() {
            return None;
        }
        Some(id.to_string())
    }

    fn store(&self, id: &str) {
        if let Err(e) = std::fs::write(&self.path, id) {
            warn!(path = %self.path.display(), error = %e, "failed to persist selection");
        }
    }
}

/// Resolves which entity is "current" across refreshes.
///
/// Priority: the previously active id when still listed, then the persisted
/// id, then the first listed entity. Continuity keeps the chart from
/// jumping while a user is examining one entity and the listing refreshes.
pub struct SelectionTracker<S> {
    current: Option<String>,
    store: S,
}

impl<S: SelectionStore> SelectionTracker<S> {
    pub fn new(store: S) -> Self {
        Self {
            current: None,
            store,
        }
    }

    /// The id resolved by the last call, if it is still selected.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Resolve the active entity against the latest listing, persisting the
    /// id whenever the resolution changes.
    pub fn resolve(&mut self, available: &[String]) -> Option<String> {
        let resolved = self
            .current
            .as_ref()
            .filter(|id| available.contains(id))
            .cloned()
            .or_else(|| self.store.load().filter(|id| available.contains(id)))
            .or_else(|| available.first().cloned());

        let Some(id) = resolved else {
            // Empty listing: nothing selectable this refresh. The last
            // selection is kept in memory so the entity is re-adopted the
            // moment it reappears.
            return None;
        };

        if self.current.as_deref() != Some(id.as_str()) {
            debug!(entity = %id, "selection changed");
            self.store.store(&id);
            self.current = Some(id.clone());
        }

        Some(id)
    }
}
