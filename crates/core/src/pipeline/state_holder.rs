use std::sync::{Arc, PoisonError, RwLock};

use crate::shared::document::Document;

/// Holds the most recently published document.
///
/// Readers get a shared handle to a complete document; a replacement swaps
/// the handle atomically, so a reader never observes a partially updated
/// value. Documents already handed out stay valid after being replaced.
#[derive(Default)]
pub struct StateHolder {
    current: RwLock<Option<Arc<Document>>>,
}

impl StateHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current document.
    pub fn set(&self, document: Document) {
        let next = Some(Arc::new(document));
        let previous = {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, next)
        };
        drop(previous);
    }

    /// Returns the latest document, or `None` before the first publication.
    pub fn get(&self) -> Option<Arc<Document>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
