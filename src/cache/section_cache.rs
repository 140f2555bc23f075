use crate::tree::SectionId;
use std::collections::HashMap;

/// Latest known buffer content per section, scoped to one document.
///
/// The cache outranks the tree when a section is reopened: it may hold edits
/// that have not been written yet.
#[derive(Clone, Debug, Default)]
pub struct SectionCache {
    document_id: Option<String>,
    entries: HashMap<SectionId, String>,
}

impl SectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    /// Scope the cache to `document_id`. Entries are dropped only when the
    /// identity actually changes. Returns true if the cache was cleared.
    pub fn bind(&mut self, document_id: &str) -> bool {
        if self.document_id.as_deref() == Some(document_id) {
            return false;
        }
        self.clear();
        self.document_id = Some(document_id.to_string());
        true
    }

    pub fn get(&self, id: SectionId) -> Option<&str> {
        self.entries.get(&id).map(|s| s.as_str())
    }

    pub fn put(&mut self, id: SectionId, content: &str) {
        match self.entries.get_mut(&id) {
            Some(existing) if existing == content => {}
            Some(existing) => *existing = content.to_string(),
            None => {
                self.entries.insert(id, content.to_string());
            }
        }
    }

    pub fn remove(&mut self, id: SectionId) -> Option<String> {
        self.entries.remove(&id)
    }

    /// Drop entries for sections that no longer exist.
    pub fn retain(&mut self, keep: impl Fn(SectionId) -> bool) {
        self.entries.retain(|id, _| keep(*id));
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "section cache cleared");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
