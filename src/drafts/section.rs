use crate::tree::SectionId;

/// Unsaved-edit tracking for the section bound to the editor buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyState {
    section: Option<SectionId>,
    dirty: bool,
    last_persisted: String,
    updated_ms: u64,
    synced_ms: u64,
}

impl DirtyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebind to `section`. `persisted` is what the store is known to hold,
    /// `buffer` what the editor was loaded with; a cached unsaved draft makes
    /// the new section dirty straight away.
    pub fn reset(&mut self, section: Option<SectionId>, persisted: &str, buffer: &str) {
        self.section = section;
        self.last_persisted = persisted.to_string();
        self.dirty = section.is_some() && buffer != persisted;
        self.updated_ms = 0;
        self.synced_ms = 0;
    }

    pub fn section(&self) -> Option<SectionId> {
        self.section
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_persisted(&self) -> &str {
        &self.last_persisted
    }

    pub fn updated_ms(&self) -> u64 {
        self.updated_ms
    }

    pub fn synced_ms(&self) -> u64 {
        self.synced_ms
    }

    /// Buffer change. Content equal to the last persisted value is a no-op
    /// (re-renders emit change events without edits). Returns the dirty flag.
    pub fn on_change(&mut self, content: &str, now: u64) -> bool {
        if self.section.is_none() {
            return false;
        }
        if content != self.last_persisted {
            self.dirty = true;
            self.updated_ms = now;
        }
        self.dirty
    }

    /// A write of `content` was confirmed. The flag stays set if the buffer has
    /// moved on since the write was scheduled.
    pub fn mark_persisted(&mut self, content: &str, buffer: &str, now: u64) {
        self.last_persisted = content.to_string();
        self.dirty = buffer != content;
        self.synced_ms = now;
    }

    /// The buffer went back to the last persisted content with no write
    /// pending, so there is nothing left to save.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// A write failed: the content stays eligible for the next attempt.
    pub fn mark_failed(&mut self) {
        if self.section.is_some() {
            self.dirty = true;
        }
    }
}
