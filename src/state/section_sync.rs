use crate::api::ApiError;
use crate::cache::SectionCache;
use crate::collab::{ConnectionState, EditorBuffer, TransportEvent};
use crate::config::SyncConfig;
use crate::drafts::DirtyState;
use crate::models::{DocumentData, UpdateDocumentRequest};
use crate::schedule::{Deadline, Interval};
use crate::tree::{SectionId, SectionTree, TreeError};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WriteReason {
    Debounce,
    Autosave,
    /// Section switch, document switch or session end.
    Flush,
    Structure,
}

/// One whole-document write, to be executed by a driver and reported back via
/// [`SectionSync::complete_write`].
#[derive(Clone, Debug)]
pub struct WriteJob {
    pub ticket: u64,
    pub epoch: u64,
    pub document_id: String,
    pub reason: WriteReason,
    /// Section whose edit triggered the write; `None` for structural writes.
    pub section: Option<SectionId>,
    pub request: UpdateDocumentRequest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// What the UI layer observes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentChanged { document_id: String },
    ActiveSectionChanged(Option<SectionId>),
    SaveStatus(SaveStatus),
    TreeChanged,
    Notice(Notice),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to load document {document_id}: {source}")]
    LoadFailed {
        document_id: String,
        #[source]
        source: ApiError,
    },

    #[error("No document loaded")]
    NoDocument,

    #[error("Document {0} is not the one being edited")]
    DocumentMismatch(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Section change could not be saved: {0}")]
    MutationFailed(#[source] ApiError),

    #[error("Document was reloaded while the section change was being saved")]
    StaleMutation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOp {
    Add {
        id: SectionId,
        parent: Option<SectionId>,
        title: String,
    },
    Delete {
        id: SectionId,
    },
}

/// A structural edit whose write has been built but not yet confirmed.
#[derive(Clone, Debug)]
pub struct PendingMutation {
    pub op: MutationOp,
    pub job: WriteJob,
    snapshot: HashMap<SectionId, String>,
}

impl PendingMutation {
    pub fn section_id(&self) -> SectionId {
        match &self.op {
            MutationOp::Add { id, .. } | MutationOp::Delete { id } => *id,
        }
    }
}

#[derive(Clone, Debug)]
struct LoadedDocument {
    id: String,
    title: String,
}

#[derive(Clone, Debug)]
struct DebounceTarget {
    epoch: u64,
    section: SectionId,
    content: String,
}

#[derive(Clone, Debug)]
struct Flight {
    section: SectionId,
    /// Content of every section the write carried that differs from the tree.
    snapshot: HashMap<SectionId, String>,
}

/// Autosave and synchronization engine for one editing session.
///
/// Sans-IO: operations return [`WriteJob`]s instead of performing requests, and
/// time is whatever the caller passes as `now` (milliseconds). Everything runs
/// on one logical thread; the only ordering problems are temporal (debounce vs.
/// autosave vs. section switches vs. slow writes).
///
/// Per active section: `CLEAN -(edit)-> DIRTY -(debounce | tick | flush)->
/// SAVING -(ok)-> CLEAN | -(err)-> DIRTY`. A debounce or tick that lands while
/// the active section has a write in flight does not start a second one; a
/// debounce that was held back is re-armed when the write resolves.
pub struct SectionSync<B: EditorBuffer> {
    config: SyncConfig,
    buffer: B,

    doc: Option<LoadedDocument>,
    /// Bumped on every document load; completions from an older epoch are
    /// dropped.
    epoch: u64,
    tree: SectionTree,
    cache: SectionCache,
    dirty: DirtyState,
    active: Option<SectionId>,

    debounce: Deadline,
    pending: Option<DebounceTarget>,
    autosave: Interval,

    next_ticket: u64,
    in_flight: HashMap<u64, Flight>,
    resave_after_flight: bool,
    /// Highest ticket whose content has been applied to the tree, per section.
    applied: HashMap<SectionId, u64>,

    status: SaveStatus,
    connection: ConnectionState,
    events: Vec<SessionEvent>,
}

impl<B: EditorBuffer> SectionSync<B> {
    pub fn new(config: SyncConfig, buffer: B) -> Self {
        Self {
            autosave: Interval::new(config.autosave_interval_ms),
            config,
            buffer,
            doc: None,
            epoch: 0,
            tree: SectionTree::default(),
            cache: SectionCache::new(),
            dirty: DirtyState::new(),
            active: None,
            debounce: Deadline::new(),
            pending: None,
            next_ticket: 1,
            in_flight: HashMap::new(),
            resave_after_flight: false,
            applied: HashMap::new(),
            status: SaveStatus::Idle,
            connection: ConnectionState::Idle,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Direct access for the editor; call [`Self::on_buffer_changed`] after
    /// modifying it.
    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub fn tree(&self) -> &SectionTree {
        &self.tree
    }

    pub fn cache(&self) -> &SectionCache {
        &self.cache
    }

    pub fn document_id(&self) -> Option<&str> {
        self.doc.as_ref().map(|d| d.id.as_str())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn active_section(&self) -> Option<SectionId> {
        self.active
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn last_persisted(&self) -> &str {
        self.dirty.last_persisted()
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn writes_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn debounce_armed(&self) -> bool {
        self.debounce.is_armed()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Bind the session to a freshly fetched document.
    ///
    /// Dirty content of the previous document is flushed first (the returned
    /// jobs), then timers are cancelled, the tree rebuilt and the first root
    /// section of the first page activated.
    pub fn load_document(&mut self, doc: DocumentData, now: u64) -> Vec<WriteJob> {
        let jobs: Vec<WriteJob> = self.flush(WriteReason::Flush).into_iter().collect();
        self.cancel_timers();

        self.epoch += 1;
        let key = doc.key();
        self.tree = SectionTree::from_content(&doc.content);
        if !self.cache.bind(&key) {
            // Same document reloaded: keep drafts, drop entries that vanished.
            let tree = &self.tree;
            self.cache.retain(|id| tree.contains(id));
        }
        self.applied.clear();
        self.in_flight.clear();
        self.resave_after_flight = false;

        tracing::info!(
            document_id = %key,
            epoch = self.epoch,
            sections = self.tree.len(),
            "document loaded"
        );

        self.doc = Some(LoadedDocument {
            id: key.clone(),
            title: doc.title,
        });
        self.autosave.start(now);
        self.events.push(SessionEvent::DocumentChanged { document_id: key });
        self.events.push(SessionEvent::TreeChanged);

        let first = self.tree.first_root();
        self.activate(first);
        jobs
    }

    /// Flush-then-load switch of the active section.
    pub fn select_section(&mut self, id: SectionId, _now: u64) -> Result<Vec<WriteJob>, SessionError> {
        if self.doc.is_none() {
            return Err(SessionError::NoDocument);
        }
        if !self.tree.contains(id) {
            return Err(TreeError::UnknownSection(id).into());
        }
        if self.active == Some(id) {
            return Ok(Vec::new());
        }

        let jobs = self.leave_active();
        self.activate(Some(id));
        Ok(jobs)
    }

    /// The editor buffer changed. Records the content in the cache, updates the
    /// dirty flag and (re)arms the debounced save. Returns true if a save is
    /// scheduled.
    pub fn on_buffer_changed(&mut self, now: u64) -> bool {
        let Some(section) = self.active else {
            return false;
        };
        if self.doc.is_none() {
            return false;
        }

        let content = self.buffer.content();
        self.cache.put(section, &content);
        if self.dirty.is_dirty()
            && content == self.dirty.last_persisted()
            && !self.active_write_in_flight()
        {
            tracing::debug!(section = %section, "edit reverted to saved content");
            self.dirty.mark_clean();
            if self.pending.as_ref().map(|p| p.section) == Some(section) {
                self.debounce.cancel();
                self.pending = None;
            }
            return false;
        }
        if !self.dirty.on_change(&content, now) {
            return false;
        }
        self.arm_debounce(section, content, now);
        true
    }

    /// Debounced save of `content` for `section`. Supersedes any save that has
    /// been scheduled but has not fired yet; the superseded content stays in the
    /// cache and is picked up by the next autosave tick.
    pub fn schedule_save(
        &mut self,
        document_id: &str,
        section: SectionId,
        content: String,
        now: u64,
    ) -> Result<(), SessionError> {
        match self.document_id() {
            None => return Err(SessionError::NoDocument),
            Some(current) if current != document_id => {
                return Err(SessionError::DocumentMismatch(document_id.to_string()))
            }
            Some(_) => {}
        }
        if !self.tree.contains(section) {
            return Err(TreeError::UnknownSection(section).into());
        }
        self.cache.put(section, &content);
        if Some(section) == self.active {
            if self.buffer.content() != content {
                self.buffer.set_content(&content);
            }
            if !self.dirty.on_change(&content, now) {
                return Ok(());
            }
        }
        self.arm_debounce(section, content, now);
        Ok(())
    }

    fn arm_debounce(&mut self, section: SectionId, content: String, now: u64) {
        if self.debounce.is_armed() {
            tracing::debug!(section = %section, "debounced save superseded");
        }
        self.pending = Some(DebounceTarget {
            epoch: self.epoch,
            section,
            content,
        });
        self.debounce.arm(now, self.config.debounce_ms);
    }

    /// Earliest time at which [`Self::poll`] has something to do.
    pub fn next_wakeup(&self) -> Option<u64> {
        match (self.debounce.due_at(), self.autosave.due_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advance timers to `now`.
    pub fn poll(&mut self, now: u64) -> Vec<WriteJob> {
        let mut jobs = Vec::new();
        if self.debounce.fire(now) {
            jobs.extend(self.fire_debounce());
        }
        if self.autosave.fire(now) {
            jobs.extend(self.autosave_tick());
        }
        jobs
    }

    fn fire_debounce(&mut self) -> Option<WriteJob> {
        let target = self.pending.take()?;
        if target.epoch != self.epoch || !self.tree.contains(target.section) {
            tracing::debug!(section = %target.section, "debounced save dropped: document changed");
            return None;
        }

        if Some(target.section) != self.active {
            if self.tree.content(target.section) == Some(target.content.as_str())
                || self.carried_in_flight(target.section, &target.content)
            {
                return None;
            }
            return Some(self.issue(WriteReason::Debounce, target.section, target.content));
        }

        if !self.dirty.is_dirty() {
            return None;
        }
        if self.active_write_in_flight() {
            tracing::debug!(section = %target.section, "debounced save deferred: write in flight");
            self.resave_after_flight = true;
            return None;
        }
        Some(self.issue(WriteReason::Debounce, target.section, target.content))
    }

    fn autosave_tick(&mut self) -> Option<WriteJob> {
        if let (true, Some(section)) = (self.dirty.is_dirty(), self.active) {
            if self.active_write_in_flight() {
                tracing::debug!(section = %section, "autosave tick skipped: write in flight");
                return None;
            }
            let content = self.buffer.content();
            self.cache.put(section, &content);
            return Some(self.issue(WriteReason::Autosave, section, content));
        }
        self.save_inactive_drafts(WriteReason::Autosave)
    }

    /// Sections other than the active one whose cached content differs from the
    /// tree and is not carried by a write in flight, in document order. These
    /// are left behind by failed flushes and superseded saves.
    fn unsaved_inactive_sections(&self) -> Vec<SectionId> {
        let overlay = self.drafts_overlay(&self.tree);
        self.tree
            .flatten()
            .into_iter()
            .filter(|id| Some(*id) != self.active)
            .filter(|id| match overlay.get(id) {
                Some(content) => !self.carried_in_flight(*id, content),
                None => false,
            })
            .collect()
    }

    fn carried_in_flight(&self, section: SectionId, content: &str) -> bool {
        self.in_flight
            .values()
            .any(|f| f.snapshot.get(&section).map(String::as_str) == Some(content))
    }

    /// One write carrying every unsaved inactive draft (the overlay adds the
    /// rest of them).
    fn save_inactive_drafts(&mut self, reason: WriteReason) -> Option<WriteJob> {
        let section = *self.unsaved_inactive_sections().first()?;
        let content = self.cache.get(section)?.to_string();
        tracing::debug!(section = %section, %reason, "saving draft of an inactive section");
        Some(self.issue(reason, section, content))
    }

    /// Immediate write of everything unsaved: the active section's buffer if it
    /// is dirty, otherwise drafts left behind in other sections.
    pub fn flush(&mut self, reason: WriteReason) -> Option<WriteJob> {
        if self.doc.is_none() {
            return None;
        }
        match self.flush_active(reason) {
            Some(job) => Some(job),
            None => self.save_inactive_drafts(reason),
        }
    }

    fn flush_active(&mut self, reason: WriteReason) -> Option<WriteJob> {
        if !self.dirty.is_dirty() || self.doc.is_none() {
            return None;
        }
        let section = self.active?;
        let content = self.buffer.content();
        self.cache.put(section, &content);

        if self.carried_in_flight(section, &content) {
            return None;
        }
        Some(self.issue(reason, section, content))
    }

    /// End of the editing session: final flush, then all timers are cancelled
    /// and the buffer is detached. Writes already in flight may still complete.
    pub fn teardown(&mut self, _now: u64) -> Vec<WriteJob> {
        let jobs: Vec<WriteJob> = self.flush(WriteReason::Flush).into_iter().collect();
        self.cancel_timers();
        self.autosave.stop();
        if let Some(doc) = self.doc.take() {
            tracing::info!(document_id = %doc.id, flushed = jobs.len(), "editing session closed");
        }
        self.active = None;
        self.dirty.reset(None, "", "");
        jobs
    }

    /// Result of a content write issued by this session.
    pub fn complete_write(&mut self, ticket: u64, result: Result<(), ApiError>, now: u64) {
        let Some(flight) = self.in_flight.remove(&ticket) else {
            tracing::debug!(ticket, "ignoring completion of a write from an earlier document");
            return;
        };

        match result {
            Ok(()) => {
                self.apply_snapshot(ticket, &flight.snapshot, now);
                tracing::info!(ticket, section = %flight.section, "section saved");
                if self.in_flight.is_empty() {
                    self.set_status(SaveStatus::Saved);
                }
            }
            Err(e) => {
                tracing::warn!(ticket, section = %flight.section, error = %e, "section save failed");
                if Some(flight.section) == self.active {
                    self.dirty.mark_failed();
                }
                self.set_status(SaveStatus::Error);
                self.events
                    .push(SessionEvent::Notice(Notice::error(format!("Failed to save changes: {e}"))));
            }
        }

        if self.resave_after_flight && !self.active_write_in_flight() {
            self.resave_after_flight = false;
            if let (true, Some(section)) = (self.dirty.is_dirty(), self.active) {
                let content = self.buffer.content();
                self.arm_debounce(section, content, now);
            }
        }
    }

    /// Build the write for a new section appended under `parent` (or as the
    /// last root of the first page). Live state is untouched until
    /// [`Self::commit_mutation`].
    pub fn prepare_add_section(
        &mut self,
        parent: Option<SectionId>,
        title: &str,
    ) -> Result<PendingMutation, SessionError> {
        if self.doc.is_none() {
            return Err(SessionError::NoDocument);
        }
        if let Some(p) = parent {
            if !self.tree.contains(p) {
                return Err(TreeError::UnknownParent(p).into());
            }
        }
        let title = if title.trim().is_empty() {
            "Untitled".to_string()
        } else {
            title.trim().to_string()
        };

        let id = self.tree.reserve_id();
        let mut next = self.tree.clone();
        next.add_section(id, parent, &title)?;

        let op = MutationOp::Add { id, parent, title };
        Ok(self.build_mutation(op, &next))
    }

    /// Build the write for removing `id` (at any depth, with its subtree).
    pub fn prepare_delete_section(&mut self, id: SectionId) -> Result<PendingMutation, SessionError> {
        if self.doc.is_none() {
            return Err(SessionError::NoDocument);
        }
        let mut next = self.tree.clone();
        next.remove_section(id)?;
        Ok(self.build_mutation(MutationOp::Delete { id }, &next))
    }

    fn build_mutation(&mut self, op: MutationOp, next: &SectionTree) -> PendingMutation {
        let snapshot = self.drafts_overlay(next);
        let ticket = self.take_ticket();
        let (document_id, title) = self
            .doc
            .as_ref()
            .map(|d| (d.id.clone(), d.title.clone()))
            .unwrap_or_default();
        let request = next.to_update_request(&title, &snapshot);

        self.set_status(SaveStatus::Saving);
        tracing::debug!(ticket, ?op, "section change prepared");
        PendingMutation {
            op,
            job: WriteJob {
                ticket,
                epoch: self.epoch,
                document_id,
                reason: WriteReason::Structure,
                section: None,
                request,
            },
            snapshot,
        }
    }

    /// Apply a structural edit after its write resolved. On failure nothing
    /// changes locally and the same command can simply be retried.
    pub fn commit_mutation(
        &mut self,
        pending: PendingMutation,
        result: Result<(), ApiError>,
        now: u64,
    ) -> Result<Vec<WriteJob>, SessionError> {
        if pending.job.epoch != self.epoch || self.doc.is_none() {
            tracing::debug!(ticket = pending.job.ticket, "dropping section change for an earlier document");
            return Err(SessionError::StaleMutation);
        }

        if let Err(e) = result {
            tracing::warn!(op = ?pending.op, error = %e, "section change failed");
            self.set_status(SaveStatus::Error);
            self.events.push(SessionEvent::Notice(Notice::error(format!(
                "Failed to update sections: {e}"
            ))));
            return Err(SessionError::MutationFailed(e));
        }

        self.apply_snapshot(pending.job.ticket, &pending.snapshot, now);
        let jobs = match pending.op {
            MutationOp::Add { id, parent, title } => {
                self.tree.add_section(id, parent, &title)?;
                tracing::info!(section = %id, title = %title, "section added");
                self.events.push(SessionEvent::TreeChanged);
                let jobs = self.leave_active();
                self.activate(Some(id));
                jobs
            }
            MutationOp::Delete { id } => {
                let active_removed = self
                    .active
                    .map_or(false, |a| self.tree.path_to(a).contains(&id));
                let removed = self.tree.remove_section(id)?;
                tracing::info!(section = %id, removed = removed.len(), "section deleted");
                for r in &removed {
                    self.cache.remove(*r);
                    self.applied.remove(r);
                }
                self.events.push(SessionEvent::TreeChanged);
                if active_removed {
                    self.debounce.cancel();
                    self.pending = None;
                    let fallback = self.tree.first_root();
                    self.activate(fallback);
                }
                Vec::new()
            }
        };

        if self.in_flight.is_empty() {
            self.set_status(SaveStatus::Saved);
        }
        Ok(jobs)
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        self.connection = self.connection.apply(&event);
        let notice = match &event {
            TransportEvent::Connected => {
                tracing::info!("collaboration connected");
                Notice::info(event.notice_text())
            }
            TransportEvent::Disconnected => {
                tracing::warn!("collaboration disconnected");
                Notice::error(event.notice_text())
            }
            TransportEvent::Error(msg) => {
                tracing::warn!(error = %msg, "collaboration transport error");
                Notice::error(event.notice_text())
            }
        };
        self.events.push(SessionEvent::Notice(notice));
    }

    fn active_write_in_flight(&self) -> bool {
        match self.active {
            Some(a) => self.in_flight.values().any(|f| f.section == a),
            None => false,
        }
    }

    fn take_ticket(&mut self) -> u64 {
        let t = self.next_ticket;
        self.next_ticket += 1;
        t
    }

    /// Cached content that differs from what the tree holds. Every write
    /// carries it so that no write reverts another section's pending edit.
    fn drafts_overlay(&self, tree: &SectionTree) -> HashMap<SectionId, String> {
        tree.flatten()
            .into_iter()
            .filter_map(|id| {
                let cached = self.cache.get(id)?;
                (tree.content(id) != Some(cached)).then(|| (id, cached.to_string()))
            })
            .collect()
    }

    fn issue(&mut self, reason: WriteReason, section: SectionId, content: String) -> WriteJob {
        let mut snapshot = self.drafts_overlay(&self.tree);
        snapshot.insert(section, content);

        let ticket = self.take_ticket();
        let (document_id, title) = self
            .doc
            .as_ref()
            .map(|d| (d.id.clone(), d.title.clone()))
            .unwrap_or_default();
        let request = self.tree.to_update_request(&title, &snapshot);

        tracing::debug!(ticket, %reason, section = %section, "write issued");
        self.in_flight.insert(ticket, Flight { section, snapshot });
        self.set_status(SaveStatus::Saving);

        WriteJob {
            ticket,
            epoch: self.epoch,
            document_id,
            reason,
            section: Some(section),
            request,
        }
    }

    fn apply_snapshot(&mut self, ticket: u64, snapshot: &HashMap<SectionId, String>, now: u64) {
        for (&id, content) in snapshot {
            let newer = self.applied.get(&id).map_or(true, |&t| ticket > t);
            if !newer {
                continue;
            }
            if self.tree.set_content(id, content).is_err() {
                continue;
            }
            self.applied.insert(id, ticket);
            if Some(id) == self.active {
                let buffer = self.buffer.content();
                self.dirty.mark_persisted(content, &buffer, now);
            }
        }
    }

    fn leave_active(&mut self) -> Vec<WriteJob> {
        let jobs = self.flush_active(WriteReason::Flush).into_iter().collect();
        self.debounce.cancel();
        self.pending = None;
        jobs
    }

    fn cancel_timers(&mut self) {
        self.debounce.cancel();
        self.pending = None;
    }

    /// Load `id` into the buffer, preferring cached content over the tree.
    fn activate(&mut self, id: Option<SectionId>) {
        self.active = id;
        match id {
            Some(id) => {
                let persisted = self.tree.content(id).unwrap_or_default().to_string();
                let content = match self.cache.get(id) {
                    Some(cached) => cached.to_string(),
                    None => {
                        self.cache.put(id, &persisted);
                        persisted.clone()
                    }
                };
                self.buffer.set_content(&content);
                self.dirty.reset(Some(id), &persisted, &content);
                tracing::debug!(section = %id, dirty = self.dirty.is_dirty(), "section activated");
            }
            None => {
                self.buffer.set_content("");
                self.dirty.reset(None, "", "");
            }
        }
        self.events.push(SessionEvent::ActiveSectionChanged(id));
    }

    fn set_status(&mut self, status: SaveStatus) {
        if self.status != status {
            self.status = status;
            self.events.push(SessionEvent::SaveStatus(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiErrorKind;
    use crate::collab::TextBuffer;
    use crate::models::{ApiPage, ApiSection, DocumentContent, PageContent};

    fn sec(title: &str, content: &str, subs: Vec<ApiSection>) -> ApiSection {
        ApiSection {
            title: title.to_string(),
            level: None,
            content: content.to_string(),
            subsections: subs,
        }
    }

    fn doc(id: i64, sections: Vec<ApiSection>) -> DocumentData {
        DocumentData {
            id,
            team_id: 1,
            title: format!("Doc {id}"),
            url: String::new(),
            content: DocumentContent {
                pages: vec![ApiPage {
                    title: "Page".to_string(),
                    url: String::new(),
                    content: PageContent {
                        sections,
                        metadata: None,
                    },
                }],
            },
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn abc() -> DocumentData {
        doc(
            1,
            vec![
                sec("A", "a0", vec![]),
                sec("B", "b0", vec![]),
                sec("C", "c0", vec![]),
            ],
        )
    }

    fn session(debounce_ms: u64, autosave_interval_ms: u64) -> SectionSync<TextBuffer> {
        SectionSync::new(
            SyncConfig {
                debounce_ms,
                autosave_interval_ms,
            },
            TextBuffer::new(),
        )
    }

    fn type_text(s: &mut SectionSync<TextBuffer>, text: &str, now: u64) -> bool {
        s.buffer_mut().type_text(text);
        s.on_buffer_changed(now)
    }

    fn root_contents(job: &WriteJob) -> Vec<String> {
        job.request.content.pages[0]
            .content
            .sections
            .iter()
            .map(|s| s.content.clone())
            .collect()
    }

    fn root_titles(req: &UpdateDocumentRequest) -> Vec<String> {
        req.content.pages[0]
            .content
            .sections
            .iter()
            .map(|s| s.title.clone())
            .collect()
    }

    fn network_error() -> ApiError {
        ApiError::new(ApiErrorKind::Network, "connection refused")
    }

    #[test]
    fn test_load_activates_first_root_and_seeds_cache() {
        let mut s = session(3_000, 3_000);
        let jobs = s.load_document(abc(), 0);
        assert!(jobs.is_empty());
        assert_eq!(s.active_section(), Some(SectionId(1)));
        assert_eq!(s.buffer().content(), "a0");
        assert_eq!(s.cache().get(SectionId(1)), Some("a0"));
        assert!(!s.is_dirty());

        let events = s.drain_events();
        assert!(events.contains(&SessionEvent::DocumentChanged {
            document_id: "1".to_string()
        }));
        assert!(events.contains(&SessionEvent::ActiveSectionChanged(Some(SectionId(1)))));
    }

    #[test]
    fn test_debounce_coalesces_to_last_edit() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);

        assert!(type_text(&mut s, "x", 1_000));
        assert!(type_text(&mut s, "xy", 1_500));
        assert!(s.poll(4_499).is_empty());

        let jobs = s.poll(4_500);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].reason, WriteReason::Debounce);
        assert_eq!(jobs[0].section, Some(SectionId(1)));
        assert_eq!(root_contents(&jobs[0]), vec!["xy", "b0", "c0"]);
        assert_eq!(s.status(), SaveStatus::Saving);

        s.complete_write(jobs[0].ticket, Ok(()), 4_600);
        assert!(!s.is_dirty());
        assert_eq!(s.last_persisted(), "xy");
        assert_eq!(s.tree().content(SectionId(1)), Some("xy"));
        assert_eq!(s.status(), SaveStatus::Saved);
        assert!(s.poll(60_000).is_empty());
    }

    #[test]
    fn test_default_timing_sends_single_write() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "x", 1_000);
        type_text(&mut s, "xy", 1_500);

        let mut sent = Vec::new();
        for now in (0..=10_000).step_by(100) {
            for job in s.poll(now) {
                sent.push(root_contents(&job)[0].clone());
                s.complete_write(job.ticket, Ok(()), now);
            }
        }
        assert_eq!(sent, vec!["xy".to_string()]);
    }

    #[test]
    fn test_autosave_tick_when_clean_writes_nothing() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        assert!(s.poll(3_000).is_empty());
        assert!(s.poll(6_000).is_empty());
        assert_eq!(s.status(), SaveStatus::Idle);
    }

    #[test]
    fn test_change_back_to_persisted_content_is_noop() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        assert!(!type_text(&mut s, "a0", 100));
        assert!(!s.is_dirty());
        assert!(!s.debounce_armed());
    }

    #[test]
    fn test_failed_save_retries_with_current_content() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a", 100);

        let jobs = s.poll(3_000);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].reason, WriteReason::Autosave);
        assert_eq!(root_contents(&jobs[0])[0], "a");

        type_text(&mut s, "ab", 3_050);
        s.complete_write(jobs[0].ticket, Err(network_error()), 3_100);
        assert!(s.is_dirty());
        assert_eq!(s.status(), SaveStatus::Error);
        assert_eq!(s.last_persisted(), "a0");
        assert!(s
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::Notice(n) if n.level == NoticeLevel::Error)));

        let retry = s.poll(6_000);
        assert_eq!(retry.len(), 1);
        assert_eq!(root_contents(&retry[0])[0], "ab");
    }

    #[test]
    fn test_no_second_write_while_one_is_in_flight() {
        let mut s = session(1_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a", 100);
        let first = s.poll(1_100);
        assert_eq!(first.len(), 1);

        type_text(&mut s, "ab", 1_200);
        assert!(s.poll(3_000).is_empty());
        assert_eq!(s.writes_in_flight(), 1);
    }

    #[test]
    fn test_deferred_debounce_rearmed_after_completion() {
        let mut s = session(1_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a", 0);
        let first = s.poll(1_000);
        assert_eq!(first.len(), 1);

        type_text(&mut s, "ab", 1_100);
        assert!(s.poll(2_100).is_empty());
        assert!(!s.debounce_armed());

        s.complete_write(first[0].ticket, Ok(()), 2_200);
        assert!(s.is_dirty());
        assert_eq!(s.last_persisted(), "a");
        assert!(s.debounce_armed());

        let second = s.poll(3_200);
        assert_eq!(second.len(), 1);
        assert_eq!(root_contents(&second[0])[0], "ab");
    }

    #[test]
    fn test_switch_while_dirty_flushes_once_then_loads() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a-draft", 100);

        let jobs = s.select_section(SectionId(2), 200).expect("select");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].reason, WriteReason::Flush);
        assert_eq!(jobs[0].section, Some(SectionId(1)));
        assert_eq!(root_contents(&jobs[0])[0], "a-draft");

        assert_eq!(s.active_section(), Some(SectionId(2)));
        assert_eq!(s.buffer().content(), "b0");
        assert!(!s.is_dirty());
        assert!(!s.debounce_armed());
        assert!(s.poll(3_100).is_empty());
    }

    #[test]
    fn test_switch_while_clean_issues_no_write() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        let jobs = s.select_section(SectionId(3), 10).expect("select");
        assert!(jobs.is_empty());
        assert_eq!(s.buffer().content(), "c0");
        assert!(s.select_section(SectionId(3), 20).expect("same").is_empty());
        assert!(matches!(
            s.select_section(SectionId(99), 30),
            Err(SessionError::Tree(TreeError::UnknownSection(SectionId(99))))
        ));
    }

    #[test]
    fn test_switch_back_restores_cached_draft() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "typed", 100);

        let flush = s.select_section(SectionId(2), 200).expect("select");
        s.complete_write(flush[0].ticket, Err(network_error()), 300);

        s.select_section(SectionId(1), 400).expect("select back");
        assert_eq!(s.buffer().content(), "typed");
        assert_eq!(s.last_persisted(), "a0");
        assert!(s.is_dirty());

        let retry = s.poll(3_000);
        assert_eq!(retry.len(), 1);
        assert_eq!(root_contents(&retry[0])[0], "typed");
    }

    #[test]
    fn test_write_carries_other_sections_unsaved_drafts() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a1", 100);
        let flush = s.select_section(SectionId(2), 200).expect("select");
        assert_eq!(flush.len(), 1);

        type_text(&mut s, "b1", 300);
        let jobs = s.poll(3_300);
        assert_eq!(jobs.len(), 1);
        assert_eq!(root_contents(&jobs[0]), vec!["a1", "b1", "c0"]);

        // The older flush resolving last must not overwrite section A.
        s.complete_write(jobs[0].ticket, Ok(()), 3_400);
        s.complete_write(flush[0].ticket, Ok(()), 3_500);
        assert_eq!(s.tree().content(SectionId(1)), Some("a1"));
        assert_eq!(s.tree().content(SectionId(2)), Some("b1"));
        assert!(!s.is_dirty());
    }

    #[test]
    fn test_completion_after_newer_edit_keeps_dirty() {
        let mut s = session(1_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a", 0);
        let jobs = s.poll(1_000);
        type_text(&mut s, "ab", 1_100);
        s.complete_write(jobs[0].ticket, Ok(()), 1_200);
        assert!(s.is_dirty());
        assert_eq!(s.last_persisted(), "a");
        assert_eq!(s.cache().get(SectionId(1)), Some("ab"));
    }

    #[test]
    fn test_completion_from_previous_document_is_ignored() {
        let mut s = session(1_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a", 0);
        let jobs = s.poll(1_000);

        s.load_document(doc(2, vec![sec("X", "x0", vec![])]), 1_100);
        s.drain_events();
        s.complete_write(jobs[0].ticket, Ok(()), 1_200);
        assert_eq!(s.tree().content(SectionId(1)), Some("x0"));
        assert!(s.drain_events().is_empty());
        assert!(s.cache().get(SectionId(2)).is_none());
    }

    #[test]
    fn test_document_change_flushes_dirty_previous_document() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "unsaved", 100);

        let jobs = s.load_document(doc(2, vec![sec("X", "x0", vec![])]), 200);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].document_id, "1");
        assert_eq!(root_contents(&jobs[0])[0], "unsaved");
        assert_eq!(s.document_id(), Some("2"));
        assert_eq!(s.buffer().content(), "x0");
        assert!(!s.debounce_armed());
        assert_eq!(s.cache().document_id(), Some("2"));
    }

    #[test]
    fn test_reload_same_document_keeps_cached_draft() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "draft", 100);
        let flush = s.load_document(abc(), 200);
        assert_eq!(flush.len(), 1);
        assert_eq!(s.buffer().content(), "draft");
        assert!(s.is_dirty());
    }

    #[test]
    fn test_schedule_save_checks_document() {
        let mut s = session(3_000, 60_000);
        assert!(matches!(
            s.schedule_save("1", SectionId(1), "x".to_string(), 0),
            Err(SessionError::NoDocument)
        ));
        s.load_document(abc(), 0);
        assert!(matches!(
            s.schedule_save("9", SectionId(1), "x".to_string(), 0),
            Err(SessionError::DocumentMismatch(_))
        ));
        assert!(matches!(
            s.schedule_save("1", SectionId(42), "x".to_string(), 0),
            Err(SessionError::Tree(TreeError::UnknownSection(SectionId(42))))
        ));
    }

    #[test]
    fn test_schedule_save_on_fresh_section_writes_last_content() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        s.schedule_save("1", SectionId(1), "x".to_string(), 10)
            .expect("schedule");
        s.schedule_save("1", SectionId(1), "xy".to_string(), 20)
            .expect("supersede");
        assert!(s.is_dirty());
        assert!(s.poll(3_019).is_empty());

        let jobs = s.poll(3_020);
        assert_eq!(jobs.len(), 1);
        assert_eq!(root_contents(&jobs[0])[0], "xy");

        s.complete_write(jobs[0].ticket, Ok(()), 3_100);
        assert!(!s.is_dirty());
        assert_eq!(s.buffer().content(), "xy");
        assert!(s.poll(60_000).is_empty());
    }

    #[test]
    fn test_schedule_save_for_inactive_section() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        s.schedule_save("1", SectionId(2), "b-new".to_string(), 0)
            .expect("schedule");
        assert_eq!(s.active_section(), Some(SectionId(1)));
        assert_eq!(s.buffer().content(), "a0");
        assert!(!s.is_dirty());

        let jobs = s.poll(3_000);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].section, Some(SectionId(2)));
        assert_eq!(root_contents(&jobs[0]), vec!["a0", "b-new", "c0"]);

        s.complete_write(jobs[0].ticket, Ok(()), 3_100);
        assert_eq!(s.tree().content(SectionId(2)), Some("b-new"));
        assert_eq!(s.status(), SaveStatus::Saved);
    }

    #[test]
    fn test_superseded_schedule_save_rides_along() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        s.schedule_save("1", SectionId(2), "b1".to_string(), 0)
            .expect("schedule B");
        s.schedule_save("1", SectionId(3), "c1".to_string(), 100)
            .expect("schedule C");

        let jobs = s.poll(3_100);
        assert_eq!(jobs.len(), 1);
        assert_eq!(root_contents(&jobs[0]), vec!["a0", "b1", "c1"]);
        s.complete_write(jobs[0].ticket, Ok(()), 3_200);
        assert_eq!(s.tree().content(SectionId(2)), Some("b1"));
        assert_eq!(s.tree().content(SectionId(3)), Some("c1"));
    }

    #[test]
    fn test_failed_flush_of_left_section_is_retried_by_autosave() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a-draft", 100);
        let flush = s.select_section(SectionId(2), 200).expect("select");
        s.complete_write(flush[0].ticket, Err(network_error()), 300);
        assert!(!s.is_dirty());

        let retry = s.poll(3_000);
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].reason, WriteReason::Autosave);
        assert_eq!(retry[0].section, Some(SectionId(1)));
        assert_eq!(root_contents(&retry[0]), vec!["a-draft", "b0", "c0"]);

        s.complete_write(retry[0].ticket, Ok(()), 3_100);
        assert_eq!(s.tree().content(SectionId(1)), Some("a-draft"));
        assert_eq!(s.status(), SaveStatus::Saved);
        assert!(s.poll(6_000).is_empty());
    }

    #[test]
    fn test_teardown_saves_draft_left_by_failed_flush() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a-draft", 100);
        let flush = s.select_section(SectionId(2), 200).expect("select");
        s.complete_write(flush[0].ticket, Err(network_error()), 300);

        let jobs = s.teardown(400);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].reason, WriteReason::Flush);
        assert_eq!(root_contents(&jobs[0])[0], "a-draft");
        s.complete_write(jobs[0].ticket, Ok(()), 500);
        assert_eq!(s.tree().content(SectionId(1)), Some("a-draft"));
    }

    #[test]
    fn test_leaving_again_while_flush_in_flight_writes_once() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a1", 100);
        let flush = s.select_section(SectionId(2), 200).expect("leave A");
        assert_eq!(flush.len(), 1);

        assert!(s.select_section(SectionId(1), 300).expect("back to A").is_empty());
        assert_eq!(s.buffer().content(), "a1");
        assert!(s.is_dirty());

        assert!(s.select_section(SectionId(2), 400).expect("leave A again").is_empty());
        assert_eq!(s.writes_in_flight(), 1);

        s.complete_write(flush[0].ticket, Ok(()), 500);
        s.select_section(SectionId(1), 600).expect("back to A");
        assert_eq!(s.buffer().content(), "a1");
        assert!(!s.is_dirty());
        assert_eq!(s.writes_in_flight(), 0);
    }

    #[test]
    fn test_revert_to_saved_content_clears_dirty() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        assert!(type_text(&mut s, "x", 0));
        assert!(!type_text(&mut s, "a0", 100));
        assert!(!s.is_dirty());
        assert!(!s.debounce_armed());
        assert!(s.poll(60_000).is_empty());
    }

    #[test]
    fn test_revert_while_write_in_flight_is_saved() {
        let mut s = session(3_000, 60_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "x", 0);
        let first = s.poll(3_000);
        assert_eq!(first.len(), 1);

        assert!(type_text(&mut s, "a0", 3_100));
        s.complete_write(first[0].ticket, Ok(()), 3_200);
        assert!(s.is_dirty());

        let second = s.poll(6_100);
        assert_eq!(second.len(), 1);
        assert_eq!(root_contents(&second[0])[0], "a0");
    }

    #[test]
    fn test_next_wakeup_tracks_earliest_timer() {
        let mut s = session(1_000, 3_000);
        assert_eq!(s.next_wakeup(), None);
        s.load_document(abc(), 0);
        assert_eq!(s.next_wakeup(), Some(3_000));
        type_text(&mut s, "x", 100);
        assert_eq!(s.next_wakeup(), Some(1_100));
        s.teardown(200);
        assert_eq!(s.next_wakeup(), None);
    }

    #[test]
    fn test_add_root_section_persists_before_commit() {
        let mut s = session(3_000, 3_000);
        s.load_document(doc(1, vec![sec("A", "a0", vec![]), sec("B", "b0", vec![])]), 0);

        let pending = s.prepare_add_section(None, "C").expect("prepare");
        assert_eq!(root_titles(&pending.job.request), vec!["A", "B", "C"]);
        assert_eq!(pending.job.reason, WriteReason::Structure);
        assert_eq!(s.tree().roots(0), &[SectionId(1), SectionId(2)]);
        assert_eq!(s.active_section(), Some(SectionId(1)));

        let id = pending.section_id();
        let jobs = s.commit_mutation(pending, Ok(()), 10).expect("commit");
        assert!(jobs.is_empty());
        assert_eq!(s.tree().roots(0), &[SectionId(1), SectionId(2), id]);
        assert_eq!(s.active_section(), Some(id));
        assert_eq!(s.buffer().content(), "");
        assert_eq!(s.status(), SaveStatus::Saved);
        assert!(s.drain_events().contains(&SessionEvent::TreeChanged));
    }

    #[test]
    fn test_add_child_section_flushes_previous_active() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "a-edit", 10);

        let pending = s.prepare_add_section(Some(SectionId(1)), "A.1").expect("prepare");
        let sections = &pending.job.request.content.pages[0].content.sections;
        assert_eq!(sections[0].subsections[0].title, "A.1");
        assert_eq!(sections[0].subsections[0].level, Some(2));
        assert_eq!(sections[0].content, "a-edit");

        let id = pending.section_id();
        let jobs = s.commit_mutation(pending, Ok(()), 20).expect("commit");
        // The structural write already carried the edit, so nothing is left to flush.
        assert!(jobs.is_empty());
        assert_eq!(s.tree().content(SectionId(1)), Some("a-edit"));
        assert_eq!(s.tree().parent_of(id), Some(SectionId(1)));
        assert_eq!(s.active_section(), Some(id));
    }

    #[test]
    fn test_failed_add_leaves_state_unchanged_and_is_retryable() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        let pending = s.prepare_add_section(None, "D").expect("prepare");
        let err = s
            .commit_mutation(pending, Err(network_error()), 10)
            .unwrap_err();
        assert!(matches!(err, SessionError::MutationFailed(_)));
        assert_eq!(s.tree().len(), 3);
        assert_eq!(s.active_section(), Some(SectionId(1)));
        assert_eq!(s.status(), SaveStatus::Error);

        let again = s.prepare_add_section(None, "D").expect("prepare again");
        let id = again.section_id();
        s.commit_mutation(again, Ok(()), 20).expect("commit");
        assert_eq!(s.tree().roots(0).last(), Some(&id));
        assert_eq!(s.tree().len(), 4);
    }

    #[test]
    fn test_add_under_unknown_parent_is_rejected() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        assert!(matches!(
            s.prepare_add_section(Some(SectionId(42)), "x"),
            Err(SessionError::Tree(TreeError::UnknownParent(SectionId(42))))
        ));
    }

    #[test]
    fn test_delete_active_section_falls_back_to_first_root() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        s.select_section(SectionId(2), 0).expect("select B");
        type_text(&mut s, "doomed", 10);

        let pending = s.prepare_delete_section(SectionId(2)).expect("prepare");
        assert_eq!(root_titles(&pending.job.request), vec!["A", "C"]);
        assert_eq!(s.tree().len(), 3);

        s.commit_mutation(pending, Ok(()), 20).expect("commit");
        assert_eq!(s.tree().roots(0), &[SectionId(1), SectionId(3)]);
        assert_eq!(s.active_section(), Some(SectionId(1)));
        assert_eq!(s.buffer().content(), "a0");
        assert!(s.cache().get(SectionId(2)).is_none());
        assert!(!s.debounce_armed());
        assert!(s.poll(3_000).is_empty());
    }

    #[test]
    fn test_delete_inactive_section_keeps_active() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        let pending = s.prepare_delete_section(SectionId(3)).expect("prepare");
        s.commit_mutation(pending, Ok(()), 5).expect("commit");
        assert_eq!(s.active_section(), Some(SectionId(1)));
        assert_eq!(s.tree().roots(0), &[SectionId(1), SectionId(2)]);
    }

    #[test]
    fn test_delete_deeply_nested_section() {
        let mut s = session(3_000, 3_000);
        s.load_document(
            doc(
                1,
                vec![sec(
                    "A",
                    "",
                    vec![sec("A.1", "", vec![sec("A.1.a", "", vec![sec("A.1.a.i", "", vec![])])])],
                )],
            ),
            0,
        );
        let pending = s.prepare_delete_section(SectionId(3)).expect("prepare");
        s.commit_mutation(pending, Ok(()), 5).expect("commit");
        assert!(!s.tree().contains(SectionId(3)));
        assert!(!s.tree().contains(SectionId(4)));
        assert!(s.tree().children(SectionId(2)).is_empty());
    }

    #[test]
    fn test_delete_parent_of_active_section() {
        let mut s = session(3_000, 3_000);
        s.load_document(
            doc(
                1,
                vec![sec("A", "", vec![sec("A.1", "nested", vec![])]), sec("B", "b0", vec![])],
            ),
            0,
        );
        s.select_section(SectionId(2), 0).expect("select A.1");
        let pending = s.prepare_delete_section(SectionId(1)).expect("prepare");
        s.commit_mutation(pending, Ok(()), 5).expect("commit");
        assert_eq!(s.active_section(), Some(SectionId(3)));
        assert_eq!(s.buffer().content(), "b0");
        assert!(s.cache().get(SectionId(2)).is_none());
    }

    #[test]
    fn test_delete_last_section_leaves_no_active() {
        let mut s = session(3_000, 3_000);
        s.load_document(doc(1, vec![sec("Only", "x", vec![])]), 0);
        let pending = s.prepare_delete_section(SectionId(1)).expect("prepare");
        s.commit_mutation(pending, Ok(()), 5).expect("commit");
        assert_eq!(s.active_section(), None);
        assert_eq!(s.buffer().content(), "");
        assert!(!type_text(&mut s, "ignored", 10));
    }

    #[test]
    fn test_mutation_for_previous_document_is_stale() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        let pending = s.prepare_delete_section(SectionId(1)).expect("prepare");
        s.load_document(doc(2, vec![sec("X", "", vec![])]), 5);
        assert!(matches!(
            s.commit_mutation(pending, Ok(()), 10),
            Err(SessionError::StaleMutation)
        ));
        assert!(s.tree().contains(SectionId(1)));
    }

    #[test]
    fn test_teardown_flushes_and_cancels_timers() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        type_text(&mut s, "last words", 100);

        let jobs = s.teardown(200);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].reason, WriteReason::Flush);
        assert_eq!(root_contents(&jobs[0])[0], "last words");
        assert!(!s.debounce_armed());
        assert!(s.poll(10_000).is_empty());
        assert_eq!(s.active_section(), None);
        assert_eq!(s.document_id(), None);
    }

    #[test]
    fn test_transport_events_do_not_stop_autosave() {
        let mut s = session(3_000, 3_000);
        s.load_document(abc(), 0);
        s.drain_events();

        s.on_transport_event(TransportEvent::Connected);
        assert_eq!(s.connection(), ConnectionState::Connected);
        s.on_transport_event(TransportEvent::Disconnected);
        assert_eq!(s.connection(), ConnectionState::Disconnected);

        let events = s.drain_events();
        assert_eq!(
            events,
            vec![
                SessionEvent::Notice(Notice::info("Connected to collaboration server")),
                SessionEvent::Notice(Notice::error("Disconnected from server")),
            ]
        );

        type_text(&mut s, "offline edit", 100);
        assert_eq!(s.poll(3_000).len(), 1);
    }

    #[test]
    fn test_save_status_display() {
        assert_eq!(SaveStatus::Saving.to_string(), "saving");
        assert_eq!(SaveStatus::Saved.as_ref(), "saved");
        assert_eq!(SaveStatus::Error.to_string(), "error");
        assert_eq!(WriteReason::Autosave.to_string(), "autosave");
    }
}
