use super::section_sync::{SectionSync, SessionError, SessionEvent, WriteJob, WriteReason};
use crate::api::{ApiError, ApiErrorKind, DocumentStore};
use crate::collab::{EditorBuffer, TransportEvent};
use crate::config::SyncConfig;
use crate::tree::SectionId;

/// Drives a [`SectionSync`] against a [`DocumentStore`].
///
/// Writes are executed one at a time, in the order the engine emitted them,
/// and their results fed straight back.
pub struct SessionRunner<S: DocumentStore, B: EditorBuffer> {
    store: S,
    sync: SectionSync<B>,

    /// Connectivity to the document store, as seen by the last request.
    backend_online: bool,
    last_backend_error: Option<String>,
}

impl<S: DocumentStore, B: EditorBuffer> SessionRunner<S, B> {
    pub async fn open(
        store: S,
        buffer: B,
        config: SyncConfig,
        document_id: &str,
        now: u64,
    ) -> Result<Self, SessionError> {
        let mut runner = Self {
            store,
            sync: SectionSync::new(config, buffer),
            backend_online: true,
            last_backend_error: None,
        };
        runner.reload(document_id, now).await?;
        Ok(runner)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sync(&self) -> &SectionSync<B> {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SectionSync<B> {
        &mut self.sync
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        self.sync.buffer_mut()
    }

    pub fn is_backend_online(&self) -> bool {
        self.backend_online
    }

    pub fn last_backend_error(&self) -> Option<&str> {
        self.last_backend_error.as_deref()
    }

    /// When the driver should call [`Self::pump`] next.
    pub fn next_wakeup(&self) -> Option<u64> {
        self.sync.next_wakeup()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.sync.drain_events()
    }

    /// Fetch `document_id` and rebind the session to it. Unsaved edits of the
    /// current section are written before the fetch.
    pub async fn reload(&mut self, document_id: &str, now: u64) -> Result<(), SessionError> {
        let flushed: Vec<WriteJob> = self.sync.flush(WriteReason::Flush).into_iter().collect();
        self.run(flushed, now).await;

        let doc = match self.store.fetch_document(document_id).await {
            Ok(doc) => {
                self.mark_backend_online();
                doc
            }
            Err(e) => {
                tracing::warn!(document_id, error = %e, "document load failed");
                self.mark_backend_offline(&e);
                return Err(SessionError::LoadFailed {
                    document_id: document_id.to_string(),
                    source: e,
                });
            }
        };

        let jobs = self.sync.load_document(doc, now);
        self.run(jobs, now).await;
        Ok(())
    }

    /// The editor buffer was modified through [`Self::buffer_mut`].
    pub fn edit(&mut self, now: u64) -> bool {
        self.sync.on_buffer_changed(now)
    }

    /// Advance timers and execute whatever writes fall due.
    pub async fn pump(&mut self, now: u64) {
        let jobs = self.sync.poll(now);
        self.run(jobs, now).await;
    }

    pub async fn select_section(&mut self, id: SectionId, now: u64) -> Result<(), SessionError> {
        let jobs = self.sync.select_section(id, now)?;
        self.run(jobs, now).await;
        Ok(())
    }

    pub async fn add_section(
        &mut self,
        parent: Option<SectionId>,
        title: &str,
        now: u64,
    ) -> Result<SectionId, SessionError> {
        let pending = self.sync.prepare_add_section(parent, title)?;
        let id = pending.section_id();
        let result = self.execute(&pending.job).await;
        let jobs = self.sync.commit_mutation(pending, result, now)?;
        self.run(jobs, now).await;
        Ok(id)
    }

    pub async fn delete_section(&mut self, id: SectionId, now: u64) -> Result<(), SessionError> {
        let pending = self.sync.prepare_delete_section(id)?;
        let result = self.execute(&pending.job).await;
        let jobs = self.sync.commit_mutation(pending, result, now)?;
        self.run(jobs, now).await;
        Ok(())
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        self.sync.on_transport_event(event);
    }

    /// Final flush; the session is detached afterwards.
    pub async fn close(&mut self, now: u64) {
        let jobs = self.sync.teardown(now);
        self.run(jobs, now).await;
    }

    async fn execute(&mut self, job: &WriteJob) -> Result<(), ApiError> {
        let result = self
            .store
            .update_document(&job.document_id, &job.request)
            .await;
        match &result {
            Ok(()) => self.mark_backend_online(),
            Err(e) => self.mark_backend_offline(e),
        }
        result
    }

    async fn run(&mut self, jobs: Vec<WriteJob>, now: u64) {
        for job in jobs {
            let result = self.execute(&job).await;
            self.sync.complete_write(job.ticket, result, now);
        }
    }

    fn mark_backend_online(&mut self) {
        if !self.backend_online {
            tracing::info!("document store reachable again");
        }
        self.backend_online = true;
        self.last_backend_error = None;
    }

    fn mark_backend_offline(&mut self, e: &ApiError) {
        if e.kind == ApiErrorKind::Network {
            self.backend_online = false;
            self.last_backend_error = Some(e.to_string());
        }
    }
}
