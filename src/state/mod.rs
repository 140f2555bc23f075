//! Editing-session state: the autosave engine and its async driver.

mod runner;
mod section_sync;

pub use runner::SessionRunner;
pub use section_sync::{
    MutationOp, Notice, NoticeLevel, PendingMutation, SaveStatus, SectionSync, SessionError,
    SessionEvent, WriteJob, WriteReason,
};
