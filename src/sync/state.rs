//! Per-file publish state machine
//!
//! Unpublished → Transferring → {Published | Failed}
//! Unpublished → {Skipped | Failed}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Not yet acted on in this attempt
    Unpublished,
    /// Content is being written to the store
    Transferring,
    /// Content transferred and metadata reconciled
    Published,
    /// Content already current; metadata reconciled
    Skipped,
    /// Attempt failed; retried on a later run
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid file state transition from {from:?} to {to:?}")]
pub struct StateError {
    pub from: FileState,
    pub to: FileState,
}

impl FileState {
    pub fn can_transition_to(&self, target: FileState) -> bool {
        matches!(
            (self, target),
            (FileState::Unpublished, FileState::Transferring)
                | (FileState::Unpublished, FileState::Skipped)
                | (FileState::Unpublished, FileState::Failed)
                | (FileState::Transferring, FileState::Published)
                | (FileState::Transferring, FileState::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileState::Published | FileState::Skipped | FileState::Failed
        )
    }

    /// Move to `target`, rejecting transitions the machine does not allow.
    pub fn advance(&mut self, target: FileState) -> Result<(), StateError> {
        if !self.can_transition_to(target) {
            return Err(StateError {
                from: *self,
                to: target,
            });
        }
        *self = target;
        Ok(())
    }
}
