//! Publisher error taxonomy

use std::io;

use seqpub_catalog::DiscoveryError;
use seqpub_store::StoreError;

use crate::checkpoint::CheckpointError;
use crate::composition::CompositionError;
use crate::config::ConfigError;
use crate::integrity::IntegrityError;
use crate::metadata::MetadataError;
use crate::sync::StateError;

/// Any failure raised while publishing a run.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("transfer error: {0}")]
    Transfer(#[from] StoreError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Reading a local file for its digest.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("error budget exceeded: {errors} errors, at most {max} allowed")]
    BudgetExceeded { errors: usize, max: usize },
}

impl PublishError {
    /// Short machine-readable kind, used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Config(_) => "config",
            PublishError::Discovery(_) => "discovery",
            PublishError::Composition(_) => "composition",
            PublishError::Integrity(_) => "integrity",
            PublishError::Metadata(_) => "metadata",
            PublishError::Transfer(_) => "transfer",
            PublishError::Checkpoint(_) => "checkpoint",
            PublishError::State(_) => "state",
            PublishError::Io(_) => "io",
            PublishError::BudgetExceeded { .. } => "budget_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = PublishError::BudgetExceeded { errors: 4, max: 3 };
        assert_eq!(err.kind(), "budget_exceeded");
        assert_eq!(
            err.to_string(),
            "error budget exceeded: 4 errors, at most 3 allowed"
        );

        let err: PublishError = DiscoveryError::NoMatch {
            pattern: "^x\\.seqchksum$".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "discovery");

        let err: PublishError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "io");
    }
}
