//! Publish summary (summary.json)
//!
//! One document per `publish_all` call: what was attempted per category,
//! what moved, what failed, and whether the error budget ran out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use seqpub_catalog::Category;

use crate::config::EffectiveConfig;
use crate::error::PublishError;
use crate::sync::{BatchCounts, ErrorBudget};

/// Schema version for summary.json
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for summary.json
pub const SUMMARY_SCHEMA_ID: &str = "seqpub/publish_summary@1";

/// Overall outcome of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No errors
    Success,
    /// Some files or categories failed
    Partial,
    /// The error budget ran out and remaining work was skipped
    Aborted,
}

impl Status {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Partial | Status::Aborted => 1,
        }
    }
}

/// Outcome of one category call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: Category,

    /// Owning product; `None` for run-level categories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,

    #[serde(flatten)]
    pub counts: BatchCounts,

    /// The call was not made because the error budget was exhausted
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,

    /// Failure that ended the call early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Machine-readable kind of `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl CategoryReport {
    pub fn completed(category: Category, product: Option<String>, counts: BatchCounts) -> Self {
        Self {
            category,
            product,
            counts,
            skipped: false,
            error: None,
            error_kind: None,
        }
    }

    /// A call that failed and was charged as one error.
    pub fn failed(category: Category, product: Option<String>, error: &PublishError) -> Self {
        Self {
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            ..Self::completed(category, product, BatchCounts::failed())
        }
    }

    /// A call never made; `reason` is why.
    pub fn skipped(category: Category, product: Option<String>, reason: &PublishError) -> Self {
        Self {
            skipped: true,
            error: Some(reason.to_string()),
            error_kind: Some(reason.kind().to_string()),
            ..Self::completed(category, product, BatchCounts::default())
        }
    }
}

/// Publish summary (summary.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSummary {
    pub schema_version: u32,

    pub schema_id: String,

    /// Unique id of this publish (ULID)
    pub run_id: String,

    /// Sequencing run identifier
    pub id_run: u64,

    pub created_at: DateTime<Utc>,

    pub source_directory: PathBuf,

    pub destination_collection: String,

    pub status: Status,

    pub totals: BatchCounts,

    pub categories: Vec<CategoryReport>,

    /// Errors counted against the budget, including category failures
    pub budget_errors: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_errors: Option<usize>,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    pub human_summary: String,

    /// Merged configuration and the sources it came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_config: Option<EffectiveConfig>,
}

impl PublishSummary {
    pub fn new(
        id_run: u64,
        source_directory: PathBuf,
        destination_collection: String,
        categories: Vec<CategoryReport>,
        budget: &ErrorBudget,
        duration_ms: u64,
    ) -> Self {
        let totals = categories
            .iter()
            .fold(BatchCounts::default(), |acc, r| acc + r.counts);

        let status = if budget.is_exceeded() {
            Status::Aborted
        } else if totals.errors > 0 {
            Status::Partial
        } else {
            Status::Success
        };

        let skipped = categories.iter().filter(|r| r.skipped).count();
        let human_summary = Self::generate_human_summary(status, &totals, skipped);

        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            run_id: ulid::Ulid::new().to_string(),
            id_run,
            created_at: Utc::now(),
            source_directory,
            destination_collection,
            status,
            totals,
            categories,
            budget_errors: budget.errors(),
            max_errors: budget.max(),
            duration_ms,
            human_summary,
            effective_config: None,
        }
    }

    /// Attach the configuration this run was published with.
    pub fn with_effective_config(mut self, config: EffectiveConfig) -> Self {
        self.effective_config = Some(config);
        self
    }

    fn generate_human_summary(status: Status, totals: &BatchCounts, skipped: usize) -> String {
        match status {
            Status::Success => format!(
                "Publish succeeded: {} file(s) considered, {} transferred",
                totals.considered, totals.published
            ),
            Status::Partial => format!(
                "Publish finished with errors: {} considered, {} transferred, {} error(s)",
                totals.considered, totals.published, totals.errors
            ),
            Status::Aborted => format!(
                "Publish aborted: error budget exceeded after {} error(s), {} category call(s) skipped",
                totals.errors, skipped
            ),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(category: Category, counts: BatchCounts) -> CategoryReport {
        CategoryReport::completed(category, Some("sample1".to_string()), counts)
    }

    #[test]
    fn test_success_summary() {
        let reports = vec![
            report(Category::Alignment, BatchCounts::new(1, 1, 0)),
            report(Category::Index, BatchCounts::new(1, 1, 0)),
        ];
        let summary = PublishSummary::new(
            12345,
            PathBuf::from("/runs/12345"),
            "/seq/12345".to_string(),
            reports,
            &ErrorBudget::new(None),
            42,
        );

        assert_eq!(summary.status, Status::Success);
        assert_eq!(summary.totals, BatchCounts::new(2, 2, 0));
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.run_id.len(), 26);
        assert!(summary.human_summary.contains("2 transferred"));
    }

    #[test]
    fn test_aborted_summary() {
        let mut budget = ErrorBudget::new(Some(0));
        budget.record();
        let skipped = CategoryReport::skipped(
            Category::Qc,
            Some("sample1".to_string()),
            &budget.check().unwrap_err(),
        );

        let summary = PublishSummary::new(
            1,
            PathBuf::from("/runs/1"),
            "/seq/1".to_string(),
            vec![report(Category::Alignment, BatchCounts::failed()), skipped],
            &budget,
            5,
        );

        assert_eq!(summary.status, Status::Aborted);
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.human_summary.contains("1 category call(s) skipped"));
        assert_eq!(summary.categories[1].error_kind.as_deref(), Some("budget_exceeded"));
    }

    #[test]
    fn test_json_shape() {
        let summary = PublishSummary::new(
            1,
            PathBuf::from("/runs/1"),
            "/seq/1".to_string(),
            vec![report(Category::Alignment, BatchCounts::new(1, 0, 1))],
            &ErrorBudget::new(Some(3)),
            5,
        );
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();

        assert_eq!(value["schema_id"], SUMMARY_SCHEMA_ID);
        assert_eq!(value["status"], "partial");
        assert_eq!(value["categories"][0]["category"], "alignment");
        assert_eq!(value["categories"][0]["errors"], 1);
        assert!(value["categories"][0].get("skipped").is_none());
        assert_eq!(value["max_errors"], 3);

        assert!(value.get("effective_config").is_none());

        let back = PublishSummary::from_json(&summary.to_json().unwrap()).unwrap();
        assert_eq!(back.categories, summary.categories);
    }

    #[test]
    fn test_effective_config_carried_into_json() {
        let overrides = serde_json::json!({"id_run": 1, "source_directory": "/runs/1"});
        let effective = EffectiveConfig::build(None, Some(overrides)).unwrap();
        let failure = PublishError::BudgetExceeded { errors: 2, max: 1 };

        let summary = PublishSummary::new(
            1,
            PathBuf::from("/runs/1"),
            "/seq/1".to_string(),
            vec![CategoryReport::failed(Category::Xml, None, &failure)],
            &ErrorBudget::new(None),
            5,
        )
        .with_effective_config(effective);
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();

        assert_eq!(value["categories"][0]["error_kind"], "budget_exceeded");
        let sources = value["effective_config"]["sources"].as_array().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0]["origin"], "builtin");
        assert_eq!(sources[1]["origin"], "cli");
        assert_eq!(value["effective_config"]["config"]["id_run"], 1);
    }
}
