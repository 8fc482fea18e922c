//! Error budget and outcome counts

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

use crate::error::PublishError;

/// Cumulative failure counter with an optional ceiling.
///
/// The budget is exceeded once the count is strictly greater than the
/// maximum, so `max = N` tolerates N failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBudget {
    errors: usize,
    max: Option<usize>,
}

impl ErrorBudget {
    pub fn new(max: Option<usize>) -> Self {
        Self { errors: 0, max }
    }

    /// Count one failure and return the new total.
    pub fn record(&mut self) -> usize {
        self.errors += 1;
        self.errors
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn is_exceeded(&self) -> bool {
        self.max.is_some_and(|max| self.errors > max)
    }

    /// `BudgetExceeded` once the ceiling has been passed.
    pub fn check(&self) -> Result<(), PublishError> {
        match self.max {
            Some(max) if self.errors > max => Err(PublishError::BudgetExceeded {
                errors: self.errors,
                max,
            }),
            _ => Ok(()),
        }
    }
}

/// Counts returned by one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    /// Files handed to the call, attempted or not.
    pub considered: usize,
    /// Files whose content was transferred and reconciled.
    pub published: usize,
    /// Failures counted by the call.
    pub errors: usize,
}

impl BatchCounts {
    pub fn new(considered: usize, published: usize, errors: usize) -> Self {
        Self {
            considered,
            published,
            errors,
        }
    }

    /// A call that failed before doing any work.
    pub fn failed() -> Self {
        Self::new(0, 0, 1)
    }
}

impl Add for BatchCounts {
    type Output = BatchCounts;

    fn add(self, rhs: BatchCounts) -> BatchCounts {
        BatchCounts {
            considered: self.considered + rhs.considered,
            published: self.published + rhs.published,
            errors: self.errors + rhs.errors,
        }
    }
}

impl AddAssign for BatchCounts {
    fn add_assign(&mut self, rhs: BatchCounts) {
        *self = *self + rhs;
    }
}

impl From<BatchCounts> for (usize, usize, usize) {
    fn from(counts: BatchCounts) -> Self {
        (counts.considered, counts.published, counts.errors)
    }
}
