//! Aggregated load reporting
//!
//! The codec never aborts on the first problem: every issue found during a
//! load is collected into a [`LoadReport`] and the caller decides which
//! categories are fatal for its purpose. Unknown columns and tables are
//! warnings (the data is ignored); everything else is an error.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Severity of a load issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One problem found while loading a dataset
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadIssue {
    #[error("{class}: required column '{attribute}' is missing")]
    MissingRequiredColumn { class: String, attribute: String },

    #[error("{class}: unknown column '{column}'{}", .suggestion.as_deref().map(|s| format!(" (closest attribute: '{}')", s)).unwrap_or_default())]
    UnknownColumn {
        class: String,
        column: String,
        suggestion: Option<String>,
    },

    #[error("table '{name}' does not match any class")]
    UnknownTable { name: String },

    #[error("{class} row {row}, column '{column}': cannot parse '{text}': {reason}")]
    CellParse {
        class: String,
        /// 1-based row in the physical grid, header rows included
        row: usize,
        column: String,
        text: String,
        reason: String,
    },

    #[error("{class}: duplicate primary key '{key}' (rows {first_row} and {second_row})")]
    DuplicatePrimaryKey {
        class: String,
        key: String,
        first_row: usize,
        second_row: usize,
    },

    #[error("{class} '{instance}', attribute '{attribute}': no {target_class} with primary key '{missing_key}'")]
    UnresolvedReference {
        class: String,
        instance: String,
        attribute: String,
        target_class: String,
        missing_key: String,
    },
}

impl LoadIssue {
    pub fn severity(&self) -> Severity {
        match self {
            LoadIssue::UnknownColumn { .. } | LoadIssue::UnknownTable { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Every issue found during one load, in discovery order
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: LoadIssue) {
        self.issues.push(issue);
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.issues.extend(other.issues);
    }

    pub fn errors(&self) -> impl Iterator<Item = &LoadIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LoadIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Warning)
    }

    /// True when the load produced no error-severity issues. A dataset that
    /// loaded with errors must never be treated as valid, whatever the
    /// validator says about the graph itself.
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "no load issues");
        }
        for issue in &self.issues {
            let tag = match issue.severity() {
                Severity::Warning => "warning",
                Severity::Error => "error",
            };
            writeln!(f, "[{}] {}", tag, issue)?;
        }
        Ok(())
    }
}
