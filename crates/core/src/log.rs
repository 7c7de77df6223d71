//! Append-only error log owned by one handler

use serde::{Deserialize, Serialize};

use crate::model::ErrorReport;

/// Ordered list of error reports for one worker.
///
/// Entries are only ever appended during a run. Logs from several workers are
/// combined once all of them have finished with [`ErrorLog::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorLog {
    reports: Vec<ErrorReport>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, report: ErrorReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[ErrorReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn last(&self) -> Option<&ErrorReport> {
        self.reports.last()
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }

    pub fn into_reports(self) -> Vec<ErrorReport> {
        self.reports
    }

    /// Reduce per-worker logs into one, ordered by report timestamp.
    /// Reports with equal timestamps keep their worker order.
    pub fn merge<I>(logs: I) -> Self
    where
        I: IntoIterator<Item = ErrorLog>,
    {
        let mut reports: Vec<ErrorReport> = logs.into_iter().flat_map(|l| l.reports).collect();
        reports.sort_by_key(|r| r.timestamp);
        Self { reports }
    }
}

impl From<Vec<ErrorReport>> for ErrorLog {
    fn from(reports: Vec<ErrorReport>) -> Self {
        Self { reports }
    }
}
