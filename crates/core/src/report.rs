//! Error analytics over an accumulated log
//!
//! Everything here is a pure function of the log, so generating a report twice
//! without new operations in between yields the same result.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::accessibility::AUDIT_OPERATION;
use crate::config::ReportingThresholds;
use crate::log::ErrorLog;
use crate::model::{ErrorReport, Resolution};

/// Number of signatures listed in [`ErrorStatistics::common_errors`]
pub const TOP_ERRORS: usize = 5;

/// Operations whose names start with this count as captures
const CAPTURE_PREFIX: &str = "capture";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub recovered_errors: usize,
    pub failed_errors: usize,
    /// Percent of reports with a successful recovery, 0 for an empty log
    pub recovery_rate: f64,
    pub most_common_operation: Option<String>,
    /// Reports per UTC hour of day
    pub hourly_distribution: [u32; 24],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysisReport {
    pub summary: ErrorSummary,
    pub reports: Vec<ErrorReport>,
    pub recommendations: Vec<String>,
}

/// One `name: message` signature and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrequency {
    pub signature: String,
    pub count: usize,
}

/// Successful recoveries split by how they were reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryBreakdown {
    pub via_retry: usize,
    pub via_fallback: usize,
    /// Reports that tried to recover and did not
    pub unrecovered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub by_operation: BTreeMap<String, usize>,
    pub by_resolution: BTreeMap<Resolution, usize>,
    pub common_errors: Vec<ErrorFrequency>,
    pub recovery: RecoveryBreakdown,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn count_by_operation(reports: &[ErrorReport]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for report in reports {
        *counts.entry(report.context.operation.clone()).or_insert(0) += 1;
    }
    counts
}

/// Highest count wins; ties go to the alphabetically first operation
fn most_common(counts: &BTreeMap<String, usize>) -> Option<String> {
    counts
        .iter()
        .fold(None, |best: Option<(&String, usize)>, (op, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((op, count)),
        })
        .map(|(op, _)| op.clone())
}

pub fn summarize(log: &ErrorLog) -> ErrorSummary {
    let reports = log.reports();
    let recovered = reports.iter().filter(|r| r.recovery_successful).count();
    let failed = reports
        .iter()
        .filter(|r| r.resolution == Resolution::Fail)
        .count();

    let mut hourly_distribution = [0u32; 24];
    for report in reports {
        hourly_distribution[report.timestamp.hour() as usize] += 1;
    }

    ErrorSummary {
        total_errors: reports.len(),
        recovered_errors: recovered,
        failed_errors: failed,
        recovery_rate: percent(recovered, reports.len()),
        most_common_operation: most_common(&count_by_operation(reports)),
        hourly_distribution,
    }
}

fn recommendations(
    summary: &ErrorSummary,
    by_operation: &BTreeMap<String, usize>,
    thresholds: &ReportingThresholds,
) -> Vec<String> {
    let mut out = Vec::new();
    if summary.total_errors == 0 {
        return out;
    }

    if summary.recovery_rate < thresholds.min_recovery_rate {
        out.push(format!(
            "Recovery rate is {:.1}%: consider more retries or longer backoff delays",
            summary.recovery_rate
        ));
    }

    let capture_errors: usize = by_operation
        .iter()
        .filter(|(op, _)| op.starts_with(CAPTURE_PREFIX))
        .map(|(_, count)| count)
        .sum();
    if capture_errors > thresholds.capture_error_limit {
        out.push(format!(
            "{} screenshot capture errors: wait for network idle and disable animations before capturing",
            capture_errors
        ));
    }

    let audit_errors = by_operation.get(AUDIT_OPERATION).copied().unwrap_or(0);
    if audit_errors > thresholds.audit_error_limit {
        out.push(format!(
            "{} accessibility audit errors: check that the engine is injected before scanning",
            audit_errors
        ));
    }

    let failure_share = percent(summary.failed_errors, summary.total_errors);
    if failure_share > thresholds.max_failure_share {
        out.push(format!(
            "{:.1}% of errors ended in failure: add more fallback strategies",
            failure_share
        ));
    }

    out
}

/// Summary, the full ordered log and threshold-driven recommendations
pub fn analyze(log: &ErrorLog, thresholds: &ReportingThresholds) -> ErrorAnalysisReport {
    let summary = summarize(log);
    let by_operation = count_by_operation(log.reports());
    let recommendations = recommendations(&summary, &by_operation, thresholds);

    ErrorAnalysisReport {
        summary,
        reports: log.reports().to_vec(),
        recommendations,
    }
}

/// Counts per operation and resolution, plus the most frequent signatures
pub fn statistics(log: &ErrorLog) -> ErrorStatistics {
    let reports = log.reports();

    let mut by_resolution = BTreeMap::new();
    let mut signatures: BTreeMap<String, usize> = BTreeMap::new();
    let mut recovery = RecoveryBreakdown::default();

    for report in reports {
        *by_resolution.entry(report.resolution).or_insert(0) += 1;
        *signatures.entry(report.error.signature()).or_insert(0) += 1;

        match (report.recovery_successful, report.resolution) {
            (true, Resolution::Retry) => recovery.via_retry += 1,
            (true, _) => recovery.via_fallback += 1,
            (false, _) if report.recovery_attempted => recovery.unrecovered += 1,
            _ => {}
        }
    }

    let mut common_errors: Vec<ErrorFrequency> = signatures
        .into_iter()
        .map(|(signature, count)| ErrorFrequency { signature, count })
        .collect();
    // Stable sort keeps the map's alphabetical order among equal counts
    common_errors.sort_by(|a, b| b.count.cmp(&a.count));
    common_errors.truncate(TOP_ERRORS);

    ErrorStatistics {
        by_operation: count_by_operation(reports),
        by_resolution,
        common_errors,
        recovery,
    }
}
