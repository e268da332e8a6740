//! Shared types for the query pipeline.
//!
//! These types define the contracts between the runner, the classifier and the
//! renderer. They carry no I/O handles and are created fresh for every request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one external-computation invocation.
///
/// Produced once by a [`ComputeRunner`](crate::io::runner::ComputeRunner) and
/// consumed once by [`classify`](crate::core::classifier::classify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The process exited with status 0.
    Completed { stdout: Vec<u8>, elapsed: Duration },
    /// The time budget elapsed and the process was killed.
    TimedOut { elapsed: Duration },
    /// The process exited with a nonzero status or was terminated by a signal.
    ///
    /// `stderr` is kept for server-side diagnostics only.
    NonZeroExit { code: Option<i32>, stderr: Vec<u8> },
    /// The process could not be spawned.
    StartFailed { cause: String },
    /// The process started but its output or exit status could not be collected.
    OutputReadFailed { cause: String },
}

impl ExecutionOutcome {
    /// Short label used in structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed { .. } => "completed",
            ExecutionOutcome::TimedOut { .. } => "timed_out",
            ExecutionOutcome::NonZeroExit { .. } => "nonzero_exit",
            ExecutionOutcome::StartFailed { .. } => "start_failed",
            ExecutionOutcome::OutputReadFailed { .. } => "output_read_failed",
        }
    }
}

/// Rendering-ready data for a page.
///
/// Field names are what the templates see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultPayload {
    /// Query echoed back into the form input.
    pub query_input: String,
    /// Human-readable result lines.
    pub query_result: Vec<String>,
    /// Server build timestamp shown in the footer of every page.
    pub time: String,
}

impl ResultPayload {
    /// Payload for a page with no query content.
    pub fn page(time: &str) -> Self {
        Self {
            time: time.to_string(),
            ..Self::default()
        }
    }

    /// Payload for the query form pre-filled with `query`.
    pub fn form(time: &str, query: &str) -> Self {
        Self {
            query_input: query.to_string(),
            query_result: Vec::new(),
            time: time.to_string(),
        }
    }

    /// Payload for a query rejected before any process was started.
    pub fn rejected(time: &str) -> Self {
        Self {
            query_input: String::new(),
            query_result: vec![MALFORMED_QUERY.to_string()],
            time: time.to_string(),
        }
    }

    /// Payload for a query the server failed to run.
    pub fn backend_error(time: &str) -> Self {
        Self {
            query_input: String::new(),
            query_result: vec![BACKEND_ERROR.to_string()],
            time: time.to_string(),
        }
    }
}

/// Shown when a query fails validation.
pub const MALFORMED_QUERY: &str = "Wrong query form.";
/// Shown when the computation exits nonzero. The cause is a guess.
pub const OVERFLOW_SUSPECTED: &str = "Error: overflow?";
/// Shown when the time budget elapses.
pub const TIME_BUDGET_EXCEEDED: &str = "Error: computation exceeded time budget";
/// Shown for spawn or read failures.
pub const BACKEND_ERROR: &str = "An error occurred in the backend while computing the result.";

/// Build timestamp in the form shown in page footers, e.g. `Jan 2, 2006 15:04:05 UTC`.
pub fn format_build_time(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn build_time_matches_footer_format() {
        let at = Utc
            .with_ymd_and_hms(2006, 1, 2, 15, 4, 5)
            .single()
            .expect("valid date");
        assert_eq!(format_build_time(at), "Jan 2, 2006 15:04:05 UTC");
    }

    #[test]
    fn rejected_payload_has_only_the_malformed_message() {
        let payload = ResultPayload::rejected("t");
        assert_eq!(payload.query_input, "");
        assert_eq!(payload.query_result, vec![MALFORMED_QUERY]);
    }

    #[test]
    fn outcome_labels_are_snake_case() {
        let timeout = ExecutionOutcome::TimedOut {
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(timeout.label(), "timed_out");
    }
}
