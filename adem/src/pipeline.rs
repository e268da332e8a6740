//! Query pipeline: validate, compute, classify.

use tracing::{error, info, warn};

use crate::core::classifier::classify;
use crate::core::types::{ExecutionOutcome, ResultPayload};
use crate::core::validate::accept_query;
use crate::io::config::ComputeConfig;
use crate::io::runner::{ComputeRequest, ComputeRunner};

/// Run `query` through the whole pipeline and return the payload to render.
///
/// Rejected queries never reach `runner`. Every outcome of the runner is
/// classified; nothing here fails.
pub fn run_query<R: ComputeRunner + ?Sized>(
    runner: &R,
    config: &ComputeConfig,
    query: &str,
    time: &str,
) -> ResultPayload {
    if let Some(rejected) = reject_malformed(config, query, time) {
        return rejected;
    }

    let request = config.request(query);
    let outcome = runner.run(&request);
    log_outcome(&outcome, &request);
    classify(&outcome, query, time)
}

/// Payload for `query` if it must not reach a runner, `None` if it may.
///
/// Lets callers turn malformed queries away before queueing for a compute slot.
pub fn reject_malformed(config: &ComputeConfig, query: &str, time: &str) -> Option<ResultPayload> {
    if accept_query(query, config.max_query_bytes) {
        return None;
    }
    info!(query_bytes = query.len(), "rejected malformed query");
    Some(ResultPayload::rejected(time))
}

fn log_outcome(outcome: &ExecutionOutcome, request: &ComputeRequest) {
    match outcome {
        ExecutionOutcome::Completed { elapsed, .. } => {
            info!(
                query = %request.query,
                elapsed_ms = elapsed.as_millis() as u64,
                "query completed"
            );
        }
        ExecutionOutcome::TimedOut { elapsed } => {
            warn!(
                query = %request.query,
                timeout_secs = request.budget.as_secs(),
                elapsed_ms = elapsed.as_millis() as u64,
                "query exceeded time budget"
            );
        }
        ExecutionOutcome::NonZeroExit { code, stderr } => {
            let stderr = String::from_utf8_lossy(stderr);
            warn!(
                query = %request.query,
                exit_code = ?code,
                stderr = %stderr.trim_end(),
                "computation exited nonzero, reporting suspected overflow"
            );
        }
        ExecutionOutcome::StartFailed { cause } | ExecutionOutcome::OutputReadFailed { cause } => {
            error!(
                query = %request.query,
                workdir = %request.workdir.display(),
                outcome = outcome.label(),
                cause = %cause,
                "computation backend failed"
            );
        }
    }
}
