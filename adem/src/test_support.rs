//! Test-only runners that never spawn processes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::types::ExecutionOutcome;
use crate::io::runner::{ComputeRequest, ComputeRunner};

/// Runner returning a fixed outcome and recording how it was called.
#[derive(Debug)]
pub struct RecordingRunner {
    outcome: ExecutionOutcome,
    calls: AtomicUsize,
    last_request: Mutex<Option<ComputeRequest>>,
}

impl RecordingRunner {
    pub fn new(outcome: ExecutionOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Runner whose computation prints `stdout` and exits 0 after 1ms.
    pub fn completed(stdout: &str) -> Self {
        Self::new(ExecutionOutcome::Completed {
            stdout: stdout.as_bytes().to_vec(),
            elapsed: Duration::from_millis(1),
        })
    }

    /// Number of times `run` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ComputeRequest> {
        self.last_request
            .lock()
            .expect("last_request lock poisoned")
            .clone()
    }
}

impl ComputeRunner for RecordingRunner {
    fn run(&self, request: &ComputeRequest) -> ExecutionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_request
            .lock()
            .expect("last_request lock poisoned") = Some(request.clone());
        self.outcome.clone()
    }
}

/// Runner that blocks every call until [`GatedRunner::open`] is called.
///
/// Tracks how many calls are running at once so tests can check a concurrency cap.
#[derive(Debug)]
pub struct GatedRunner {
    outcome: ExecutionOutcome,
    gate: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    started: usize,
    in_flight: usize,
    peak: usize,
}

impl GatedRunner {
    pub fn new(outcome: ExecutionOutcome) -> Self {
        Self {
            outcome,
            gate: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.gate.lock().expect("gate lock poisoned")
    }

    /// Let every blocked and future call finish.
    pub fn open(&self) {
        self.state().open = true;
        self.changed.notify_all();
    }

    /// Number of calls that have entered `run`.
    pub fn started(&self) -> usize {
        self.state().started
    }

    /// Most calls observed inside `run` at the same time.
    pub fn peak(&self) -> usize {
        self.state().peak
    }

    /// Block until at least `n` calls have started. Returns `false` on timeout.
    pub fn wait_for_started(&self, n: usize, timeout: Duration) -> bool {
        let (state, _) = self
            .changed
            .wait_timeout_while(self.state(), timeout, |state| state.started < n)
            .expect("gate lock poisoned");
        state.started >= n
    }
}

impl ComputeRunner for GatedRunner {
    fn run(&self, _request: &ComputeRequest) -> ExecutionOutcome {
        let mut state = self.state();
        state.started += 1;
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
        self.changed.notify_all();

        let mut state = self
            .changed
            .wait_while(state, |state| !state.open)
            .expect("gate lock poisoned");
        state.in_flight -= 1;
        self.outcome.clone()
    }
}
