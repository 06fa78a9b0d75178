use tracing::debug;
use visex_core::{TrialRecord, TrialState};

/// Trial state plus the timestamp of the last state entry.
///
/// Transitions are requested with [`enter`](Self::enter), which only reports
/// `true` the first time a given state is entered; a sequencer that calls it on
/// every tick runs its entry actions once per occupancy.
#[derive(Debug, Default)]
pub struct ConditionStateMachine {
    state: TrialState,
    entered_ms: f64,
    trial: usize,
    open: Option<TrialRecord>,
    records: Vec<TrialRecord>,
}

impl ConditionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn entered_ms(&self) -> f64 {
        self.entered_ms
    }

    /// Time spent in the current state, never negative.
    pub fn hold_ms(&self, now_ms: f64) -> f64 {
        (now_ms - self.entered_ms).max(0.0)
    }

    /// Number of trials started
    pub fn trials(&self) -> usize {
        self.trial
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn last_record(&self) -> Option<&TrialRecord> {
        self.records.last()
    }

    /// Moves to `next`. Returns `false` without touching the hold timer if the
    /// machine is already in `next`.
    pub fn enter(&mut self, next: TrialState, now_ms: f64, condition: Option<usize>) -> bool {
        if self.state == next {
            return false;
        }
        debug!("{:?} -> {:?} at {:.3} ms", self.state, next, now_ms);
        match next {
            TrialState::PreIci => {
                self.trial += 1;
                self.open = Some(TrialRecord {
                    trial: self.trial,
                    condition,
                    start_ms: now_ms,
                    onset_ms: None,
                    offset_ms: None,
                    end_ms: now_ms,
                });
            }
            TrialState::Cond => {
                if let Some(r) = self.open.as_mut() {
                    r.onset_ms = Some(now_ms);
                    r.condition = condition;
                }
            }
            TrialState::SufIci => {
                if let Some(r) = self.open.as_mut() {
                    r.offset_ms = Some(now_ms);
                }
            }
            TrialState::None => {
                if let Some(mut r) = self.open.take() {
                    r.end_ms = now_ms;
                    self.records.push(r);
                }
            }
        }
        self.state = next;
        self.entered_ms = now_ms;
        true
    }

    /// Back to NONE, discarding an unfinished trial.
    pub fn reset(&mut self, now_ms: f64) {
        self.state = TrialState::None;
        self.entered_ms = now_ms;
        self.open = None;
    }
}
