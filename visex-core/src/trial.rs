use serde::{Deserialize, Serialize};

/// Per-trial condition state. A trial cycles `None -> PreIci -> Cond -> SufIci -> None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrialState {
    #[default]
    None,
    PreIci,
    Cond,
    SufIci,
}

impl TrialState {
    /// The state that follows this one in the trial cycle.
    pub fn next(&self) -> Self {
        use TrialState::*;
        match self {
            None => PreIci,
            PreIci => Cond,
            Cond => SufIci,
            SufIci => None,
        }
    }

    /// True while the stimulus is on screen.
    pub fn is_stimulus(&self) -> bool {
        matches!(self, TrialState::Cond)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TrialState::None)
    }
}

/// Recorded timing of one completed trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    /// `None` for a blank trial
    pub condition: Option<usize>,
    pub start_ms: f64,
    pub onset_ms: Option<f64>,
    pub offset_ms: Option<f64>,
    pub end_ms: f64,
}

impl TrialRecord {
    /// Time the stimulus spent on screen, if it was shown at all.
    pub fn stimulus_duration_ms(&self) -> Option<f64> {
        match (self.onset_ms, self.offset_ms) {
            (Some(on), Some(off)) => Some(off - on),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_returns_to_none() {
        let mut s = TrialState::default();
        let mut seen = vec![s];
        for _ in 0..4 {
            s = s.next();
            seen.push(s);
        }
        assert_eq!(
            seen,
            vec![
                TrialState::None,
                TrialState::PreIci,
                TrialState::Cond,
                TrialState::SufIci,
                TrialState::None
            ]
        );
    }

    #[test]
    fn stimulus_duration_requires_both_edges() {
        let mut r = TrialRecord {
            trial: 0,
            condition: Some(2),
            start_ms: 0.0,
            onset_ms: Some(100.0),
            offset_ms: Some(350.0),
            end_ms: 400.0,
        };
        assert_eq!(r.stimulus_duration_ms(), Some(250.0));
        r.offset_ms = None;
        assert_eq!(r.stimulus_duration_ms(), None);
    }
}
