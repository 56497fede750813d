use crate::prelude::{StageError, StageResult};
use serde::Serialize;

/// Progress of one pipeline run.
///
/// Variants are declared in execution order; `Written` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    Loaded,
    Averaged,
    Smoothed,
    RatesComputed,
    Saturated,
    Written,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Written | PipelineState::Failed)
    }

    /// Moves forward to `next`. Staying put is allowed: both rate estimators
    /// reach `RatesComputed`.
    pub fn advance(self, next: PipelineState) -> StageResult<PipelineState> {
        if self.is_terminal() {
            return Err(StageError::Internal(format!(
                "pipeline already {:?}, cannot move to {:?}",
                self, next
            )));
        }
        if next < self {
            return Err(StageError::Internal(format!(
                "backward transition {:?} -> {:?}",
                self, next
            )));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use PipelineState::*;

    #[rstest(from, to,
             case(Loaded, Averaged),
             case(Averaged, Smoothed),
             case(Smoothed, RatesComputed),
             case(RatesComputed, RatesComputed),
             case(RatesComputed, Saturated),
             case(Saturated, Written),
             case(Loaded, Failed),
             case(Saturated, Failed),
    )]
    fn forward_transitions_are_accepted(from: PipelineState, to: PipelineState) {
        assert_eq!(from.advance(to).unwrap(), to);
    }

    #[rstest(from, to,
             case(Smoothed, Averaged),
             case(Saturated, Loaded),
             case(Written, Failed),
             case(Failed, Written),
             case(Failed, Failed),
    )]
    fn backward_or_terminal_transitions_are_rejected(from: PipelineState, to: PipelineState) {
        assert!(matches!(from.advance(to), Err(StageError::Internal(_))));
    }
}
