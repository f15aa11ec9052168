//! Entry point stages and the transitions between them

use crate::error::EntryPointError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    PreProcessing,
    /// Protocol activated, polling for a card
    WaitingForTag,
    Selection,
    KernelProcessing,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    StartPreProcessing,
    ActivateProtocol,
    TagDetected,
    ActivateKernel,
    SelectNext,
    AwaitTag,
    End,
    /// Re-initialization
    Reset,
}

impl State {
    /// Target state of `transition`, or an illegal-state error
    pub fn next(self, transition: Transition) -> Result<State, EntryPointError> {
        use State::*;
        use Transition::*;

        let next = match (self, transition) {
            (Idle, StartPreProcessing) => PreProcessing,
            (PreProcessing, ActivateProtocol) => WaitingForTag,
            (PreProcessing, End) => Ended,
            (WaitingForTag, TagDetected) => Selection,
            (Selection, ActivateKernel) => KernelProcessing,
            (Selection, AwaitTag) => WaitingForTag,
            (Selection, End) => Ended,
            (KernelProcessing, SelectNext) => Selection,
            (KernelProcessing, AwaitTag) => WaitingForTag,
            (KernelProcessing, End) => Ended,
            (Idle | WaitingForTag | Ended, Reset) => Idle,
            (state, transition) => return Err(EntryPointError::IllegalState { state, transition }),
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = State::Idle
            .next(Transition::StartPreProcessing)
            .and_then(|s| s.next(Transition::ActivateProtocol))
            .and_then(|s| s.next(Transition::TagDetected))
            .and_then(|s| s.next(Transition::ActivateKernel))
            .and_then(|s| s.next(Transition::SelectNext))
            .and_then(|s| s.next(Transition::ActivateKernel))
            .and_then(|s| s.next(Transition::End))
            .unwrap();
        assert_eq!(s, State::Ended);
        assert_eq!(s.next(Transition::Reset), Ok(State::Idle));
    }

    #[test]
    fn test_illegal_transitions() {
        assert_eq!(
            State::WaitingForTag.next(Transition::StartPreProcessing),
            Err(EntryPointError::IllegalState {
                state: State::WaitingForTag,
                transition: Transition::StartPreProcessing,
            })
        );
        assert!(State::Idle.next(Transition::TagDetected).is_err());
        assert!(State::Selection.next(Transition::Reset).is_err());
        assert!(State::KernelProcessing.next(Transition::TagDetected).is_err());
        assert!(State::Ended.next(Transition::AwaitTag).is_err());
    }

    #[test]
    fn test_total_over_state_space() {
        let states = [
            State::Idle,
            State::PreProcessing,
            State::WaitingForTag,
            State::Selection,
            State::KernelProcessing,
            State::Ended,
        ];
        let transitions = [
            Transition::StartPreProcessing,
            Transition::ActivateProtocol,
            Transition::TagDetected,
            Transition::ActivateKernel,
            Transition::SelectNext,
            Transition::AwaitTag,
            Transition::End,
            Transition::Reset,
        ];

        let allowed: usize = states
            .iter()
            .flat_map(|s| transitions.iter().map(move |t| s.next(*t)))
            .filter(Result::is_ok)
            .count();
        assert_eq!(allowed, 13);
    }
}
