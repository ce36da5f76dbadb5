/// Lifecycle of a single concurrent fetch batch.
///
/// `Running` until the first failure, then `Cancelling` while the result
/// stream drains. `Succeeded` and `Failed` are terminal and only reached once
/// the stream has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPhase {
    #[default]
    Running,
    Cancelling,
    Succeeded,
    Failed,
}

impl BatchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchPhase::Succeeded | BatchPhase::Failed)
    }
}

/// What the consumer observed on the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEvent {
    ItemFetched,
    ItemFailed,
    StreamClosed,
}

/// What the consumer must do with the observed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    /// Keep the fetched item.
    Collect,
    /// Remember this error and raise the cancellation signal.
    Cancel,
    /// Drop the result; the batch already failed.
    Discard,
    /// The stream is closed; return the outcome for the new phase.
    Finish,
}

/// Pure transition function: applies an event to a phase and returns the next
/// phase with the action the consumer has to take.
pub fn advance(phase: BatchPhase, event: BatchEvent) -> (BatchPhase, BatchAction) {
    match (phase, event) {
        (BatchPhase::Running, BatchEvent::ItemFetched) => {
            (BatchPhase::Running, BatchAction::Collect)
        }
        (BatchPhase::Running, BatchEvent::ItemFailed) => {
            (BatchPhase::Cancelling, BatchAction::Cancel)
        }
        (BatchPhase::Running, BatchEvent::StreamClosed) => {
            (BatchPhase::Succeeded, BatchAction::Finish)
        }
        (BatchPhase::Cancelling, BatchEvent::StreamClosed) => {
            (BatchPhase::Failed, BatchAction::Finish)
        }
        (BatchPhase::Cancelling, _) => (BatchPhase::Cancelling, BatchAction::Discard),
        (terminal, BatchEvent::StreamClosed) => (terminal, BatchAction::Finish),
        (terminal, _) => (terminal, BatchAction::Discard),
    }
}
