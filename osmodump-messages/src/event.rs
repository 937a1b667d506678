use crate::{AcquisitionState, EngineState};

/// Events sent from the engine to whoever is watching the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Negotiated parameters, sent once before streaming starts.
    StateSnapshot(EngineState),
    /// The acquisition loop changed state.
    State(AcquisitionState),
}
