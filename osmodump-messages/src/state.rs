use crate::{GainSetting, Hertz, TenthsDb, TransferMode};

/// Exit status used when the sink accepted fewer bytes than it was given
/// (`EX_IOERR` from sysexits.h).
pub const EXIT_SHORT_WRITE: i32 = 74;

/// Why an acquisition run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The device stream ended on its own.
    Completed,
    /// The cancel flag was raised.
    UserCancel,
    /// The device layer failed with this status code.
    IoError(i32),
    /// The sink did not accept a full transfer unit.
    ShortWrite,
}

impl StopReason {
    /// Whether this is an expected termination rather than a failure.
    pub fn is_graceful(self) -> bool {
        matches!(self, StopReason::Completed | StopReason::UserCancel)
    }

    /// Process exit status for this outcome.
    pub fn exit_code(self) -> i32 {
        match self {
            StopReason::Completed | StopReason::UserCancel => 0,
            StopReason::IoError(0) => 1,
            StopReason::IoError(status) => status.saturating_abs(),
            StopReason::ShortWrite => EXIT_SHORT_WRITE,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Completed => write!(f, "stream completed"),
            StopReason::UserCancel => write!(f, "user cancel"),
            StopReason::IoError(status) => write!(f, "library error {}", status),
            StopReason::ShortWrite => write!(f, "short write, samples lost"),
        }
    }
}

/// Lifecycle of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Stopped(StopReason),
}

impl AcquisitionState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: AcquisitionState) -> bool {
        use AcquisitionState::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Cancelling) | (Running, Stopped(_)) => true,
            (Cancelling, Stopped(_)) => true,
            // Runs that fail before streaming starts.
            (Idle, Stopped(_)) => true,
            _ => false,
        }
    }
}

/// Negotiated state of the engine, published once the device is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// Sample rate read back from the device
    pub sample_rate: Hertz,
    /// Center frequency as requested
    pub center_frequency: Hertz,
    /// Gain management mode
    pub gain: GainSetting,
    /// Bytes per transfer unit after range checking
    pub block_size: u32,
    /// Transfer mode for the run
    pub mode: TransferMode,
    /// Gains the tuner supports
    pub supported_gains: Vec<TenthsDb>,
    /// Sample rates the device supports
    pub supported_sample_rates: Vec<Hertz>,
    /// Number of parameters the device refused
    pub negotiation_warnings: usize,
}
