mod config;
mod event;
mod state;
mod units;

pub use config::{
    AcquisitionConfig, DEFAULT_ASYNC_BUF_NUMBER, DEFAULT_BUF_LENGTH, DEFAULT_CENTER_FREQUENCY,
    DEFAULT_SAMPLE_RATE, DeviceConfig, GainSetting, MAXIMAL_BUF_LENGTH, MINIMAL_BUF_LENGTH,
    OutputTarget, TransferMode,
};
pub use event::Event;
pub use state::{AcquisitionState, EXIT_SHORT_WRITE, EngineState, StopReason};
pub use units::{Hertz, TenthsDb};
