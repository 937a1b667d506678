mod acquisition;
mod cancel;
pub mod device;
mod negotiate;
mod sink;

pub use acquisition::{AcquisitionLoop, StateTracker};
pub use cancel::{CancelContext, CancelFlag};
pub use negotiate::{NegotiatedParams, NegotiationWarning, negotiate};
pub use sink::SinkWriter;

use anyhow::Result;
use device::{Device, status};
use flume::Sender;
use log::{debug, error, info, warn};
use osmodump_messages::{
    AcquisitionConfig, AcquisitionState, EngineState, Event, Hertz, MAXIMAL_BUF_LENGTH,
    MINIMAL_BUF_LENGTH, StopReason, TenthsDb,
};

/// The acquisition engine.
/// Owns the open device for one run and streams it to the configured sink.
pub struct Engine {
    device: Box<dyn Device>,
    config: AcquisitionConfig,
    cancel: CancelFlag,
    event_tx: Sender<Event>,
}

impl Engine {
    /// Create a new Engine instance around an already opened device.
    pub fn new(
        device: Box<dyn Device>,
        config: AcquisitionConfig,
        cancel: CancelFlag,
        event_tx: Sender<Event>,
    ) -> Self {
        debug!("Constructing a new engine");
        Self {
            device,
            config,
            cancel,
            event_tx,
        }
    }

    /// Handle for stopping this engine from a signal handler or another thread.
    pub fn cancel_context(&self) -> CancelContext {
        CancelContext::new(self.cancel.clone(), self.device.canceller())
    }

    /// Run the engine (blocking), writing to the configured output.
    ///
    /// Fails only if the output cannot be opened, after publishing a stopped
    /// state; every outcome of the stream itself is reported as a
    /// [`StopReason`]. The device is closed on every path.
    pub fn run(mut self) -> Result<StopReason> {
        self.configure();
        let sink = match SinkWriter::open(&self.config.output) {
            Ok(sink) => sink,
            Err(e) => {
                self.device.close();
                StateTracker::new(Some(self.event_tx.clone()))
                    .advance(AcquisitionState::Stopped(StopReason::IoError(status::IO)));
                return Err(e);
            }
        };
        Ok(self.stream(sink))
    }

    /// Run the engine (blocking) against a caller-supplied sink instead of
    /// the configured output.
    pub fn run_with_sink(mut self, sink: SinkWriter) -> StopReason {
        self.configure();
        self.stream(sink)
    }

    /// Print what the device supports, apply the requested parameters and
    /// publish the negotiated state.
    fn configure(&mut self) {
        let device_config = self.config.device;
        if !device_config.block_size_in_range() {
            warn!(
                "Output block size {} out of range, falling back to default {} (min {}, max {})",
                device_config.block_size,
                device_config.effective_block_size(),
                MINIMAL_BUF_LENGTH,
                MAXIMAL_BUF_LENGTH
            );
        }

        let gains = self.device.gains();
        info!(
            "Supported gain values ({}): {}",
            gains.len(),
            gains
                .iter()
                .map(|g| format!("{:.1}", *g as f32 / 10.0))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let rates = self.device.sample_rates();
        info!(
            "Supported sample rates ({}): {}",
            rates.len(),
            rates
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );

        match self.device.usb_strings() {
            Ok(strings) => info!("{}", strings),
            Err(e) => warn!("Failed to read usb strings: {}", e),
        }

        let negotiated = negotiate(self.device.as_mut(), &device_config);

        let state = EngineState {
            sample_rate: negotiated.sample_rate,
            center_frequency: negotiated.center_frequency,
            gain: negotiated.gain,
            block_size: device_config.effective_block_size(),
            mode: self.config.mode,
            supported_gains: gains.into_iter().map(TenthsDb).collect(),
            supported_sample_rates: rates.into_iter().map(Hertz).collect(),
            negotiation_warnings: negotiated.warnings.len(),
        };
        // A missing observer is not a reason to stop.
        let _ = self.event_tx.send(Event::StateSnapshot(state));
    }

    fn stream(mut self, mut sink: SinkWriter) -> StopReason {
        let mut tracker = StateTracker::new(Some(self.event_tx.clone()));

        // Mandatory before the first read, but not fatal.
        if let Err(e) = self.device.reset_buffer() {
            warn!("Failed to reset buffers: {}", e);
        }
        tracker.advance(AcquisitionState::Running);

        let block_size = self.config.device.effective_block_size();
        let mut reason =
            AcquisitionLoop::new(self.device.as_mut(), &mut sink, &self.cancel, block_size)
                .run(self.config.mode, &mut tracker);

        let written = sink.bytes_written();
        let to_stdout = sink.is_stdout();
        if let Err(e) = sink.close() {
            error!("Failed to flush output: {}", e);
            if reason.is_graceful() {
                reason = StopReason::ShortWrite;
            }
        }
        self.device.close();

        if reason == StopReason::UserCancel {
            info!("User cancel, exiting...");
        } else {
            error!("{}, exiting...", reason);
        }
        debug!(
            "{} bytes written to {}",
            written,
            if to_stdout { "stdout" } else { "file" }
        );

        tracker.advance(AcquisitionState::Stopped(reason));
        reason
    }
}
