use crate::cancel::CancelFlag;
use crate::device::{Device, status};
use crate::sink::SinkWriter;
use flume::Sender;
use log::{debug, error, info, warn};
use osmodump_messages::{
    AcquisitionState, DEFAULT_ASYNC_BUF_NUMBER, Event, StopReason, TransferMode,
};

/// Current acquisition state, published to an observer on every change.
pub struct StateTracker {
    state: AcquisitionState,
    event_tx: Option<Sender<Event>>,
}

impl StateTracker {
    pub fn new(event_tx: Option<Sender<Event>>) -> Self {
        Self {
            state: AcquisitionState::Idle,
            event_tx,
        }
    }

    pub fn advance(&mut self, next: AcquisitionState) {
        if !self.state.can_transition_to(next) {
            warn!("ignoring state change {:?} -> {:?}", self.state, next);
            return;
        }
        debug!("acquisition state {:?} -> {:?}", self.state, next);
        self.state = next;
        if let Some(tx) = &self.event_tx {
            // The observer going away must not stop the stream.
            let _ = tx.send(Event::State(next));
        }
    }
}

/// Moves transfer units from a device to a sink until something stops it.
pub struct AcquisitionLoop<'a> {
    device: &'a mut dyn Device,
    sink: &'a mut SinkWriter,
    cancel: &'a CancelFlag,
    block_size: u32,
}

impl<'a> AcquisitionLoop<'a> {
    pub fn new(
        device: &'a mut dyn Device,
        sink: &'a mut SinkWriter,
        cancel: &'a CancelFlag,
        block_size: u32,
    ) -> Self {
        Self {
            device,
            sink,
            cancel,
            block_size,
        }
    }

    /// Stream in the given mode. The tracker must already be `Running`; it is
    /// left in `Running` or `Cancelling` and the caller records the stop.
    pub fn run(&mut self, mode: TransferMode, tracker: &mut StateTracker) -> StopReason {
        match mode {
            TransferMode::Sync => self.run_sync(tracker),
            TransferMode::Async => self.run_async(tracker),
        }
    }

    fn run_sync(&mut self, tracker: &mut StateTracker) -> StopReason {
        info!("Reading samples in sync mode...");
        let mut buffer = vec![0u8; self.block_size as usize];
        let mut units: u64 = 0;

        loop {
            if self.cancel.is_set() {
                tracker.advance(AcquisitionState::Cancelling);
                return StopReason::UserCancel;
            }

            let n_read = match self.device.read_sync(&mut buffer) {
                Ok(n) => n,
                Err(e) => {
                    if self.cancel.is_set() {
                        tracker.advance(AcquisitionState::Cancelling);
                        return StopReason::UserCancel;
                    }
                    error!("sync read failed: {}", e);
                    return StopReason::IoError(e.status());
                }
            };

            if self.sink.write_block(&buffer[..n_read]) != n_read {
                error!("Short write, samples lost, exiting!");
                return StopReason::ShortWrite;
            }

            // Whatever arrived is already written out; the run still ends.
            if n_read < buffer.len() {
                error!(
                    "Short read ({} of {} bytes) after {} transfers, samples lost, exiting!",
                    n_read,
                    buffer.len(),
                    units
                );
                return StopReason::IoError(status::IO);
            }
            units += 1;
        }
    }

    fn run_async(&mut self, tracker: &mut StateTracker) -> StopReason {
        info!("Reading samples in async mode...");
        let canceller = self.device.canceller();
        let sink = &mut *self.sink;
        let mut short_write = false;
        let mut units: u64 = 0;

        let mut on_unit = |buf: &[u8]| {
            // Units still draining after a self-cancel are dropped.
            if short_write {
                return;
            }
            if sink.write_block(buf) != buf.len() {
                error!("Short write, samples lost, exiting!");
                short_write = true;
                canceller.cancel();
                return;
            }
            units += 1;
        };

        let result = self
            .device
            .read_async(&mut on_unit, DEFAULT_ASYNC_BUF_NUMBER, self.block_size);
        debug!("async transfer returned after {} units", units);

        if short_write {
            tracker.advance(AcquisitionState::Cancelling);
            return StopReason::ShortWrite;
        }
        if self.cancel.is_set() {
            tracker.advance(AcquisitionState::Cancelling);
            return StopReason::UserCancel;
        }
        match result {
            Ok(()) => StopReason::Completed,
            Err(e) => {
                error!("async read failed: {}", e);
                StopReason::IoError(e.status())
            }
        }
    }
}
