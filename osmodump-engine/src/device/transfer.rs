//! Async transfer queue shared by the simulated backends.
//!
//! A worker thread fills free buffers and hands them over a bounded channel;
//! the calling thread runs the user callback on each completed unit and
//! recycles the buffer. This mirrors a USB bulk-transfer ring with
//! `queue_depth` transfers in flight.

use super::{DeviceCanceller, DeviceError, status};
use flume::RecvTimeoutError;
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// How often blocked sides of the queue look at the cancel state.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Transfer {
    Filled(Vec<u8>, usize),
    Eof,
    Failed(DeviceError),
}

/// Run `fill` on a worker thread until cancelled, end of stream (`Ok(0)`), or
/// an error, delivering each filled unit to `callback` on the calling thread.
///
/// Returns `Ok(())` on cancellation or end of stream.
pub(crate) fn stream_units<F>(
    canceller: &DeviceCanceller,
    callback: &mut (dyn FnMut(&[u8]) + Send),
    queue_depth: u32,
    unit_size: u32,
    mut fill: F,
) -> Result<(), DeviceError>
where
    F: FnMut(&mut [u8]) -> Result<usize, DeviceError> + Send,
{
    if queue_depth == 0 || unit_size == 0 {
        return Err(DeviceError::io(
            status::INVALID_PARAM,
            format!("invalid transfer queue {} x {} bytes", queue_depth, unit_size),
        ));
    }

    let depth = queue_depth as usize;
    let (free_tx, free_rx) = flume::bounded::<Vec<u8>>(depth);
    let (done_tx, done_rx) = flume::bounded::<Transfer>(depth);
    for _ in 0..depth {
        // Cannot fail: the channel has room for every buffer and free_rx is alive.
        let _ = free_tx.send(vec![0u8; unit_size as usize]);
    }

    thread::scope(|scope| {
        let worker_cancel = canceller.clone();
        scope.spawn(move || {
            loop {
                let mut buf = match free_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(buf) => buf,
                    Err(RecvTimeoutError::Timeout) => {
                        if worker_cancel.is_cancelled() {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                if worker_cancel.is_cancelled() {
                    break;
                }
                let transfer = match fill(&mut buf) {
                    Ok(0) => Transfer::Eof,
                    Ok(n) => Transfer::Filled(buf, n),
                    Err(e) => Transfer::Failed(e),
                };
                let last = !matches!(transfer, Transfer::Filled(..));
                if done_tx.send(transfer).is_err() || last {
                    break;
                }
            }
            trace!("transfer worker exiting");
        });

        let mut delivered: u64 = 0;
        let result = loop {
            if canceller.is_cancelled() {
                break Ok(());
            }
            match done_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Transfer::Filled(buf, n)) => {
                    callback(&buf[..n]);
                    delivered += 1;
                    let _ = free_tx.send(buf);
                }
                Ok(Transfer::Eof) => {
                    debug!("end of stream after {} transfers", delivered);
                    break Ok(());
                }
                Ok(Transfer::Failed(e)) => break Err(e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Worker saw the cancel before we did.
                    break Ok(());
                }
            }
        };

        // Unblock the worker before the scope joins it.
        drop(done_rx);
        drop(free_tx);
        result
    })
}
