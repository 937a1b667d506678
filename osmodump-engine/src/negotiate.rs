//! Apply requested receiver parameters and report what the hardware accepted.
//!
//! Fields are applied in a fixed order: sample rate, center frequency, gain.
//! A refused field is reported and skipped; negotiation always runs to the
//! end, since a partially configured radio still streams.

use crate::device::{Device, DeviceError};
use log::{info, warn};
use osmodump_messages::{DeviceConfig, GainSetting, Hertz};
use thiserror::Error;

/// A parameter the device refused.
#[derive(Debug, Error)]
pub enum NegotiationWarning {
    #[error("failed to set sample rate: {0}")]
    SampleRate(#[source] DeviceError),

    #[error("failed to set center freq: {0}")]
    CenterFrequency(#[source] DeviceError),

    #[error("failed to enable automatic gain: {0}")]
    AutoGain(#[source] DeviceError),

    #[error("failed to enable manual gain: {0}")]
    ManualGainMode(#[source] DeviceError),

    #[error("failed to set tuner gain: {0}")]
    Gain(#[source] DeviceError),
}

/// Outcome of applying a [`DeviceConfig`].
#[derive(Debug)]
pub struct NegotiatedParams {
    /// Rate read back from the device, whether or not the request was accepted.
    pub sample_rate: Hertz,
    /// Frequency as requested. There is no read-back for it.
    pub center_frequency: Hertz,
    /// Gain mode that was requested.
    pub gain: GainSetting,
    pub warnings: Vec<NegotiationWarning>,
}

impl NegotiatedParams {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

fn record(warnings: &mut Vec<NegotiationWarning>, warning: NegotiationWarning) {
    warn!("{}", warning);
    warnings.push(warning);
}

/// Push `config` to `device` and read back what stuck.
pub fn negotiate(device: &mut dyn Device, config: &DeviceConfig) -> NegotiatedParams {
    let mut warnings = Vec::new();

    match device.set_sample_rate(config.sample_rate.as_hz()) {
        Ok(_) => info!("Sample rate is set to {}.", Hertz(device.sample_rate())),
        Err(e) => record(&mut warnings, NegotiationWarning::SampleRate(e)),
    }
    // A refused request leaves the previous rate in effect.
    let sample_rate = Hertz(device.sample_rate());

    match device.set_center_frequency(config.center_frequency.as_hz()) {
        Ok(()) => info!("Tuned to {}.", config.center_frequency),
        Err(e) => record(&mut warnings, NegotiationWarning::CenterFrequency(e)),
    }

    let gain = config.gain_setting();
    match gain {
        GainSetting::Auto => {
            if let Err(e) = device.set_gain_mode(true) {
                record(&mut warnings, NegotiationWarning::AutoGain(e));
            }
        }
        GainSetting::Manual(value) => {
            if let Err(e) = device.set_gain_mode(false) {
                record(&mut warnings, NegotiationWarning::ManualGainMode(e));
            }
            match device.set_gain(value.as_tenths()) {
                Ok(()) => info!("Tuner gain set to {}.", value),
                Err(e) => record(&mut warnings, NegotiationWarning::Gain(e)),
            }
        }
    }

    NegotiatedParams {
        sample_rate,
        center_frequency: config.center_frequency,
        gain,
        warnings,
    }
}
