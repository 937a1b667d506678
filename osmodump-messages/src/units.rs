/// Frequency in Hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hertz(pub u32);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl Hertz {
    pub const fn as_hz(self) -> u32 {
        self.0
    }
}

/// Gain in tenths of a decibel, the unit tuner drivers report gains in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TenthsDb(pub i32);

impl std::fmt::Display for TenthsDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} dB", self.as_db())
    }
}

impl TenthsDb {
    /// Round a decibel value to the nearest tenth.
    pub fn from_db(db: f32) -> Self {
        Self((db * 10.0).round() as i32)
    }

    pub fn as_db(self) -> f32 {
        self.0 as f32 / 10.0
    }

    /// Convert to a linear amplitude ratio.
    /// For voltage/amplitude: linear = 10^(dB/20)
    pub fn to_linear(self) -> f32 {
        10.0_f32.powf(self.as_db() / 20.0)
    }

    pub const fn as_tenths(self) -> i32 {
        self.0
    }
}
