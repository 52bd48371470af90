//! The 2.14 fixed-point type used for normalized variation coordinates.

/// 16-bit signed fixed number with the low 14 bits of fraction (2.14).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct F2Dot14(i16);

impl F2Dot14 {
    /// Zero.
    pub const ZERO: Self = Self(0);
    /// One.
    pub const ONE: Self = Self(1 << 14);
    /// Negative one.
    pub const NEG_ONE: Self = Self(-(1 << 14));

    /// Creates a value from the raw bit representation.
    pub const fn from_bits(bits: i16) -> Self {
        Self(bits)
    }

    /// Returns the raw bit representation.
    pub const fn to_bits(self) -> i16 {
        self.0
    }

    /// Creates a value from an `f32`, rounding to the nearest representable value.
    pub fn from_f32(x: f32) -> Self {
        let scaled = (x * (1 << 14) as f32).round();
        Self(scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16)
    }

    /// Returns the value as an `f32`.
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / (1 << 14) as f32
    }

    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Debug for F2Dot14 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}

impl std::fmt::Display for F2Dot14 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}

crate::raw::newtype_scalar!(F2Dot14, [u8; 2]);
