//! Name Identifiers

use core::fmt;

/// Identifier for a string in the `name` table.
///
/// Layout features reference font-specific names, in the range `256..=32767`,
/// from their feature parameter tables.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct NameId(u16);

impl NameId {
    /// The first identifier available for font-specific names.
    pub const LAST_RESERVED_NAME_ID: Self = Self(255);

    /// Create a new identifier from a raw u16 value.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw u16 value.
    pub const fn to_u16(self) -> u16 {
        self.0
    }

    /// `true` if this id is in the range reserved for font-specific names.
    pub const fn is_font_specific(self) -> bool {
        self.0 > Self::LAST_RESERVED_NAME_ID.0 && self.0 < 32768
    }
}

impl From<u16> for NameId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Debug for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameId({})", self.0)
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

crate::raw::newtype_scalar!(NameId, [u8; 2]);
