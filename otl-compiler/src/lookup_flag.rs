//! The lookup flag type.
//!
//! This is kind-of-but-not-quite-exactly a bit enumeration (the high byte is
//! a class number) and so we implement it manually.

use crate::write::{FontWrite, TableWriter};

/// The [LookupFlag](https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#lookupFlag) word.
///
/// The `USE_MARK_FILTERING_SET` bit is not set by callers; it is derived
/// from whether the lookup has a mark filtering set when the lookup is
/// written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LookupFlag(u16);

impl LookupFlag {
    pub const RIGHT_TO_LEFT: u16 = 0x0001;
    pub const IGNORE_BASE_GLYPHS: u16 = 0x0002;
    pub const IGNORE_LIGATURES: u16 = 0x0004;
    pub const IGNORE_MARKS: u16 = 0x0008;
    pub const USE_MARK_FILTERING_SET: u16 = 0x0010;

    /// Return new, empty flags
    pub fn empty() -> Self {
        Self(0)
    }

    /// Construct a LookupFlag from a raw value, discarding reserved bits
    pub fn from_bits_truncate(bits: u16) -> Self {
        const VALID_BITS: u16 = !0x00E0;
        Self(bits & VALID_BITS)
    }

    /// Raw transmutation to u16.
    pub fn to_bits(self) -> u16 {
        self.0
    }

    /// Only meaningful for cursive attachment: the last glyph of a cursive
    /// sequence is positioned on the baseline.
    pub fn right_to_left(self) -> bool {
        (self.0 & Self::RIGHT_TO_LEFT) != 0
    }

    pub fn with_right_to_left(self, val: bool) -> Self {
        self.with_bit(Self::RIGHT_TO_LEFT, val)
    }

    pub fn ignore_base_glyphs(self) -> bool {
        (self.0 & Self::IGNORE_BASE_GLYPHS) != 0
    }

    pub fn with_ignore_base_glyphs(self, val: bool) -> Self {
        self.with_bit(Self::IGNORE_BASE_GLYPHS, val)
    }

    pub fn ignore_ligatures(self) -> bool {
        (self.0 & Self::IGNORE_LIGATURES) != 0
    }

    pub fn with_ignore_ligatures(self, val: bool) -> Self {
        self.with_bit(Self::IGNORE_LIGATURES, val)
    }

    pub fn ignore_marks(self) -> bool {
        (self.0 & Self::IGNORE_MARKS) != 0
    }

    pub fn with_ignore_marks(self, val: bool) -> Self {
        self.with_bit(Self::IGNORE_MARKS, val)
    }

    /// If set, the lookup table is followed by a MarkFilteringSet field.
    pub fn use_mark_filtering_set(self) -> bool {
        (self.0 & Self::USE_MARK_FILTERING_SET) != 0
    }

    pub(crate) fn with_use_mark_filtering_set(self, val: bool) -> Self {
        self.with_bit(Self::USE_MARK_FILTERING_SET, val)
    }

    /// If not zero, skips over all marks of attachment type different from specified.
    pub fn mark_attachment_class(self) -> Option<u16> {
        match self.0 >> 8 {
            0 => None,
            class => Some(class),
        }
    }

    /// Set the mark attachment class; only the low byte of `class` is used.
    pub fn with_mark_attachment_class(self, class: u8) -> Self {
        Self((self.0 & 0xff) | ((class as u16) << 8))
    }

    fn with_bit(self, bit: u16, val: bool) -> Self {
        if val {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
}

impl FontWrite for LookupFlag {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write(&self.0)
    }
}
