use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

/// An OpenType tag.
///
/// [Per the spec][spec], a tag is a 4-byte array where each byte is in the
/// printable ASCII range `(0x20..=0x7E)`. Equality and ordering compare the
/// raw bytes.
///
/// [spec]: https://learn.microsoft.com/en-us/typography/opentype/spec/otff#data-types
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Tag([u8; 4]);

impl Tag {
    /// A tag from raw bytes, without validation.
    pub const fn new(src: &[u8; 4]) -> Tag {
        Tag(*src)
    }

    /// Parse a tag from up to four bytes.
    ///
    /// Bytes must be printable ascii (`0x20..=0x7E`). A tag may not start
    /// with a space, and once a space appears only spaces may follow. Short
    /// input is padded with spaces.
    pub fn new_checked(src: &[u8]) -> Result<Self, InvalidTag> {
        if !(1..=4).contains(&src.len()) {
            return Err(InvalidTag::InvalidLength(src.len()));
        }
        let mut raw = [b' '; 4];
        for (pos, byte) in src.iter().copied().enumerate() {
            if !(0x20..=0x7E).contains(&byte) || (pos == 0 && byte == b' ') {
                return Err(InvalidTag::InvalidByte { pos, byte });
            }
            if byte != b' ' && pos > 0 && raw[pos - 1] == b' ' {
                return Err(InvalidTag::ByteAfterSpace { pos });
            }
            raw[pos] = byte;
        }
        Ok(Tag(raw))
    }

    /// Create a tag from raw big-endian bytes.
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Return the memory representation of this tag.
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0
    }

    /// `true` if this tag names a stylistic set feature (`ss01`..`ss20`).
    pub fn is_stylistic_set(self) -> bool {
        self.0.starts_with(b"ss") && self.0[2..].iter().all(u8::is_ascii_digit)
    }

    /// `true` if this tag names a character variant feature (`cv01`..`cv99`).
    pub fn is_character_variant(self) -> bool {
        self.0.starts_with(b"cv") && self.0[2..].iter().all(u8::is_ascii_digit)
    }
}

/// Why a string could not be parsed as a [`Tag`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidTag {
    /// Tags are one to four bytes long.
    InvalidLength(usize),
    /// A byte outside the printable ascii range, or a leading space.
    InvalidByte { pos: usize, byte: u8 },
    /// A non-space byte following a space.
    ByteAfterSpace { pos: usize },
}

impl FromStr for Tag {
    type Err = InvalidTag;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Tag::new_checked(src.as_bytes())
    }
}

impl crate::raw::Scalar for Tag {
    type Raw = [u8; 4];

    fn to_raw(self) -> Self::Raw {
        self.to_be_bytes()
    }

    fn from_raw(raw: Self::Raw) -> Self {
        Self::from_be_bytes(raw)
    }
}

impl std::error::Error for InvalidTag {}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            if (0x20..=0x7E).contains(&byte) {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "{{0x{byte:02X}}}")?;
            }
        }
        Ok(())
    }
}

impl Display for InvalidTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidTag::InvalidByte { pos, byte } => {
                write!(f, "invalid tag byte 0x{byte:02X} at {pos}")
            }
            InvalidTag::InvalidLength(len) => write!(f, "tag has {len} bytes, expected 1 to 4"),
            InvalidTag::ByteAfterSpace { pos } => write!(f, "tag has a non-space byte at {pos} after a space"),
        }
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({self})")
    }
}

// a meaningless placeholder value.
impl Default for Tag {
    fn default() -> Self {
        Tag([b' '; 4])
    }
}

// serializes to a string if the target format is human-readable, and to
// bytes otherwise.
#[cfg(feature = "serde")]
impl serde::Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            std::str::from_utf8(&self.0)
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = <String as serde::Deserialize>::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 4] as serde::Deserialize>::deserialize(deserializer).map(Tag)
        }
    }
}
