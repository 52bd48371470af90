//! Common [scalar data types][data types] used when compiling OpenType layout tables
//!
//! [data types]: https://docs.microsoft.com/en-us/typography/opentype/spec/otff#data-types

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

mod fixed;
mod glyph_id;
mod name_id;
mod offset;
mod raw;
mod tag;
mod uint24;
mod version;

pub use fixed::F2Dot14;
pub use glyph_id::GlyphId16;
pub use name_id::NameId;
pub use offset::{Offset16, Offset32};
pub use raw::{FixedSize, Scalar};
pub use tag::{InvalidTag, Tag};
pub use uint24::Uint24;
pub use version::MajorMinor;

/// The tag of the glyph substitution table.
pub const GSUB: Tag = Tag::new(b"GSUB");
/// The tag of the glyph positioning table.
pub const GPOS: Tag = Tag::new(b"GPOS");
/// The tag of the glyph definition table.
pub const GDEF: Tag = Tag::new(b"GDEF");
