//! Compiling OpenType layout rules
//!
//! This crate turns parsed layout rules (as found in a feature file) into
//! the binary [GSUB], [GPOS] and [GDEF] tables.
//!
//! The entry point is the [`Compiler`]. Rules are added to lookups, lookups
//! are registered with features, and [`Compiler::finish`] lays out and
//! writes the tables. Along the way the compiler:
//!
//! - picks the smallest subtable format for each set of rules, splitting
//!   subtables that would overflow their 16-bit offsets
//! - synthesizes anonymous lookups for the inline actions of contextual
//!   rules
//! - promotes lookups to extension lookups when the table gets too large
//! - builds the item variation store for variable values and anchors
//!
//! Problems with the input are reported as [`Error`]s (which abandon the
//! build) or as [`Diagnostic`]s, which are returned with the tables and also
//! logged through the [`log`] crate.
//!
//! [GSUB]: https://learn.microsoft.com/en-us/typography/opentype/spec/gsub
//! [GPOS]: https://learn.microsoft.com/en-us/typography/opentype/spec/gpos
//! [GDEF]: https://learn.microsoft.com/en-us/typography/opentype/spec/gdef

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

mod anon;
mod assemble;
mod builders;
mod compiler;
mod contextual;
pub mod coverage;
mod error;
pub mod gdef;
mod gpos;
mod gsub;
mod info;
mod lookup_flag;
mod options;
pub mod params;
pub mod rules;
mod subtable;
pub mod value;
pub mod variations;
mod write;

#[cfg(test)]
mod hex_diff;
#[cfg(test)]
mod tests;

pub use assemble::{FeatureRecord, LayoutIndex};
pub use compiler::{CompiledTables, Compiler, Label};
pub use error::{Diagnostic, Error, Overflow, Severity};
pub use gdef::{CaretValue, GdefBuilder, GlyphClassDef};
pub use info::{FeatureKey, LookupKind};
pub use lookup_flag::LookupFlag;
pub use options::CompilerOptions;
pub use params::FeatureParams;
pub use rules::{
    ContextAction, GlyphClass, GlyphPattern, Location, MarkAttachment, MarkClass, PatternNode,
    Rule,
};
pub use value::{Anchor, AnchorIndex, Metric, ValueIndex, ValueRecord};
pub use variations::VariationModel;
