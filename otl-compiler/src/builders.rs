//! Shared plumbing for the per-lookup rule builders

use otl_types::{FixedSize, GlyphId16};

use crate::{
    coverage::CoveragePool,
    error::{Diagnostics, Error},
    subtable::Subtable,
    value::ValuePool,
};

/// What a builder needs while rules are being added.
pub(crate) struct AddContext<'a> {
    pub values: &'a ValuePool,
    pub diagnostics: &'a mut Diagnostics,
    pub context: &'a str,
}

/// What a builder needs to turn its rules into subtables.
pub(crate) struct BuildContext<'a> {
    pub coverages: &'a mut CoveragePool,
    pub values: &'a mut ValuePool,
    pub diagnostics: &'a mut Diagnostics,
    pub context: &'a str,
}

/// A type that accumulates the rules of one lookup and then fills
/// subtables from them.
pub(crate) trait Builder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error>;
}

/// Whether a rule can be added to an existing rule set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Compat {
    /// The rule is new to the set.
    Compatible,
    /// The set already has exactly this rule.
    Duplicate,
    /// The set has a rule for the same input with a different result.
    Conflict,
}

/// Helper type for splitting layout subtables
///
/// Items are added in coverage order; whenever adding an item would push
/// the running size past what 16-bit offsets can address, the current
/// subtable is finished and a new one started.
#[derive(Clone, Debug)]
pub(crate) struct TableSplitter<C> {
    finished: Vec<(Vec<GlyphId16>, Vec<C>)>,
    current_coverage: Vec<GlyphId16>,
    current_items: Vec<C>,
    current_size: usize,
    initial_size: usize,
    table_type: &'static str,
}

impl<C> TableSplitter<C> {
    const MAX_TABLE_SIZE: usize = u16::MAX as usize;
    // the coverage table's format and count
    const COVERAGE_HEADER_LEN: usize = 4;

    /// `initial_size` is the size of an empty subtable.
    pub(crate) fn new(initial_size: usize, table_type: &'static str) -> Self {
        Self {
            finished: Vec::new(),
            current_coverage: Vec::new(),
            current_items: Vec::new(),
            current_size: initial_size + Self::COVERAGE_HEADER_LEN,
            initial_size: initial_size + Self::COVERAGE_HEADER_LEN,
            table_type,
        }
    }

    /// Add an item that needs `item_size` bytes, excluding its coverage entry.
    pub(crate) fn add(&mut self, gid: GlyphId16, item: C, item_size: usize) {
        // item size + a glyph in the coverage table (worst case)
        let item_size = item_size + GlyphId16::RAW_BYTE_LEN;
        if !self.current_items.is_empty() && item_size + self.current_size > Self::MAX_TABLE_SIZE
        {
            let current_len = self.current_coverage.len();
            self.finish_current();
            log::info!(
                "adding split in {} at {current_len} glyphs",
                self.table_type
            );
        }
        self.current_coverage.push(gid);
        self.current_items.push(item);
        self.current_size += item_size;
    }

    fn finish_current(&mut self) {
        if !self.current_coverage.is_empty() {
            self.finished.push((
                std::mem::take(&mut self.current_coverage),
                std::mem::take(&mut self.current_items),
            ));
            self.current_size = self.initial_size;
        }
    }

    /// Return the (coverage, items) of each subtable.
    pub(crate) fn finish(mut self) -> Vec<(Vec<GlyphId16>, Vec<C>)> {
        self.finish_current();
        self.finished
    }
}
