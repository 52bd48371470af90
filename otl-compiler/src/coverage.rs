//! Coverage and class definition tables, and the pool that owns them
//!
//! Subtables do not own their coverage or class tables. Instead, tables are
//! accumulated with a [`CoverageBuilder`] or [`ClassDefBuilder`] and frozen
//! into a [`CoveragePool`], which hands back a small handle. This lets the
//! table assembler decide where each table ends up: plain lookups share a
//! single coverage region after all subtables, while extension subtables
//! carry their own copies.

use std::collections::BTreeMap;

use otl_types::GlyphId16;

use crate::write::{FontWrite, TableWriter};

const U16_LEN: usize = std::mem::size_of::<u16>();
const RANGE_RECORD_LEN: usize = U16_LEN * 3;

/// A handle to a frozen coverage table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoverageId(u32);

/// A handle to a frozen class definition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassDefId(u32);

/// A table that lives in the [`CoveragePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum PoolRef {
    Coverage(CoverageId),
    ClassDef(ClassDefId),
}

/// Owner of every coverage and class definition table in a build.
///
/// The pool is append-only. It does not merge identical tables: callers that
/// want two subtables to share a coverage pass the same [`CoverageId`].
#[derive(Clone, Debug, Default)]
pub struct CoveragePool {
    coverages: Vec<Coverage>,
    class_defs: Vec<ClassDef>,
}

/// A sorted, deduplicated set of glyphs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Coverage {
    // invariant: strictly ascending
    glyphs: Vec<GlyphId16>,
}

/// A map from glyphs to classes.
///
/// Class 0 is never stored; glyphs not in the map are class 0.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ClassDef {
    items: BTreeMap<GlyphId16, u16>,
}

/// Accumulates the glyphs of a coverage table.
///
/// Glyphs may be added in any order, and may repeat.
#[derive(Clone, Debug, Default)]
pub struct CoverageBuilder {
    glyphs: Vec<GlyphId16>,
}

/// Accumulates the glyph → class mappings of a class definition table.
#[derive(Clone, Debug, Default)]
pub struct ClassDefBuilder {
    items: BTreeMap<GlyphId16, u16>,
}

impl CoveragePool {
    pub fn coverage(&self, id: CoverageId) -> &Coverage {
        &self.coverages[id.0 as usize]
    }

    pub fn class_def(&self, id: ClassDefId) -> &ClassDef {
        &self.class_defs[id.0 as usize]
    }

    /// Freeze a set of glyphs into a new coverage table.
    pub fn add_coverage(&mut self, glyphs: impl IntoIterator<Item = GlyphId16>) -> CoverageId {
        glyphs.into_iter().collect::<CoverageBuilder>().end(self)
    }

    fn push_coverage(&mut self, coverage: Coverage) -> CoverageId {
        let id = CoverageId(self.coverages.len() as u32);
        self.coverages.push(coverage);
        id
    }

    fn push_class_def(&mut self, class_def: ClassDef) -> ClassDefId {
        let id = ClassDefId(self.class_defs.len() as u32);
        self.class_defs.push(class_def);
        id
    }

    pub(crate) fn size_of(&self, item: PoolRef) -> usize {
        match item {
            PoolRef::Coverage(id) => self.coverage(id).size(),
            PoolRef::ClassDef(id) => self.class_def(id).size(),
        }
    }

    pub(crate) fn write_item(&self, item: PoolRef, writer: &mut TableWriter) {
        match item {
            PoolRef::Coverage(id) => writer.write(self.coverage(id)),
            PoolRef::ClassDef(id) => writer.write(self.class_def(id)),
        }
    }
}

impl CoverageBuilder {
    pub fn begin() -> Self {
        Self::default()
    }

    pub fn add_glyph(&mut self, glyph: GlyphId16) {
        self.glyphs.push(glyph);
    }

    /// The exact number of bytes the finished coverage table will occupy.
    pub fn size(&self) -> usize {
        let mut glyphs = self.glyphs.clone();
        glyphs.sort_unstable();
        glyphs.dedup();
        Coverage { glyphs }.size()
    }

    /// Sort and deduplicate the glyphs, without adding them to a pool.
    pub fn build(mut self) -> Coverage {
        self.glyphs.sort_unstable();
        self.glyphs.dedup();
        Coverage {
            glyphs: self.glyphs,
        }
    }

    /// Freeze the accumulated glyphs into `pool`.
    pub fn end(self, pool: &mut CoveragePool) -> CoverageId {
        pool.push_coverage(self.build())
    }
}

impl FromIterator<GlyphId16> for CoverageBuilder {
    fn from_iter<T: IntoIterator<Item = GlyphId16>>(iter: T) -> Self {
        CoverageBuilder {
            glyphs: iter.into_iter().collect(),
        }
    }
}

impl Coverage {
    pub fn glyphs(&self) -> &[GlyphId16] {
        &self.glyphs
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// The coverage index of a glyph, if it is covered.
    pub fn index_of(&self, glyph: GlyphId16) -> Option<u16> {
        self.glyphs.binary_search(&glyph).ok().map(|ix| ix as u16)
    }

    fn range_count(&self) -> usize {
        iter_ranges(&self.glyphs).count()
    }

    fn prefer_format_2(&self) -> bool {
        let format2_len = 4 + self.range_count() * RANGE_RECORD_LEN;
        let format1_len = 4 + self.glyphs.len() * U16_LEN;
        format2_len < format1_len
    }

    /// The format that will be written: 1 for a glyph list, 2 for ranges.
    pub fn format(&self) -> u16 {
        if self.prefer_format_2() {
            2
        } else {
            1
        }
    }

    pub fn size(&self) -> usize {
        4 + if self.prefer_format_2() {
            self.range_count() * RANGE_RECORD_LEN
        } else {
            self.glyphs.len() * U16_LEN
        }
    }
}

impl FontWrite for Coverage {
    fn write_into(&self, writer: &mut TableWriter) {
        // glyph ids are unique and there are at most 0xFFFF of them, so
        // counts always fit
        if self.prefer_format_2() {
            writer.write(&2u16);
            writer.write(&(self.range_count() as u16));
            let mut coverage_index = 0u16;
            for (start, end) in iter_ranges(&self.glyphs) {
                writer.write(&start);
                writer.write(&end);
                writer.write(&coverage_index);
                coverage_index = coverage_index.wrapping_add(end.to_u16() - start.to_u16() + 1);
            }
        } else {
            writer.write(&1u16);
            writer.write(&(self.glyphs.len() as u16));
            writer.write(self.glyphs.as_slice());
        }
    }
}

impl ClassDefBuilder {
    pub fn begin() -> Self {
        Self::default()
    }

    /// Assign `glyph` to `class`.
    ///
    /// Class 0 mappings are dropped, since class 0 is implicit. Returns
    /// `false` if the glyph already had a different class, in which case
    /// the first class is kept.
    pub fn add_mapping(&mut self, glyph: GlyphId16, class: u16) -> bool {
        if class == 0 {
            return true;
        }
        match self.items.get(&glyph) {
            Some(existing) => *existing == class,
            None => {
                self.items.insert(glyph, class);
                true
            }
        }
    }

    pub fn size(&self) -> usize {
        ClassDef {
            items: self.items.clone(),
        }
        .size()
    }

    pub fn build(self) -> ClassDef {
        ClassDef { items: self.items }
    }

    /// Freeze the accumulated mappings into `pool`.
    pub fn end(self, pool: &mut CoveragePool) -> ClassDefId {
        pool.push_class_def(self.build())
    }
}

impl FromIterator<(GlyphId16, u16)> for ClassDefBuilder {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, u16)>>(iter: T) -> Self {
        let mut builder = ClassDefBuilder::default();
        for (glyph, class) in iter {
            builder.add_mapping(glyph, class);
        }
        builder
    }
}

impl ClassDef {
    /// The class of `glyph`; glyphs that were never assigned are class 0.
    pub fn get(&self, glyph: GlyphId16) -> u16 {
        self.items.get(&glyph).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlyphId16, u16)> + '_ {
        self.items.iter().map(|(gid, cls)| (*gid, *cls))
    }

    fn first_and_last(&self) -> Option<(u16, u16)> {
        let first = self.items.keys().next()?;
        let last = self.items.keys().next_back()?;
        Some((first.to_u16(), last.to_u16()))
    }

    fn prefer_format_1(&self) -> bool {
        const FORMAT1_HEADER_LEN: usize = U16_LEN * 3;
        const FORMAT2_HEADER_LEN: usize = U16_LEN * 2;
        // format 2 is the most efficient way to represent an empty classdef
        let Some((first, last)) = self.first_and_last() else {
            return false;
        };
        let len_format1 = FORMAT1_HEADER_LEN + (last - first + 1) as usize * U16_LEN;
        let len_format2 =
            FORMAT2_HEADER_LEN + iter_class_ranges(&self.items).count() * RANGE_RECORD_LEN;
        len_format1 < len_format2
    }

    pub fn format(&self) -> u16 {
        if self.prefer_format_1() {
            1
        } else {
            2
        }
    }

    pub fn size(&self) -> usize {
        match self.first_and_last() {
            Some((first, last)) if self.prefer_format_1() => {
                U16_LEN * 3 + (last - first + 1) as usize * U16_LEN
            }
            _ => U16_LEN * 2 + iter_class_ranges(&self.items).count() * RANGE_RECORD_LEN,
        }
    }
}

impl FontWrite for ClassDef {
    fn write_into(&self, writer: &mut TableWriter) {
        match self.first_and_last() {
            Some((first, last)) if self.prefer_format_1() => {
                writer.write(&1u16);
                writer.write(&first);
                writer.write(&(last - first + 1));
                for gid in first..=last {
                    writer.write(&self.get(GlyphId16::new(gid)));
                }
            }
            _ => {
                writer.write(&2u16);
                writer.write(&(iter_class_ranges(&self.items).count() as u16));
                for (start, end, class) in iter_class_ranges(&self.items) {
                    writer.write(&start);
                    writer.write(&end);
                    writer.write(&class);
                }
            }
        }
    }
}

fn are_sequential(prev: GlyphId16, next: GlyphId16) -> bool {
    prev.to_u16().checked_add(1) == Some(next.to_u16())
}

fn iter_ranges(glyphs: &[GlyphId16]) -> impl Iterator<Item = (GlyphId16, GlyphId16)> + '_ {
    let mut iter = glyphs.iter().copied();
    let mut prev: Option<(GlyphId16, GlyphId16)> = None;
    std::iter::from_fn(move || {
        for gid in iter.by_ref() {
            match prev.take() {
                None => prev = Some((gid, gid)),
                Some((start, end)) if are_sequential(end, gid) => prev = Some((start, gid)),
                Some(range) => {
                    prev = Some((gid, gid));
                    return Some(range);
                }
            }
        }
        prev.take()
    })
}

fn iter_class_ranges(
    values: &BTreeMap<GlyphId16, u16>,
) -> impl Iterator<Item = (GlyphId16, GlyphId16, u16)> + '_ {
    let mut iter = values.iter();
    let mut prev = None;

    std::iter::from_fn(move || {
        for (gid, class) in iter.by_ref() {
            match prev.take() {
                None => prev = Some((*gid, *gid, *class)),
                Some((start, end, pclass)) if are_sequential(end, *gid) && pclass == *class => {
                    prev = Some((start, *gid, pclass))
                }
                Some(range) => {
                    prev = Some((*gid, *gid, *class));
                    return Some(range);
                }
            }
        }
        prev.take()
    })
}
