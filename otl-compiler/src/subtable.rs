//! The lookup subtable formats we write
//!
//! Every subtable is laid out the same way: the fixed-size body comes first,
//! followed by any tables the subtable owns outright (sequences, pair sets,
//! anchors...) and finally the VariationIndex tables of its variable
//! values. Coverage and class definition tables are not owned by the
//! subtable; they live in the [`CoveragePool`](crate::coverage::CoveragePool)
//! and are placed by the table assembler, which tells us where they ended up
//! through the [`WriteContext`].

use std::collections::HashMap;

use indexmap::IndexSet;
use otl_types::GlyphId16;

use crate::{
    compiler::Label,
    coverage::{ClassDefId, CoverageId, PoolRef},
    error::Overflow,
    value::{count_distinct, DeviceOffsets, ResolvedAnchor, ResolvedValue, ValueFormat},
    variations::{DeltaSetId, VariationIndexRemapping},
    write::TableWriter,
};

/// Size of an extension subtable: format, lookup type, Offset32.
pub(crate) const EXTENSION_SIZE: usize = 8;

/// Positions and indices that are only known once a table is laid out.
pub(crate) struct WriteContext<'a> {
    pub pool_positions: &'a HashMap<PoolRef, usize>,
    pub lookup_indices: &'a HashMap<Label, u16>,
    pub remap: &'a VariationIndexRemapping,
}

impl WriteContext<'_> {
    fn coverage(&self, id: CoverageId) -> Option<usize> {
        let pos = self.pool_positions.get(&PoolRef::Coverage(id)).copied();
        debug_assert!(pos.is_some(), "coverage {id:?} was not placed");
        pos
    }

    fn class_def(&self, id: ClassDefId) -> Option<usize> {
        let pos = self.pool_positions.get(&PoolRef::ClassDef(id)).copied();
        debug_assert!(pos.is_some(), "classdef {id:?} was not placed");
        pos
    }
}

/// Errors that can occur while writing a subtable.
#[derive(Clone, Debug)]
pub(crate) enum WriteError {
    Overflow(Overflow),
    UnknownLabel(Label),
}

impl From<Overflow> for WriteError {
    fn from(src: Overflow) -> WriteError {
        WriteError::Overflow(src)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ligature {
    pub glyph: GlyphId16,
    /// Every component after the first
    pub components: Vec<GlyphId16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChainContext {
    /// Closest glyph first
    pub backtrack: Vec<CoverageId>,
    pub input: Vec<CoverageId>,
    pub lookahead: Vec<CoverageId>,
    /// (sequence index, lookup)
    pub records: Vec<(u16, Label)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PairValue {
    pub second: GlyphId16,
    pub first_value: ResolvedValue,
    pub second_value: ResolvedValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PairPosClass {
    pub coverage: CoverageId,
    pub class_def1: ClassDefId,
    pub class_def2: ClassDefId,
    pub format1: ValueFormat,
    pub format2: ValueFormat,
    pub class1_count: u16,
    pub class2_count: u16,
    /// `class1_count * class2_count` cells, row major; `None` is an
    /// all-zero record.
    pub records: Vec<Option<(ResolvedValue, ResolvedValue)>>,
}

/// Mark-to-base and mark-to-mark, which share a layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MarkAttach {
    pub mark_coverage: CoverageId,
    pub base_coverage: CoverageId,
    pub class_count: u16,
    /// (class, anchor), in mark coverage order
    pub marks: Vec<(u16, u16)>,
    /// One anchor per class, per base in coverage order
    pub bases: Vec<Vec<Option<u16>>>,
    pub anchors: IndexSet<ResolvedAnchor>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MarkLig {
    pub mark_coverage: CoverageId,
    pub ligature_coverage: CoverageId,
    pub class_count: u16,
    pub marks: Vec<(u16, u16)>,
    /// Per ligature, per component, one anchor per class
    pub ligatures: Vec<Vec<Vec<Option<u16>>>>,
    pub anchors: IndexSet<ResolvedAnchor>,
}

/// A lookup subtable, in one of the formats we write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Subtable {
    SingleSubst1 {
        coverage: CoverageId,
        delta: i16,
    },
    SingleSubst2 {
        coverage: CoverageId,
        substitutes: Vec<GlyphId16>,
    },
    MultipleSubst {
        coverage: CoverageId,
        sequences: Vec<Vec<GlyphId16>>,
    },
    AlternateSubst {
        coverage: CoverageId,
        alternates: Vec<Vec<GlyphId16>>,
    },
    LigatureSubst {
        coverage: CoverageId,
        sets: Vec<Vec<Ligature>>,
    },
    ChainContext(ChainContext),
    ReverseChainSingleSubst {
        coverage: CoverageId,
        backtrack: Vec<CoverageId>,
        lookahead: Vec<CoverageId>,
        substitutes: Vec<GlyphId16>,
    },
    SinglePos1 {
        coverage: CoverageId,
        value: ResolvedValue,
    },
    SinglePos2 {
        coverage: CoverageId,
        format: ValueFormat,
        values: Vec<ResolvedValue>,
    },
    PairPos1 {
        coverage: CoverageId,
        format1: ValueFormat,
        format2: ValueFormat,
        sets: Vec<Vec<PairValue>>,
    },
    PairPos2(PairPosClass),
    Cursive {
        coverage: CoverageId,
        /// (entry, exit) per glyph in coverage order
        records: Vec<(Option<u16>, Option<u16>)>,
        anchors: IndexSet<ResolvedAnchor>,
    },
    MarkAttach(MarkAttach),
    MarkLig(MarkLig),
}

fn anchor_positions(anchors: &IndexSet<ResolvedAnchor>, start: usize) -> Vec<usize> {
    let mut pos = start;
    anchors
        .iter()
        .map(|anchor| {
            let this = pos;
            pos += anchor.size();
            this
        })
        .collect()
}

fn anchors_size(anchors: &IndexSet<ResolvedAnchor>) -> usize {
    anchors.iter().map(ResolvedAnchor::size).sum()
}

impl Subtable {
    /// The name used when reporting an overflow.
    pub(crate) fn construct_name(&self) -> &'static str {
        match self {
            Subtable::SingleSubst1 { .. } | Subtable::SingleSubst2 { .. } => "single substitution",
            Subtable::MultipleSubst { .. } => "multiple substitution",
            Subtable::AlternateSubst { .. } => "alternate substitution",
            Subtable::LigatureSubst { .. } => "ligature substitution",
            Subtable::ChainContext(_) => "chaining contextual",
            Subtable::ReverseChainSingleSubst { .. } => "reverse chaining substitution",
            Subtable::SinglePos1 { .. } | Subtable::SinglePos2 { .. } => "single positioning",
            Subtable::PairPos1 { .. } | Subtable::PairPos2(_) => "pair positioning",
            Subtable::Cursive { .. } => "cursive attachment",
            Subtable::MarkAttach(_) => "mark attachment",
            Subtable::MarkLig(_) => "mark-to-ligature attachment",
        }
    }

    /// The coverage and class tables this subtable points to, in order and
    /// without repeats.
    pub(crate) fn pool_refs(&self) -> Vec<PoolRef> {
        let mut refs = IndexSet::new();
        match self {
            Subtable::SingleSubst1 { coverage, .. }
            | Subtable::SingleSubst2 { coverage, .. }
            | Subtable::MultipleSubst { coverage, .. }
            | Subtable::AlternateSubst { coverage, .. }
            | Subtable::LigatureSubst { coverage, .. }
            | Subtable::SinglePos1 { coverage, .. }
            | Subtable::SinglePos2 { coverage, .. }
            | Subtable::PairPos1 { coverage, .. }
            | Subtable::Cursive { coverage, .. } => {
                refs.insert(PoolRef::Coverage(*coverage));
            }
            Subtable::ChainContext(chain) => {
                for id in chain
                    .backtrack
                    .iter()
                    .chain(&chain.input)
                    .chain(&chain.lookahead)
                {
                    refs.insert(PoolRef::Coverage(*id));
                }
            }
            Subtable::ReverseChainSingleSubst {
                coverage,
                backtrack,
                lookahead,
                ..
            } => {
                refs.insert(PoolRef::Coverage(*coverage));
                for id in backtrack.iter().chain(lookahead) {
                    refs.insert(PoolRef::Coverage(*id));
                }
            }
            Subtable::PairPos2(pair) => {
                refs.insert(PoolRef::Coverage(pair.coverage));
                refs.insert(PoolRef::ClassDef(pair.class_def1));
                refs.insert(PoolRef::ClassDef(pair.class_def2));
            }
            Subtable::MarkAttach(mark) => {
                refs.insert(PoolRef::Coverage(mark.mark_coverage));
                refs.insert(PoolRef::Coverage(mark.base_coverage));
            }
            Subtable::MarkLig(mark) => {
                refs.insert(PoolRef::Coverage(mark.mark_coverage));
                refs.insert(PoolRef::Coverage(mark.ligature_coverage));
            }
        }
        refs.into_iter().collect()
    }

    /// The delta sets used by this subtable, in the order their
    /// VariationIndex tables are written.
    fn var_ids(&self) -> Vec<DeltaSetId> {
        match self {
            Subtable::SinglePos1 { value, .. } => value.var_ids().collect(),
            Subtable::SinglePos2 { values, .. } => {
                values.iter().flat_map(ResolvedValue::var_ids).collect()
            }
            Subtable::PairPos1 { sets, .. } => sets
                .iter()
                .flatten()
                .flat_map(|pair| pair.first_value.var_ids().chain(pair.second_value.var_ids()))
                .collect(),
            Subtable::PairPos2(pair) => pair
                .records
                .iter()
                .flatten()
                .flat_map(|(one, two)| one.var_ids().chain(two.var_ids()))
                .collect(),
            Subtable::Cursive { anchors, .. } => {
                anchors.iter().flat_map(ResolvedAnchor::var_ids).collect()
            }
            Subtable::MarkAttach(MarkAttach { anchors, .. })
            | Subtable::MarkLig(MarkLig { anchors, .. }) => {
                anchors.iter().flat_map(ResolvedAnchor::var_ids).collect()
            }
            _ => Vec::new(),
        }
    }

    /// The size of everything but the VariationIndex tables.
    fn body_size(&self) -> usize {
        match self {
            Subtable::SingleSubst1 { .. } => 6,
            Subtable::SingleSubst2 { substitutes, .. } => 6 + 2 * substitutes.len(),
            Subtable::MultipleSubst { sequences, .. } => sequence_table_size(sequences),
            Subtable::AlternateSubst { alternates, .. } => sequence_table_size(alternates),
            Subtable::LigatureSubst { sets, .. } => {
                6 + sets
                    .iter()
                    .map(|set| {
                        2 + set
                            .iter()
                            .map(|lig| 2 + 4 + 2 * lig.components.len())
                            .sum::<usize>()
                    })
                    .sum::<usize>()
                    + 2 * sets.len()
            }
            Subtable::ChainContext(chain) => {
                2 + 2 * 3
                    + 2 * (chain.backtrack.len() + chain.input.len() + chain.lookahead.len())
                    + 2
                    + 4 * chain.records.len()
            }
            Subtable::ReverseChainSingleSubst {
                backtrack,
                lookahead,
                substitutes,
                ..
            } => 4 + 2 + 2 * backtrack.len() + 2 + 2 * lookahead.len() + 2 + 2 * substitutes.len(),
            Subtable::SinglePos1 { value, .. } => 6 + value.format().record_size(),
            Subtable::SinglePos2 { format, values, .. } => 8 + values.len() * format.record_size(),
            Subtable::PairPos1 {
                format1,
                format2,
                sets,
                ..
            } => {
                let record_size = 2 + format1.record_size() + format2.record_size();
                10 + sets
                    .iter()
                    .map(|set| 2 + 2 + set.len() * record_size)
                    .sum::<usize>()
            }
            Subtable::PairPos2(pair) => {
                16 + pair.records.len() * (pair.format1.record_size() + pair.format2.record_size())
            }
            Subtable::Cursive {
                records, anchors, ..
            } => 6 + 4 * records.len() + anchors_size(anchors),
            Subtable::MarkAttach(mark) => {
                12 + mark_array_size(&mark.marks)
                    + 2
                    + 2 * mark.bases.len() * mark.class_count as usize
                    + anchors_size(&mark.anchors)
            }
            Subtable::MarkLig(mark) => {
                12 + mark_array_size(&mark.marks)
                    + 2
                    + mark
                        .ligatures
                        .iter()
                        .map(|lig| 2 + 2 + 2 * lig.len() * mark.class_count as usize)
                        .sum::<usize>()
                    + anchors_size(&mark.anchors)
            }
        }
    }

    /// The exact number of bytes [`Subtable::write`] produces.
    pub(crate) fn size(&self) -> usize {
        self.body_size() + DeviceOffsets::DEVICE_SIZE * count_distinct(self.var_ids())
    }

    /// Write this subtable at the writer's current position.
    pub(crate) fn write(
        &self,
        writer: &mut TableWriter,
        ctx: &WriteContext,
    ) -> Result<(), WriteError> {
        let start = writer.position();
        let devices = DeviceOffsets::place(self.var_ids(), start + self.body_size());
        match self {
            Subtable::SingleSubst1 { coverage, delta } => {
                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.write(delta);
            }
            Subtable::SingleSubst2 {
                coverage,
                substitutes,
            } => {
                writer.write(&2u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.count16(substitutes.len(), "glyph count")?;
                writer.write(substitutes.as_slice());
            }
            Subtable::MultipleSubst {
                coverage,
                sequences,
            } => write_sequence_table(writer, ctx, *coverage, sequences)?,
            Subtable::AlternateSubst {
                coverage,
                alternates,
            } => write_sequence_table(writer, ctx, *coverage, alternates)?,
            Subtable::LigatureSubst { coverage, sets } => {
                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.count16(sets.len(), "ligature set count")?;
                let mut pos = start + 6 + 2 * sets.len();
                for set in sets {
                    writer.offset16(start, Some(pos), "ligature set offset")?;
                    pos += 2 + set
                        .iter()
                        .map(|lig| 2 + 4 + 2 * lig.components.len())
                        .sum::<usize>();
                }
                for set in sets {
                    let set_start = writer.position();
                    writer.count16(set.len(), "ligature count")?;
                    let mut pos = set_start + 2 + 2 * set.len();
                    for lig in set {
                        writer.offset16(set_start, Some(pos), "ligature offset")?;
                        pos += 4 + 2 * lig.components.len();
                    }
                    for lig in set {
                        writer.write(&lig.glyph);
                        writer.count16(lig.components.len() + 1, "component count")?;
                        writer.write(lig.components.as_slice());
                    }
                }
            }
            Subtable::ChainContext(chain) => {
                writer.write(&3u16);
                for coverages in [&chain.backtrack, &chain.input, &chain.lookahead] {
                    writer.count16(coverages.len(), "glyph count")?;
                    for id in coverages.iter() {
                        writer.offset16(start, ctx.coverage(*id), "coverage offset")?;
                    }
                }
                writer.count16(chain.records.len(), "lookup record count")?;
                for (seq_index, label) in &chain.records {
                    let index = ctx
                        .lookup_indices
                        .get(label)
                        .ok_or(WriteError::UnknownLabel(*label))?;
                    writer.write(seq_index);
                    writer.write(index);
                }
            }
            Subtable::ReverseChainSingleSubst {
                coverage,
                backtrack,
                lookahead,
                substitutes,
            } => {
                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                for coverages in [backtrack, lookahead] {
                    writer.count16(coverages.len(), "glyph count")?;
                    for id in coverages.iter() {
                        writer.offset16(start, ctx.coverage(*id), "coverage offset")?;
                    }
                }
                writer.count16(substitutes.len(), "glyph count")?;
                writer.write(substitutes.as_slice());
            }
            Subtable::SinglePos1 { coverage, value } => {
                let format = value.format();
                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.write(&format.bits());
                value.write(writer, format, start, &devices)?;
            }
            Subtable::SinglePos2 {
                coverage,
                format,
                values,
            } => {
                writer.write(&2u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.write(&format.bits());
                writer.count16(values.len(), "value count")?;
                for value in values {
                    value.write(writer, *format, start, &devices)?;
                }
            }
            Subtable::PairPos1 {
                coverage,
                format1,
                format2,
                sets,
            } => {
                let record_size = 2 + format1.record_size() + format2.record_size();
                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.write(&format1.bits());
                writer.write(&format2.bits());
                writer.count16(sets.len(), "pair set count")?;
                let mut pos = start + 10 + 2 * sets.len();
                for set in sets {
                    writer.offset16(start, Some(pos), "pair set offset")?;
                    pos += 2 + set.len() * record_size;
                }
                for set in sets {
                    writer.count16(set.len(), "pair value count")?;
                    for pair in set {
                        writer.write(&pair.second);
                        // device offsets are from the start of the PairPos subtable
                        pair.first_value.write(writer, *format1, start, &devices)?;
                        pair.second_value
                            .write(writer, *format2, start, &devices)?;
                    }
                }
            }
            Subtable::PairPos2(pair) => {
                writer.write(&2u16);
                writer.offset16(start, ctx.coverage(pair.coverage), "coverage offset")?;
                writer.write(&pair.format1.bits());
                writer.write(&pair.format2.bits());
                writer.offset16(start, ctx.class_def(pair.class_def1), "class def offset")?;
                writer.offset16(start, ctx.class_def(pair.class_def2), "class def offset")?;
                writer.write(&pair.class1_count);
                writer.write(&pair.class2_count);
                for record in &pair.records {
                    match record {
                        Some((one, two)) => {
                            one.write(writer, pair.format1, start, &devices)?;
                            two.write(writer, pair.format2, start, &devices)?;
                        }
                        None => {
                            ResolvedValue::write_empty(writer, pair.format1);
                            ResolvedValue::write_empty(writer, pair.format2);
                        }
                    }
                }
            }
            Subtable::Cursive {
                coverage,
                records,
                anchors,
            } => {
                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(*coverage), "coverage offset")?;
                writer.count16(records.len(), "entry exit count")?;
                let positions = anchor_positions(anchors, start + 6 + 4 * records.len());
                for (entry, exit) in records {
                    for anchor in [entry, exit] {
                        let target = anchor.map(|ix| positions[ix as usize]);
                        writer.offset16(start, target, "anchor offset")?;
                    }
                }
                write_anchors(writer, anchors, &devices)?;
            }
            Subtable::MarkAttach(mark) => {
                let mark_array = start + 12;
                let base_array = mark_array + mark_array_size(&mark.marks);
                let anchors_start =
                    base_array + 2 + 2 * mark.bases.len() * mark.class_count as usize;
                let positions = anchor_positions(&mark.anchors, anchors_start);

                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(mark.mark_coverage), "coverage offset")?;
                writer.offset16(start, ctx.coverage(mark.base_coverage), "coverage offset")?;
                writer.write(&mark.class_count);
                writer.offset16(start, Some(mark_array), "mark array offset")?;
                writer.offset16(start, Some(base_array), "base array offset")?;
                write_mark_array(writer, &mark.marks, &positions)?;
                writer.count16(mark.bases.len(), "base count")?;
                for base in &mark.bases {
                    for anchor in base {
                        let target = anchor.map(|ix| positions[ix as usize]);
                        writer.offset16(base_array, target, "anchor offset")?;
                    }
                }
                write_anchors(writer, &mark.anchors, &devices)?;
            }
            Subtable::MarkLig(mark) => {
                let mark_array = start + 12;
                let lig_array = mark_array + mark_array_size(&mark.marks);
                let attach_size =
                    |lig: &Vec<Vec<Option<u16>>>| 2 + 2 * lig.len() * mark.class_count as usize;
                let anchors_start = lig_array
                    + 2
                    + mark
                        .ligatures
                        .iter()
                        .map(|lig| 2 + attach_size(lig))
                        .sum::<usize>();
                let positions = anchor_positions(&mark.anchors, anchors_start);

                writer.write(&1u16);
                writer.offset16(start, ctx.coverage(mark.mark_coverage), "coverage offset")?;
                writer.offset16(
                    start,
                    ctx.coverage(mark.ligature_coverage),
                    "coverage offset",
                )?;
                writer.write(&mark.class_count);
                writer.offset16(start, Some(mark_array), "mark array offset")?;
                writer.offset16(start, Some(lig_array), "ligature array offset")?;
                write_mark_array(writer, &mark.marks, &positions)?;
                writer.count16(mark.ligatures.len(), "ligature count")?;
                let mut pos = lig_array + 2 + 2 * mark.ligatures.len();
                for lig in &mark.ligatures {
                    writer.offset16(lig_array, Some(pos), "ligature attach offset")?;
                    pos += attach_size(lig);
                }
                for lig in &mark.ligatures {
                    let attach_start = writer.position();
                    writer.count16(lig.len(), "component count")?;
                    for component in lig {
                        for anchor in component {
                            let target = anchor.map(|ix| positions[ix as usize]);
                            writer.offset16(attach_start, target, "anchor offset")?;
                        }
                    }
                }
                write_anchors(writer, &mark.anchors, &devices)?;
            }
        }
        devices.write_tables(writer, ctx.remap);
        debug_assert_eq!(
            writer.position() - start,
            self.size(),
            "size mismatch for {}",
            self.construct_name()
        );
        Ok(())
    }
}

fn sequence_table_size(sequences: &[Vec<GlyphId16>]) -> usize {
    6 + sequences.iter().map(|seq| 2 + 2 + 2 * seq.len()).sum::<usize>()
}

fn write_sequence_table(
    writer: &mut TableWriter,
    ctx: &WriteContext,
    coverage: CoverageId,
    sequences: &[Vec<GlyphId16>],
) -> Result<(), Overflow> {
    let start = writer.position();
    writer.write(&1u16);
    writer.offset16(start, ctx.coverage(coverage), "coverage offset")?;
    writer.count16(sequences.len(), "sequence count")?;
    let mut pos = start + 6 + 2 * sequences.len();
    for seq in sequences {
        writer.offset16(start, Some(pos), "sequence offset")?;
        pos += 2 + 2 * seq.len();
    }
    for seq in sequences {
        writer.count16(seq.len(), "glyph count")?;
        writer.write(seq.as_slice());
    }
    Ok(())
}

fn mark_array_size(marks: &[(u16, u16)]) -> usize {
    2 + 4 * marks.len()
}

fn write_mark_array(
    writer: &mut TableWriter,
    marks: &[(u16, u16)],
    anchor_positions: &[usize],
) -> Result<(), Overflow> {
    let array_start = writer.position();
    writer.count16(marks.len(), "mark count")?;
    for (class, anchor) in marks {
        writer.write(class);
        writer.offset16(
            array_start,
            Some(anchor_positions[*anchor as usize]),
            "mark anchor offset",
        )?;
    }
    Ok(())
}

fn write_anchors(
    writer: &mut TableWriter,
    anchors: &IndexSet<ResolvedAnchor>,
    devices: &DeviceOffsets,
) -> Result<(), Overflow> {
    for anchor in anchors {
        anchor.write(writer, devices)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{coverage::CoveragePool, value::ResolvedMetric};

    use super::*;

    fn gid(raw: u16) -> GlyphId16 {
        GlyphId16::new(raw)
    }

    /// Write `subtable` at position 0, with its coverages placed right after.
    fn write_with_pool(subtable: &Subtable, pool: &CoveragePool) -> Vec<u8> {
        let mut positions = HashMap::new();
        let mut pos = subtable.size();
        for item in subtable.pool_refs() {
            positions.insert(item, pos);
            pos += pool.size_of(item);
        }
        let lookup_indices = HashMap::new();
        let remap = VariationIndexRemapping::default();
        let ctx = WriteContext {
            pool_positions: &positions,
            lookup_indices: &lookup_indices,
            remap: &remap,
        };
        let mut writer = TableWriter::default();
        subtable.write(&mut writer, &ctx).unwrap();
        for item in subtable.pool_refs() {
            pool.write_item(item, &mut writer);
        }
        writer.into_data()
    }

    #[test]
    fn single_subst_format_1() {
        let mut pool = CoveragePool::default();
        let coverage = pool.add_coverage([gid(5), gid(7)]);
        let subtable = Subtable::SingleSubst1 { coverage, delta: 4 };
        crate::assert_hex_eq!(
            &write_with_pool(&subtable, &pool),
            &[0, 1, 0, 6, 0, 4, 0, 1, 0, 2, 0, 5, 0, 7]
        );
    }

    #[test]
    fn ligature_size_matches_bytes() {
        let mut pool = CoveragePool::default();
        let coverage = pool.add_coverage([gid(1), gid(4)]);
        let subtable = Subtable::LigatureSubst {
            coverage,
            sets: vec![
                vec![
                    Ligature {
                        glyph: gid(10),
                        components: vec![gid(2), gid(3)],
                    },
                    Ligature {
                        glyph: gid(11),
                        components: vec![gid(2)],
                    },
                ],
                vec![Ligature {
                    glyph: gid(12),
                    components: vec![gid(5)],
                }],
            ],
        };
        let bytes = write_with_pool(&subtable, &pool);
        assert_eq!(bytes.len(), subtable.size() + pool.size_of(PoolRef::Coverage(coverage)));
        // first ligature set follows the two set offsets
        assert_eq!(&bytes[6..8], &[0, 10]);
    }

    #[test]
    fn mark_attach_anchor_offsets() {
        let mut pool = CoveragePool::default();
        let marks = pool.add_coverage([gid(20)]);
        let bases = pool.add_coverage([gid(1), gid(2)]);
        let anchor = |x| ResolvedAnchor {
            x: ResolvedMetric { value: x, var: None },
            y: ResolvedMetric::default(),
            contour_point: None,
        };
        let anchors: IndexSet<_> = [anchor(0), anchor(100)].into_iter().collect();
        let subtable = Subtable::MarkAttach(MarkAttach {
            mark_coverage: marks,
            base_coverage: bases,
            class_count: 1,
            marks: vec![(0, 0)],
            bases: vec![vec![Some(1)], vec![None]],
            anchors,
        });
        let bytes = write_with_pool(&subtable, &pool);
        // header 12, mark array 6, base array 2 + 2 * 2
        let base_array = 18;
        let anchors_start = base_array + 6;
        // mark record anchor offset, from the mark array
        assert_eq!(&bytes[16..18], &[0, (anchors_start - 12) as u8]);
        // first base points at the second anchor; the second has none
        let second_anchor = anchors_start + 6 - base_array;
        assert_eq!(&bytes[20..22], &[0, second_anchor as u8]);
        assert_eq!(&bytes[22..24], &[0, 0]);
        assert_eq!(
            bytes.len(),
            subtable.size() + pool.size_of(PoolRef::Coverage(marks)) + pool.size_of(PoolRef::Coverage(bases))
        );
    }

    #[test]
    fn unknown_label_is_an_error() {
        let mut pool = CoveragePool::default();
        let input = pool.add_coverage([gid(1)]);
        let subtable = Subtable::ChainContext(ChainContext {
            backtrack: vec![],
            input: vec![input],
            lookahead: vec![],
            records: vec![(0, Label::new_for_test(9))],
        });
        let mut positions = HashMap::new();
        positions.insert(PoolRef::Coverage(input), subtable.size());
        let lookup_indices = HashMap::new();
        let remap = VariationIndexRemapping::default();
        let ctx = WriteContext {
            pool_positions: &positions,
            lookup_indices: &lookup_indices,
            remap: &remap,
        };
        let mut writer = TableWriter::default();
        assert!(matches!(
            subtable.write(&mut writer, &ctx),
            Err(WriteError::UnknownLabel(_))
        ));
    }
}
