//! Laying out and writing a GSUB or GPOS table
//!
//! Every part of the table has a size that is known before anything is
//! written, so the layout is computed up front:
//!
//! ```text
//! header | ScriptList | FeatureList (+ params) | LookupList | Lookups
//!        | subtables (or 8-byte extension shims)
//!        | shared coverage/ClassDef region
//!        | extension payloads, each followed by its own coverages
//! ```
//!
//! If a plain lookup cannot reach its subtables, or a subtable cannot reach
//! its coverage, with a 16-bit offset, that lookup is promoted to an
//! extension lookup and the layout is recomputed.

use std::collections::{BTreeMap, HashMap};

use indexmap::{IndexMap, IndexSet};
use otl_types::Tag;

use crate::{
    compiler::Label,
    coverage::{CoveragePool, PoolRef},
    error::{Error, Overflow},
    info::{FeatureKey, Lookup},
    options::CompilerOptions,
    params::FeatureParams,
    subtable::{WriteContext, WriteError, EXTENSION_SIZE},
    variations::VariationIndexRemapping,
    write::{check_offset16, TableWriter},
};

const HEADER_SIZE: usize = 10;
const DFLT_LANG: Tag = Tag::new(b"dflt");

/// The lookups registered under one feature key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FeatureEntry {
    pub key: FeatureKey,
    pub lookups: Vec<Label>,
    pub params: Option<FeatureParams>,
}

/// One record of the written FeatureList.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureRecord {
    pub tag: Tag,
    pub lookups: Vec<u16>,
    pub params: Option<FeatureParams>,
}

/// Where everything ended up in a written table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutIndex {
    /// The final index of every lookup, in lookup list order.
    pub lookups: IndexMap<Label, u16>,
    /// The FeatureList, in order.
    pub features: Vec<FeatureRecord>,
    /// The feature indices of each (script, language).
    pub scripts: BTreeMap<(Tag, Tag), Vec<u16>>,
    /// Lookups that were written as extension lookups.
    pub extension_lookups: Vec<u16>,
}

impl LayoutIndex {
    pub fn lookup_index(&self, label: Label) -> Option<u16> {
        self.lookups.get(&label).copied()
    }
}

/// Everything needed to build one table.
pub(crate) struct TableInput<'a> {
    pub tag: Tag,
    pub lookups: &'a [Lookup],
    pub features: &'a [FeatureEntry],
    pub coverages: &'a CoveragePool,
    pub remap: &'a VariationIndexRemapping,
    pub options: &'a CompilerOptions,
}

/// Positions of everything after the lookup tables.
#[derive(Debug, Default)]
struct Layout {
    lookup_list: usize,
    lookups: Vec<usize>,
    /// Body, or extension shim, of each subtable
    subtables: Vec<Vec<usize>>,
    /// Extension payload position, and the private copies of its coverages
    payloads: Vec<Vec<Option<(usize, HashMap<PoolRef, usize>)>>>,
    shared_pool: HashMap<PoolRef, usize>,
    shared_order: Vec<PoolRef>,
    total: usize,
}

struct ScriptEntry {
    tag: Tag,
    default: Option<Vec<u16>>,
    languages: Vec<(Tag, Vec<u16>)>,
}

struct Assembler<'a> {
    input: TableInput<'a>,
    context: String,
    lookup_indices: HashMap<Label, u16>,
    features: Vec<FeatureRecord>,
    scripts: Vec<ScriptEntry>,
    script_list_size: usize,
    feature_list_size: usize,
}

fn lookup_table_size(lookup: &Lookup) -> usize {
    6 + 2 * lookup.subtables.len() + if lookup.mark_filter_set.is_some() { 2 } else { 0 }
}

fn lang_sys_size(features: &[u16]) -> usize {
    6 + 2 * features.len()
}

impl<'a> Assembler<'a> {
    fn new(input: TableInput<'a>) -> Result<Self, Error> {
        let context = format!("table '{}'", input.tag);
        let mut lookup_indices = HashMap::new();
        for (ix, lookup) in input.lookups.iter().enumerate() {
            let ix = u16::try_from(ix).map_err(|_| {
                Error::overflow(
                    context.clone(),
                    Overflow {
                        what: "lookup count",
                        value: input.lookups.len(),
                        limit: u16::MAX as usize,
                    },
                )
            })?;
            lookup_indices.insert(lookup.label, ix);
        }

        // one record per distinct (tag, lookups, params)
        let mut records = IndexSet::new();
        let mut record_for_key = Vec::with_capacity(input.features.len());
        for entry in input.features {
            let mut lookups = Vec::with_capacity(entry.lookups.len());
            for label in &entry.lookups {
                let ix = lookup_indices.get(label).ok_or_else(|| Error::UnknownLabel {
                    context: format!("{} in {context}", entry.key),
                    label: *label,
                })?;
                lookups.push(*ix);
            }
            lookups.sort_unstable();
            lookups.dedup();
            let (ix, _) = records.insert_full((entry.key.feature, lookups, entry.params.clone()));
            record_for_key.push((entry.key, ix));
        }
        let mut order = (0..records.len()).collect::<Vec<_>>();
        order.sort_by(|a, b| {
            let (a_tag, a_lookups, _) = &records[*a];
            let (b_tag, b_lookups, _) = &records[*b];
            (a_tag, a_lookups).cmp(&(b_tag, b_lookups))
        });
        let mut final_index = vec![0u16; records.len()];
        for (new_ix, old_ix) in order.iter().enumerate() {
            final_index[*old_ix] = u16::try_from(new_ix).map_err(|_| {
                Error::overflow(
                    context.clone(),
                    Overflow {
                        what: "feature count",
                        value: records.len(),
                        limit: u16::MAX as usize,
                    },
                )
            })?;
        }
        let features = order
            .iter()
            .map(|ix| {
                let (tag, lookups, params) = records[*ix].clone();
                FeatureRecord {
                    tag,
                    lookups,
                    params,
                }
            })
            .collect::<Vec<_>>();

        let mut by_script: BTreeMap<Tag, BTreeMap<Tag, Vec<u16>>> = BTreeMap::new();
        for (key, record) in record_for_key {
            by_script
                .entry(key.script)
                .or_default()
                .entry(key.language)
                .or_default()
                .push(final_index[record]);
        }
        let scripts = by_script
            .into_iter()
            .map(|(tag, mut languages)| {
                for features in languages.values_mut() {
                    features.sort_unstable();
                    features.dedup();
                }
                let default = languages.remove(&DFLT_LANG);
                ScriptEntry {
                    tag,
                    default,
                    languages: languages.into_iter().collect(),
                }
            })
            .collect::<Vec<_>>();

        let script_list_size = 2 + scripts
            .iter()
            .map(|script| {
                6 + 4
                    + script.default.as_deref().map(lang_sys_size).unwrap_or(0)
                    + script
                        .languages
                        .iter()
                        .map(|(_, features)| 6 + lang_sys_size(features))
                        .sum::<usize>()
            })
            .sum::<usize>();
        let feature_list_size = 2 + features
            .iter()
            .map(|feature| {
                6 + 4
                    + 2 * feature.lookups.len()
                    + feature.params.as_ref().map(FeatureParams::size).unwrap_or(0)
            })
            .sum::<usize>();

        Ok(Assembler {
            input,
            context,
            lookup_indices,
            features,
            scripts,
            script_list_size,
            feature_list_size,
        })
    }

    fn layout(&self, extension: &[bool]) -> Layout {
        let coverages = self.input.coverages;
        let lookups = self.input.lookups;
        let mut layout = Layout {
            lookup_list: HEADER_SIZE + self.script_list_size + self.feature_list_size,
            ..Default::default()
        };
        let mut pos = layout.lookup_list + 2 + 2 * lookups.len();
        for lookup in lookups {
            layout.lookups.push(pos);
            pos += lookup_table_size(lookup);
        }
        for (lookup, is_ext) in lookups.iter().zip(extension) {
            let mut positions = Vec::with_capacity(lookup.subtables.len());
            for subtable in &lookup.subtables {
                positions.push(pos);
                pos += if *is_ext {
                    EXTENSION_SIZE
                } else {
                    subtable.size()
                };
            }
            layout.subtables.push(positions);
        }
        for (lookup, is_ext) in lookups.iter().zip(extension) {
            if *is_ext {
                continue;
            }
            for item in lookup.subtables.iter().flat_map(|sub| sub.pool_refs()) {
                if let std::collections::hash_map::Entry::Vacant(entry) =
                    layout.shared_pool.entry(item)
                {
                    entry.insert(pos);
                    layout.shared_order.push(item);
                    pos += coverages.size_of(item);
                }
            }
        }
        for (lookup, is_ext) in lookups.iter().zip(extension) {
            let mut payloads = Vec::with_capacity(lookup.subtables.len());
            for subtable in &lookup.subtables {
                if !*is_ext {
                    payloads.push(None);
                    continue;
                }
                let start = pos;
                pos += subtable.size();
                let mut inline = HashMap::new();
                for item in subtable.pool_refs() {
                    inline.insert(item, pos);
                    pos += coverages.size_of(item);
                }
                payloads.push(Some((start, inline)));
            }
            layout.payloads.push(payloads);
        }
        layout.total = pos;
        layout
    }

    /// The plain lookups that cannot reach their subtables or coverages.
    fn overflowing(&self, layout: &Layout, extension: &[bool]) -> Vec<usize> {
        let mut result = Vec::new();
        for (ix, lookup) in self.input.lookups.iter().enumerate() {
            if extension[ix] {
                continue;
            }
            let lookup_pos = layout.lookups[ix];
            let overflows = lookup.subtables.iter().enumerate().any(|(sub_ix, subtable)| {
                let sub_pos = layout.subtables[ix][sub_ix];
                check_offset16(lookup_pos, sub_pos, "subtable offset").is_err()
                    || subtable.pool_refs().into_iter().any(|item| {
                        let target = layout.shared_pool.get(&item).copied().unwrap_or_default();
                        check_offset16(sub_pos, target, "coverage offset").is_err()
                    })
            });
            if overflows {
                result.push(ix);
            }
        }
        result
    }

    fn run(self) -> Result<(Vec<u8>, LayoutIndex), Error> {
        let options = self.input.options;
        let mut extension = self
            .input
            .lookups
            .iter()
            .map(|lookup| lookup.use_extension || options.use_extension_lookups)
            .collect::<Vec<_>>();
        for iteration in 0..options.max_layout_iterations {
            let layout = self.layout(&extension);
            let overflowing = self.overflowing(&layout, &extension);
            if overflowing.is_empty() || !options.auto_extension {
                log::debug!(
                    "{}: layout settled after {} passes, {} bytes",
                    self.context,
                    iteration + 1,
                    layout.total
                );
                return self.write(&layout, &extension);
            }
            for ix in overflowing {
                log::info!(
                    "{}: promoting {} to an extension lookup",
                    self.context,
                    self.input.lookups[ix].context
                );
                extension[ix] = true;
            }
        }
        Err(Error::NotConverged {
            table: self.input.tag,
            iterations: options.max_layout_iterations,
        })
    }

    fn overflow(&self, overflow: Overflow) -> Error {
        Error::overflow(self.context.clone(), overflow)
    }

    fn write(&self, layout: &Layout, extension: &[bool]) -> Result<(Vec<u8>, LayoutIndex), Error> {
        let mut writer = TableWriter::default();
        let script_list = HEADER_SIZE;
        let feature_list = script_list + self.script_list_size;

        // header, version 1.0
        writer.write(&1u16);
        writer.write(&0u16);
        writer.offset16(0, Some(script_list), "script list offset")
            .map_err(|e| self.overflow(e))?;
        writer.offset16(0, Some(feature_list), "feature list offset")
            .map_err(|e| self.overflow(e))?;
        writer.offset16(0, Some(layout.lookup_list), "lookup list offset")
            .map_err(|e| self.overflow(e))?;

        self.write_script_list(&mut writer).map_err(|e| self.overflow(e))?;
        debug_assert_eq!(writer.position(), feature_list);
        self.write_feature_list(&mut writer).map_err(|e| self.overflow(e))?;
        debug_assert_eq!(writer.position(), layout.lookup_list);

        let lookups = self.input.lookups;
        writer
            .count16(lookups.len(), "lookup count")
            .map_err(|e| self.overflow(e))?;
        for pos in &layout.lookups {
            writer
                .offset16(layout.lookup_list, Some(*pos), "lookup offset")
                .map_err(|e| self.overflow(e))?;
        }
        for (ix, lookup) in lookups.iter().enumerate() {
            debug_assert_eq!(writer.position(), layout.lookups[ix]);
            let lookup_type = if extension[ix] {
                lookup.kind.extension_type()
            } else {
                lookup.kind.lookup_type()
            };
            let flags = lookup
                .flags
                .with_use_mark_filtering_set(lookup.mark_filter_set.is_some());
            let to_error = |e| Error::overflow(lookup.context.clone(), e);
            writer.write(&lookup_type);
            writer.write(&flags);
            writer
                .count16(lookup.subtables.len(), "subtable count")
                .map_err(to_error)?;
            for pos in &layout.subtables[ix] {
                writer
                    .offset16(layout.lookups[ix], Some(*pos), "subtable offset")
                    .map_err(to_error)?;
            }
            if let Some(set) = lookup.mark_filter_set {
                writer.write(&set);
            }
        }

        let shared = WriteContext {
            pool_positions: &layout.shared_pool,
            lookup_indices: &self.lookup_indices,
            remap: self.input.remap,
        };
        for (ix, lookup) in lookups.iter().enumerate() {
            for (sub_ix, subtable) in lookup.subtables.iter().enumerate() {
                debug_assert_eq!(writer.position(), layout.subtables[ix][sub_ix]);
                match &layout.payloads[ix][sub_ix] {
                    Some((payload, _)) => {
                        let start = writer.position();
                        writer.write(&1u16);
                        writer.write(&lookup.kind.lookup_type());
                        writer
                            .offset32(start, Some(*payload), "extension offset")
                            .map_err(|e| Error::overflow(lookup.context.clone(), e))?;
                    }
                    None => subtable
                        .write(&mut writer, &shared)
                        .map_err(|e| write_error(lookup, e))?,
                }
            }
        }
        for item in &layout.shared_order {
            debug_assert_eq!(Some(&writer.position()), layout.shared_pool.get(item));
            self.input.coverages.write_item(*item, &mut writer);
        }
        for (ix, lookup) in lookups.iter().enumerate() {
            for (sub_ix, subtable) in lookup.subtables.iter().enumerate() {
                let Some((payload, inline)) = &layout.payloads[ix][sub_ix] else {
                    continue;
                };
                debug_assert_eq!(writer.position(), *payload);
                let ctx = WriteContext {
                    pool_positions: inline,
                    lookup_indices: &self.lookup_indices,
                    remap: self.input.remap,
                };
                subtable
                    .write(&mut writer, &ctx)
                    .map_err(|e| write_error(lookup, e))?;
                for item in subtable.pool_refs() {
                    self.input.coverages.write_item(item, &mut writer);
                }
            }
        }
        debug_assert_eq!(writer.position(), layout.total);

        let index = LayoutIndex {
            lookups: lookups
                .iter()
                .enumerate()
                .map(|(ix, lookup)| (lookup.label, ix as u16))
                .collect(),
            features: self.features.clone(),
            scripts: self
                .scripts
                .iter()
                .flat_map(|script| {
                    script
                        .default
                        .iter()
                        .map(|features| ((script.tag, DFLT_LANG), features.clone()))
                        .chain(
                            script
                                .languages
                                .iter()
                                .map(|(lang, features)| ((script.tag, *lang), features.clone())),
                        )
                })
                .collect(),
            extension_lookups: extension
                .iter()
                .enumerate()
                .filter(|(_, is_ext)| **is_ext)
                .map(|(ix, _)| ix as u16)
                .collect(),
        };
        Ok((writer.into_data(), index))
    }

    fn write_script_list(&self, writer: &mut TableWriter) -> Result<(), Overflow> {
        let start = writer.position();
        writer.count16(self.scripts.len(), "script count")?;
        let mut pos = start + 2 + 6 * self.scripts.len();
        let mut script_positions = Vec::with_capacity(self.scripts.len());
        for script in &self.scripts {
            writer.write(&script.tag);
            writer.offset16(start, Some(pos), "script offset")?;
            script_positions.push(pos);
            pos += 4
                + script.default.as_deref().map(lang_sys_size).unwrap_or(0)
                + script
                    .languages
                    .iter()
                    .map(|(_, features)| 6 + lang_sys_size(features))
                    .sum::<usize>();
        }
        for (script, script_start) in self.scripts.iter().zip(script_positions) {
            debug_assert_eq!(writer.position(), script_start);
            let mut pos = script_start + 4 + 6 * script.languages.len();
            let default = script.default.as_ref().map(|_| pos);
            writer.offset16(script_start, default, "default language offset")?;
            pos += script.default.as_deref().map(lang_sys_size).unwrap_or(0);
            writer.count16(script.languages.len(), "language count")?;
            for (tag, features) in &script.languages {
                writer.write(tag);
                writer.offset16(script_start, Some(pos), "language offset")?;
                pos += lang_sys_size(features);
            }
            for features in script
                .default
                .iter()
                .chain(script.languages.iter().map(|(_, features)| features))
            {
                // lookupOrderOffset, reserved
                writer.write(&0u16);
                // no required feature
                writer.write(&0xFFFFu16);
                writer.count16(features.len(), "feature index count")?;
                writer.write(features.as_slice());
            }
        }
        Ok(())
    }

    fn write_feature_list(&self, writer: &mut TableWriter) -> Result<(), Overflow> {
        let start = writer.position();
        writer.count16(self.features.len(), "feature count")?;
        let mut pos = start + 2 + 6 * self.features.len();
        for feature in &self.features {
            writer.write(&feature.tag);
            writer.offset16(start, Some(pos), "feature offset")?;
            pos += 4
                + 2 * feature.lookups.len()
                + feature.params.as_ref().map(FeatureParams::size).unwrap_or(0);
        }
        for feature in &self.features {
            let feature_start = writer.position();
            let params = feature
                .params
                .as_ref()
                .map(|_| feature_start + 4 + 2 * feature.lookups.len());
            writer.offset16(feature_start, params, "feature params offset")?;
            writer.count16(feature.lookups.len(), "lookup index count")?;
            writer.write(feature.lookups.as_slice());
            if let Some(params) = &feature.params {
                writer.write(params);
            }
        }
        Ok(())
    }
}

fn write_error(lookup: &Lookup, error: WriteError) -> Error {
    match error {
        WriteError::Overflow(overflow) => Error::overflow(lookup.context.clone(), overflow),
        WriteError::UnknownLabel(label) => Error::UnknownLabel {
            context: lookup.context.clone(),
            label,
        },
    }
}

/// Lay out and write one table.
pub(crate) fn assemble(input: TableInput) -> Result<(Vec<u8>, LayoutIndex), Error> {
    Assembler::new(input)?.run()
}
