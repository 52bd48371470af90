//! The [GDEF] table
//!
//! [GDEF]: https://learn.microsoft.com/en-us/typography/opentype/spec/gdef

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;
use otl_types::{GlyphId16, MajorMinor};

use crate::{
    coverage::{ClassDef, ClassDefBuilder, Coverage, CoverageBuilder},
    error::{Error, Overflow},
    rules::{Location, Rule},
    value::{DeviceOffsets, Metric, ResolvedMetric, ValuePool},
    variations::{ItemVariationStore, VariationIndexRemapping},
    write::TableWriter,
};

const CONTEXT: &str = "GDEF";

/// The class of a glyph, as recorded in the glyph class definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GlyphClassDef {
    Base = 1,
    Ligature = 2,
    Mark = 3,
    Component = 4,
}

/// A ligature caret position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CaretValue {
    /// An x or y coordinate, in design units; may vary.
    Coordinate(Metric),
    /// A contour point index.
    PointIndex(u16),
}

impl CaretValue {
    fn sort_key(&self) -> (u8, i32) {
        match self {
            CaretValue::Coordinate(metric) => (0, metric.default as i32),
            CaretValue::PointIndex(point) => (1, *point as i32),
        }
    }
}

/// Collects the contents of the GDEF table.
#[derive(Clone, Debug, Default)]
pub struct GdefBuilder {
    glyph_classes: BTreeMap<GlyphId16, GlyphClassDef>,
    inferred_classes: BTreeMap<GlyphId16, GlyphClassDef>,
    attach_points: BTreeMap<GlyphId16, BTreeSet<u16>>,
    lig_carets: BTreeMap<GlyphId16, Vec<CaretValue>>,
    mark_attach_classes: IndexSet<BTreeSet<GlyphId16>>,
    mark_attach_class_of: BTreeMap<GlyphId16, u16>,
    mark_glyph_sets: IndexSet<BTreeSet<GlyphId16>>,
}

impl GdefBuilder {
    /// Set the class of `glyph`.
    ///
    /// Once any class is set explicitly, classes are no longer inferred
    /// from mark attachment rules.
    pub fn set_glyph_class(&mut self, glyph: GlyphId16, class: GlyphClassDef) {
        self.glyph_classes.insert(glyph, class);
    }

    pub fn add_attach_points(&mut self, glyph: GlyphId16, points: impl IntoIterator<Item = u16>) {
        self.attach_points.entry(glyph).or_default().extend(points);
    }

    /// Set the ligature carets of `glyph`.
    ///
    /// Returns `false`, and keeps the existing carets, if the glyph already
    /// has carets.
    pub fn add_lig_carets(&mut self, glyph: GlyphId16, mut carets: Vec<CaretValue>) -> bool {
        if self.lig_carets.contains_key(&glyph) {
            log::warn!("{CONTEXT}: ignoring second set of ligature carets for {glyph}");
            return false;
        }
        carets.sort_by_key(CaretValue::sort_key);
        self.lig_carets.insert(glyph, carets);
        true
    }

    /// Define a mark attachment class, returning its number.
    ///
    /// Classes are numbered from 1; defining the same set of glyphs again
    /// returns the existing class. `location` is where the class is defined,
    /// and is reported if a glyph already belongs to another class.
    pub fn add_mark_attachment_class(
        &mut self,
        location: &Location,
        glyphs: impl IntoIterator<Item = GlyphId16>,
    ) -> Result<u16, Error> {
        let glyphs = glyphs.into_iter().collect::<BTreeSet<_>>();
        if let Some(ix) = self.mark_attach_classes.get_index_of(&glyphs) {
            return Ok(ix as u16 + 1);
        }
        let class = self.mark_attach_classes.len() + 1;
        if class > u8::MAX as usize {
            return Err(Error::overflow(
                CONTEXT,
                Overflow {
                    what: "mark attachment class",
                    value: class,
                    limit: u8::MAX as usize,
                },
            ));
        }
        let class = class as u16;
        if let Some((glyph, first)) = glyphs
            .iter()
            .find_map(|glyph| Some((*glyph, *self.mark_attach_class_of.get(glyph)?)))
        {
            return Err(Error::MarkClassConflict {
                context: location.to_string(),
                glyph,
                first,
                second: class,
            });
        }
        self.mark_attach_class_of
            .extend(glyphs.iter().map(|glyph| (*glyph, class)));
        self.mark_attach_classes.insert(glyphs);
        Ok(class)
    }

    /// Define a mark glyph set, returning its index.
    ///
    /// Identical sets share an index.
    pub fn add_mark_filter_set(&mut self, glyphs: impl IntoIterator<Item = GlyphId16>) -> u16 {
        let (ix, _) = self
            .mark_glyph_sets
            .insert_full(glyphs.into_iter().collect());
        ix as u16
    }

    pub(crate) fn has_mark_attachment_class(&self, class: u16) -> bool {
        class >= 1 && class as usize <= self.mark_attach_classes.len()
    }

    pub(crate) fn has_mark_filter_set(&self, set: u16) -> bool {
        (set as usize) < self.mark_glyph_sets.len()
    }

    /// Record the glyph roles implied by a mark attachment rule.
    pub(crate) fn infer_from_rule(&mut self, rule: &Rule) {
        let (others, attachments, role) = match rule {
            Rule::MarkToBase { bases, attachments } => {
                (bases, attachments.iter().collect::<Vec<_>>(), GlyphClassDef::Base)
            }
            Rule::MarkToMark {
                base_marks,
                attachments,
            } => (base_marks, attachments.iter().collect(), GlyphClassDef::Mark),
            Rule::MarkToLigature {
                ligatures,
                components,
            } => (
                ligatures,
                components.iter().flatten().collect(),
                GlyphClassDef::Ligature,
            ),
            _ => return,
        };
        let marks = attachments
            .into_iter()
            .flat_map(|attachment| attachment.mark_class.marks.iter().map(|(glyph, _)| *glyph));
        for (glyph, class) in others
            .iter()
            .map(|glyph| (glyph, role))
            .chain(marks.map(|glyph| (glyph, GlyphClassDef::Mark)))
        {
            // marks win over ligatures, ligatures over bases
            let entry = self.inferred_classes.entry(glyph).or_insert(class);
            *entry = (*entry).max(class);
        }
    }

    /// Resolve caret values and freeze the contents.
    pub(crate) fn build(
        self,
        infer_glyph_classes: bool,
        values: &mut ValuePool,
    ) -> Result<GdefTable, Error> {
        let classes = if self.glyph_classes.is_empty() && infer_glyph_classes {
            if !self.inferred_classes.is_empty() {
                log::debug!(
                    "{CONTEXT}: inferred classes for {} glyphs",
                    self.inferred_classes.len()
                );
            }
            self.inferred_classes
        } else {
            self.glyph_classes
        };
        let glyph_classes = (!classes.is_empty()).then(|| {
            classes
                .into_iter()
                .map(|(glyph, class)| (glyph, class as u16))
                .collect::<ClassDefBuilder>()
                .build()
        });
        let attach_list = (!self.attach_points.is_empty()).then(|| AttachList {
            coverage: self.attach_points.keys().copied().collect::<CoverageBuilder>().build(),
            points: self
                .attach_points
                .into_values()
                .map(|points| points.into_iter().collect())
                .collect(),
        });
        let lig_caret_list = if self.lig_carets.is_empty() {
            None
        } else {
            let coverage = self.lig_carets.keys().copied().collect::<CoverageBuilder>().build();
            let mut ligatures = Vec::with_capacity(self.lig_carets.len());
            for (glyph, carets) in self.lig_carets {
                let context = format!("{CONTEXT} ligature carets for {glyph}");
                let resolved = carets
                    .iter()
                    .map(|caret| match caret {
                        CaretValue::Coordinate(metric) => values
                            .resolve_metric(metric, &context)
                            .map(ResolvedCaret::Coordinate),
                        CaretValue::PointIndex(point) => Ok(ResolvedCaret::Point(*point)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                ligatures.push(resolved);
            }
            Some(LigCaretList {
                coverage,
                ligatures,
            })
        };
        let mark_attach_class_def = (!self.mark_attach_class_of.is_empty()).then(|| {
            self.mark_attach_class_of
                .into_iter()
                .collect::<ClassDefBuilder>()
                .build()
        });
        let mark_glyph_sets = self
            .mark_glyph_sets
            .into_iter()
            .map(|glyphs| glyphs.into_iter().collect::<CoverageBuilder>().build())
            .collect();
        Ok(GdefTable {
            glyph_classes,
            attach_list,
            lig_caret_list,
            mark_attach_class_def,
            mark_glyph_sets,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ResolvedCaret {
    Coordinate(ResolvedMetric),
    Point(u16),
}

impl ResolvedCaret {
    fn size(&self) -> usize {
        match self {
            ResolvedCaret::Coordinate(ResolvedMetric { var: Some(_), .. }) => {
                6 + DeviceOffsets::DEVICE_SIZE
            }
            _ => 4,
        }
    }

    fn write(
        &self,
        writer: &mut TableWriter,
        remap: &VariationIndexRemapping,
    ) -> Result<(), Overflow> {
        let start = writer.position();
        match self {
            ResolvedCaret::Coordinate(ResolvedMetric { value, var: None }) => {
                writer.write(&1u16);
                writer.write(value);
            }
            ResolvedCaret::Coordinate(ResolvedMetric {
                value,
                var: Some(id),
            }) => {
                let devices = DeviceOffsets::place([*id], start + 6);
                writer.write(&3u16);
                writer.write(value);
                writer.offset16(start, devices.dev_offset(*id), "caret device offset")?;
                devices.write_tables(writer, remap);
            }
            ResolvedCaret::Point(point) => {
                writer.write(&2u16);
                writer.write(point);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct AttachList {
    coverage: Coverage,
    points: Vec<Vec<u16>>,
}

impl AttachList {
    fn size(&self) -> usize {
        4 + self
            .points
            .iter()
            .map(|points| 2 + 2 + 2 * points.len())
            .sum::<usize>()
            + self.coverage.size()
    }

    fn write(&self, writer: &mut TableWriter) -> Result<(), Overflow> {
        let start = writer.position();
        let mut pos = start + 4 + 2 * self.points.len();
        let coverage_pos = pos + self.points.iter().map(|p| 2 + 2 * p.len()).sum::<usize>();
        writer.offset16(start, Some(coverage_pos), "attach list coverage offset")?;
        writer.count16(self.points.len(), "attach glyph count")?;
        for points in &self.points {
            writer.offset16(start, Some(pos), "attach point offset")?;
            pos += 2 + 2 * points.len();
        }
        for points in &self.points {
            writer.count16(points.len(), "attach point count")?;
            writer.write(points.as_slice());
        }
        writer.write(&self.coverage);
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct LigCaretList {
    coverage: Coverage,
    ligatures: Vec<Vec<ResolvedCaret>>,
}

fn lig_glyph_size(carets: &[ResolvedCaret]) -> usize {
    2 + carets.iter().map(|caret| 2 + caret.size()).sum::<usize>()
}

impl LigCaretList {
    fn size(&self) -> usize {
        4 + self
            .ligatures
            .iter()
            .map(|carets| 2 + lig_glyph_size(carets))
            .sum::<usize>()
            + self.coverage.size()
    }

    fn write(
        &self,
        writer: &mut TableWriter,
        remap: &VariationIndexRemapping,
    ) -> Result<(), Overflow> {
        let start = writer.position();
        let mut pos = start + 4 + 2 * self.ligatures.len();
        let coverage_pos = pos + self.ligatures.iter().map(|c| lig_glyph_size(c)).sum::<usize>();
        writer.offset16(start, Some(coverage_pos), "lig caret list coverage offset")?;
        writer.count16(self.ligatures.len(), "ligature glyph count")?;
        for carets in &self.ligatures {
            writer.offset16(start, Some(pos), "lig glyph offset")?;
            pos += lig_glyph_size(carets);
        }
        // each LigGlyph is followed by its caret values
        for carets in &self.ligatures {
            let lig_start = writer.position();
            writer.count16(carets.len(), "caret count")?;
            let mut caret_pos = lig_start + 2 + 2 * carets.len();
            for caret in carets {
                writer.offset16(lig_start, Some(caret_pos), "caret value offset")?;
                caret_pos += caret.size();
            }
            for caret in carets {
                caret.write(writer, remap)?;
            }
        }
        writer.write(&self.coverage);
        Ok(())
    }
}

/// The frozen contents of a GDEF table, waiting for the variation store.
#[derive(Clone, Debug)]
pub(crate) struct GdefTable {
    glyph_classes: Option<ClassDef>,
    attach_list: Option<AttachList>,
    lig_caret_list: Option<LigCaretList>,
    mark_attach_class_def: Option<ClassDef>,
    mark_glyph_sets: Vec<Coverage>,
}

impl GdefTable {
    pub(crate) fn is_empty(&self) -> bool {
        self.glyph_classes.is_none()
            && self.attach_list.is_none()
            && self.lig_caret_list.is_none()
            && self.mark_attach_class_def.is_none()
            && self.mark_glyph_sets.is_empty()
    }

    fn version(&self, store: Option<&ItemVariationStore>) -> MajorMinor {
        if store.is_some() {
            MajorMinor::VERSION_1_3
        } else if !self.mark_glyph_sets.is_empty() {
            MajorMinor::VERSION_1_2
        } else {
            MajorMinor::VERSION_1_0
        }
    }

    fn mark_glyph_sets_size(&self) -> usize {
        4 + 4 * self.mark_glyph_sets.len()
            + self.mark_glyph_sets.iter().map(Coverage::size).sum::<usize>()
    }

    /// Write the table, with `store` as its variation store.
    pub(crate) fn write(
        &self,
        store: Option<&ItemVariationStore>,
        remap: &VariationIndexRemapping,
    ) -> Result<Vec<u8>, Error> {
        let overflow = |e| Error::overflow(CONTEXT, e);
        let version = self.version(store);
        let header_size = match version {
            MajorMinor::VERSION_1_3 => 18,
            MajorMinor::VERSION_1_2 => 14,
            _ => 12,
        };
        let mut pos = header_size;
        let mut place = |size: Option<usize>| {
            size.map(|size| {
                let at = pos;
                pos += size;
                at
            })
        };
        let glyph_classes = place(self.glyph_classes.as_ref().map(ClassDef::size));
        let attach_list = place(self.attach_list.as_ref().map(AttachList::size));
        let lig_caret_list = place(self.lig_caret_list.as_ref().map(LigCaretList::size));
        let mark_attach = place(self.mark_attach_class_def.as_ref().map(ClassDef::size));
        let mark_glyph_sets = place(
            (version != MajorMinor::VERSION_1_0 && !self.mark_glyph_sets.is_empty())
                .then(|| self.mark_glyph_sets_size()),
        );
        let var_store = place(store.map(ItemVariationStore::size));

        let mut writer = TableWriter::default();
        writer.write(&version);
        writer
            .offset16(0, glyph_classes, "glyph class def offset")
            .map_err(overflow)?;
        writer
            .offset16(0, attach_list, "attach list offset")
            .map_err(overflow)?;
        writer
            .offset16(0, lig_caret_list, "lig caret list offset")
            .map_err(overflow)?;
        writer
            .offset16(0, mark_attach, "mark attach class def offset")
            .map_err(overflow)?;
        if version != MajorMinor::VERSION_1_0 {
            writer
                .offset16(0, mark_glyph_sets, "mark glyph sets def offset")
                .map_err(overflow)?;
        }
        if version == MajorMinor::VERSION_1_3 {
            writer
                .offset32(0, var_store, "item variation store offset")
                .map_err(overflow)?;
        }
        if let Some(class_def) = &self.glyph_classes {
            writer.write(class_def);
        }
        if let Some(attach_list) = &self.attach_list {
            attach_list.write(&mut writer).map_err(overflow)?;
        }
        if let Some(carets) = &self.lig_caret_list {
            carets.write(&mut writer, remap).map_err(overflow)?;
        }
        if let Some(class_def) = &self.mark_attach_class_def {
            writer.write(class_def);
        }
        if mark_glyph_sets.is_some() {
            let start = writer.position();
            // format
            writer.write(&1u16);
            writer
                .count16(self.mark_glyph_sets.len(), "mark glyph set count")
                .map_err(overflow)?;
            let mut pos = start + 4 + 4 * self.mark_glyph_sets.len();
            for coverage in &self.mark_glyph_sets {
                writer
                    .offset32(start, Some(pos), "mark glyph set offset")
                    .map_err(overflow)?;
                pos += coverage.size();
            }
            for coverage in &self.mark_glyph_sets {
                writer.write(coverage);
            }
        }
        if let Some(store) = store {
            writer.write(store);
        }
        debug_assert_eq!(writer.position(), pos);
        Ok(writer.into_data())
    }
}
