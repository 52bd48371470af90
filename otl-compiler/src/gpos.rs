//! GPOS lookup builders

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use indexmap::IndexSet;
use otl_types::GlyphId16;

use crate::{
    builders::{AddContext, BuildContext, Builder, Compat, TableSplitter},
    coverage::ClassDefBuilder,
    error::{Error, Overflow},
    rules::{GlyphClass, Location, MarkAttachment, MarkClass},
    subtable::{MarkAttach, MarkLig, PairPosClass, PairValue, Subtable},
    value::{AnchorIndex, ResolvedAnchor, ResolvedValue, ValueFormat, ValueIndex, ValuePool},
};

fn conflict(cx: &AddContext, message: String, first: &Location, second: &Location) -> Error {
    Error::ConflictingRule {
        context: cx.context.to_owned(),
        message,
        first: first.clone(),
        second: second.clone(),
    }
}

fn resolve_optional(cx: &mut BuildContext, value: Option<ValueIndex>) -> Result<ResolvedValue, Error> {
    match value {
        Some(ix) => cx.values.resolve_value(ix, cx.context),
        None => Ok(ResolvedValue::default()),
    }
}

fn intern_anchor(
    anchors: &mut IndexSet<ResolvedAnchor>,
    anchor: ResolvedAnchor,
    context: &str,
) -> Result<u16, Error> {
    let (ix, _) = anchors.insert_full(anchor);
    u16::try_from(ix).map_err(|_| {
        Error::overflow(
            context,
            Overflow {
                what: "anchor count",
                value: ix + 1,
                limit: u16::MAX as usize,
            },
        )
    })
}

/// Accumulates single positioning rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct SinglePosBuilder {
    items: BTreeMap<GlyphId16, (ValueIndex, Location)>,
}

impl SinglePosBuilder {
    pub(crate) fn check(&self, glyph: GlyphId16, value: ValueIndex, values: &ValuePool) -> Compat {
        match self.items.get(&glyph) {
            None => Compat::Compatible,
            Some((existing, _)) if values.value(*existing) == values.value(value) => {
                Compat::Duplicate
            }
            Some(_) => Compat::Conflict,
        }
    }

    pub(crate) fn insert(
        &mut self,
        glyph: GlyphId16,
        value: ValueIndex,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        match self.check(glyph, value, cx.values) {
            Compat::Compatible => {
                self.items.insert(glyph, (value, location.clone()));
            }
            Compat::Duplicate => cx.diagnostics.note(
                cx.context,
                format!("removing duplicate single positioning of {glyph} at {location}"),
            ),
            Compat::Conflict => {
                let first = &self.items[&glyph].1;
                return Err(conflict(
                    cx,
                    format!("{glyph} is positioned by two different values"),
                    first,
                    location,
                ));
            }
        }
        Ok(())
    }
}

impl Builder for SinglePosBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        let mut resolved = Vec::with_capacity(self.items.len());
        for (glyph, (value, _)) in &self.items {
            resolved.push((*glyph, cx.values.resolve_value(*value, cx.context)?));
        }

        if resolved.windows(2).all(|pair| pair[0].1 == pair[1].1) {
            let value = resolved[0].1.clone();
            let coverage = cx.coverages.add_coverage(self.items.keys().copied());
            return Ok(vec![Subtable::SinglePos1 { coverage, value }]);
        }

        let format = resolved
            .iter()
            .fold(ValueFormat::empty(), |acc, (_, value)| acc | value.format());
        // format, coverage, value format, count
        let mut splitter = TableSplitter::new(8, "single positioning");
        for (glyph, value) in resolved {
            let size = format.record_size() + 6 * value.var_ids().count();
            splitter.add(glyph, value, size);
        }
        Ok(splitter
            .finish()
            .into_iter()
            .map(|(glyphs, values)| Subtable::SinglePos2 {
                coverage: cx.coverages.add_coverage(glyphs),
                format,
                values,
            })
            .collect())
    }
}

#[derive(Clone, Debug)]
struct PairRule {
    first_value: Option<ValueIndex>,
    second_value: Option<ValueIndex>,
    location: Location,
}

impl PairRule {
    fn same_values(&self, other: &PairRule, cx: &AddContext) -> bool {
        let get = |ix: Option<ValueIndex>| ix.map(|ix| cx.values.value(ix));
        get(self.first_value) == get(other.first_value)
            && get(self.second_value) == get(other.second_value)
    }
}

enum ClassSlot {
    Existing(u16),
    New,
    Overlap,
}

/// A run of class pair rules that can share one format 2 subtable.
#[derive(Clone, Debug, Default)]
struct ClassSegment {
    firsts: Vec<Vec<GlyphId16>>,
    seconds: Vec<Vec<GlyphId16>>,
    first_glyphs: HashMap<GlyphId16, u16>,
    second_glyphs: HashMap<GlyphId16, u16>,
    rules: BTreeMap<(u16, u16), PairRule>,
    format1: ValueFormat,
    format2: ValueFormat,
}

fn formats_compatible(current: ValueFormat, new: ValueFormat) -> bool {
    current.contains(new) || new.contains(current)
}

fn slot(
    classes: &[Vec<GlyphId16>],
    glyphs: &HashMap<GlyphId16, u16>,
    class: &[GlyphId16],
) -> ClassSlot {
    match glyphs.get(&class[0]) {
        Some(ix) if classes[*ix as usize] == class => ClassSlot::Existing(*ix),
        Some(_) => ClassSlot::Overlap,
        None if class.iter().any(|gid| glyphs.contains_key(gid)) => ClassSlot::Overlap,
        None => ClassSlot::New,
    }
}

fn intern_class(
    classes: &mut Vec<Vec<GlyphId16>>,
    glyphs: &mut HashMap<GlyphId16, u16>,
    class: Vec<GlyphId16>,
) -> u16 {
    if let ClassSlot::Existing(ix) = slot(classes, glyphs, &class) {
        return ix;
    }
    let ix = classes.len() as u16;
    glyphs.extend(class.iter().map(|gid| (*gid, ix)));
    classes.push(class);
    ix
}

impl ClassSegment {
    fn accepts(&self, first: &[GlyphId16], second: &[GlyphId16], f1: ValueFormat, f2: ValueFormat) -> bool {
        formats_compatible(self.format1, f1)
            && formats_compatible(self.format2, f2)
            && !matches!(slot(&self.firsts, &self.first_glyphs, first), ClassSlot::Overlap)
            && !matches!(slot(&self.seconds, &self.second_glyphs, second), ClassSlot::Overlap)
    }

    fn build(self, cx: &mut BuildContext) -> Result<Subtable, Error> {
        let mut format1 = ValueFormat::empty();
        let mut format2 = ValueFormat::empty();
        let mut cells = HashMap::new();
        for (key, rule) in &self.rules {
            let one = resolve_optional(cx, rule.first_value)?;
            let two = resolve_optional(cx, rule.second_value)?;
            format1 |= one.format();
            format2 |= two.format();
            cells.insert(*key, (one, two));
        }

        let class1_count = self.firsts.len() as u16;
        // class 0 of the second ClassDef is "everything else"
        let class2_count = self.seconds.len() as u16 + 1;
        let mut records = Vec::with_capacity(class1_count as usize * class2_count as usize);
        for class1 in 0..class1_count {
            records.push(None);
            for class2 in 1..class2_count {
                records.push(cells.remove(&(class1, class2 - 1)));
            }
        }

        let coverage = cx
            .coverages
            .add_coverage(self.firsts.iter().flatten().copied());
        let class_def1 = self
            .firsts
            .iter()
            .enumerate()
            .flat_map(|(ix, class)| class.iter().map(move |gid| (*gid, ix as u16)))
            .collect::<ClassDefBuilder>()
            .end(cx.coverages);
        let class_def2 = self
            .seconds
            .iter()
            .enumerate()
            .flat_map(|(ix, class)| class.iter().map(move |gid| (*gid, ix as u16 + 1)))
            .collect::<ClassDefBuilder>()
            .end(cx.coverages);

        let subtable = Subtable::PairPos2(PairPosClass {
            coverage,
            class_def1,
            class_def2,
            format1,
            format2,
            class1_count,
            class2_count,
            records,
        });
        let total = subtable.size()
            + cx.coverages.coverage(coverage).size()
            + cx.coverages.class_def(class_def1).size()
            + cx.coverages.class_def(class_def2).size();
        if total > u16::MAX as usize {
            return Err(Error::overflow(
                cx.context,
                Overflow {
                    what: "pair positioning class subtable",
                    value: total,
                    limit: u16::MAX as usize,
                },
            ));
        }
        Ok(subtable)
    }
}

/// Accumulates pair positioning rules.
///
/// Pairs of single glyphs (and enumerated class pairs) end up in format 1
/// subtables, written first; class pairs are grouped into format 2
/// subtables in the order they were added.
#[derive(Clone, Debug, Default)]
pub(crate) struct PairPosBuilder {
    pairs: BTreeMap<GlyphId16, BTreeMap<GlyphId16, PairRule>>,
    segments: Vec<ClassSegment>,
    break_pending: bool,
}

fn value_format(cx: &AddContext, value: Option<ValueIndex>) -> ValueFormat {
    value
        .map(|ix| cx.values.value(ix).format())
        .unwrap_or_default()
}

impl PairPosBuilder {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert(
        &mut self,
        first: &GlyphClass,
        second: &GlyphClass,
        first_value: Option<ValueIndex>,
        second_value: Option<ValueIndex>,
        enumerate: bool,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        if first.is_empty() || second.is_empty() {
            return Err(Error::InvalidRule {
                context: cx.context.to_owned(),
                location: location.clone(),
                message: "empty glyph class in pair positioning".into(),
            });
        }
        let rule = PairRule {
            first_value,
            second_value,
            location: location.clone(),
        };
        if enumerate || (first.len() == 1 && second.len() == 1) {
            for one in first.sorted() {
                for two in second.sorted() {
                    self.insert_pair(one, two, rule.clone(), cx);
                }
            }
        } else {
            self.insert_class_pair(first.sorted(), second.sorted(), rule, cx);
        }
        Ok(())
    }

    fn insert_pair(&mut self, first: GlyphId16, second: GlyphId16, rule: PairRule, cx: &mut AddContext) {
        let set = self.pairs.entry(first).or_default();
        match set.get(&second) {
            None => {
                set.insert(second, rule);
            }
            Some(existing) if existing.same_values(&rule, cx) => cx.diagnostics.note(
                cx.context,
                format!("removing duplicate pair {first} {second} at {}", rule.location),
            ),
            Some(existing) => cx.diagnostics.warning(
                cx.context,
                format!(
                    "pair {first} {second} at {} was already positioned at {}; keeping the first",
                    rule.location, existing.location
                ),
            ),
        }
    }

    fn insert_class_pair(
        &mut self,
        first: Vec<GlyphId16>,
        second: Vec<GlyphId16>,
        rule: PairRule,
        cx: &mut AddContext,
    ) {
        let f1 = value_format(cx, rule.first_value);
        let f2 = value_format(cx, rule.second_value);
        let needs_new = self.break_pending
            || self
                .segments
                .last()
                .is_none_or(|segment| !segment.accepts(&first, &second, f1, f2));
        if needs_new {
            if !self.segments.is_empty() {
                log::debug!("{}: new pair class subtable at {}", cx.context, rule.location);
            }
            self.segments.push(ClassSegment::default());
            self.break_pending = false;
        }
        let Some(segment) = self.segments.last_mut() else {
            return;
        };
        segment.format1 |= f1;
        segment.format2 |= f2;
        let class1 = intern_class(&mut segment.firsts, &mut segment.first_glyphs, first);
        let class2 = intern_class(&mut segment.seconds, &mut segment.second_glyphs, second);
        match segment.rules.get(&(class1, class2)) {
            None => {
                segment.rules.insert((class1, class2), rule);
            }
            Some(existing) if existing.same_values(&rule, cx) => cx.diagnostics.note(
                cx.context,
                format!("removing duplicate class pair at {}", rule.location),
            ),
            Some(existing) => cx.diagnostics.warning(
                cx.context,
                format!(
                    "class pair at {} was already positioned at {}; keeping the first",
                    rule.location, existing.location
                ),
            ),
        }
    }

    /// Start a new class pair subtable with the next class pair rule.
    pub(crate) fn add_subtable_break(&mut self) {
        self.break_pending = true;
    }
}

impl Builder for PairPosBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        let mut subtables = Vec::new();
        if !self.pairs.is_empty() {
            let mut format1 = ValueFormat::empty();
            let mut format2 = ValueFormat::empty();
            let mut sets = Vec::with_capacity(self.pairs.len());
            for (first, set) in self.pairs {
                let mut resolved = Vec::with_capacity(set.len());
                for (second, rule) in set {
                    let pair = PairValue {
                        second,
                        first_value: resolve_optional(cx, rule.first_value)?,
                        second_value: resolve_optional(cx, rule.second_value)?,
                    };
                    format1 |= pair.first_value.format();
                    format2 |= pair.second_value.format();
                    resolved.push(pair);
                }
                sets.push((first, resolved));
            }

            let record_size = 2 + format1.record_size() + format2.record_size();
            // format, coverage, two value formats, set count
            let mut splitter = TableSplitter::new(10, "pair positioning");
            for (first, set) in sets {
                let devices: usize = set
                    .iter()
                    .map(|pair| pair.first_value.var_ids().count() + pair.second_value.var_ids().count())
                    .sum();
                // offset, count, records
                let size = 2 + 2 + set.len() * record_size + 6 * devices;
                splitter.add(first, set, size);
            }
            for (glyphs, sets) in splitter.finish() {
                subtables.push(Subtable::PairPos1 {
                    coverage: cx.coverages.add_coverage(glyphs),
                    format1,
                    format2,
                    sets,
                });
            }
        }
        for segment in self.segments {
            if !segment.rules.is_empty() {
                subtables.push(segment.build(cx)?);
            }
        }
        Ok(subtables)
    }
}

/// Accumulates cursive attachment rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct CursiveBuilder {
    items: BTreeMap<GlyphId16, (Option<AnchorIndex>, Option<AnchorIndex>, Location)>,
}

impl CursiveBuilder {
    pub(crate) fn insert(
        &mut self,
        glyph: GlyphId16,
        entry: Option<AnchorIndex>,
        exit: Option<AnchorIndex>,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        if let Some((_, _, first)) = self.items.get(&glyph) {
            return Err(conflict(
                cx,
                format!("{glyph} has more than one cursive attachment"),
                first,
                location,
            ));
        }
        self.items.insert(glyph, (entry, exit, location.clone()));
        Ok(())
    }
}

impl Builder for CursiveBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        let mut anchors = IndexSet::new();
        let mut records = Vec::with_capacity(self.items.len());
        for (entry, exit, _) in self.items.values() {
            let mut record = (None, None);
            if let Some(entry) = entry {
                let anchor = cx.values.resolve_anchor(*entry, cx.context)?;
                record.0 = Some(intern_anchor(&mut anchors, anchor, cx.context)?);
            }
            if let Some(exit) = exit {
                let anchor = cx.values.resolve_anchor(*exit, cx.context)?;
                record.1 = Some(intern_anchor(&mut anchors, anchor, cx.context)?);
            }
            records.push(record);
        }
        let coverage = cx.coverages.add_coverage(self.items.keys().copied());
        Ok(vec![Subtable::Cursive {
            coverage,
            records,
            anchors,
        }])
    }
}

/// The marks of one mark attachment lookup, with their classes.
#[derive(Clone, Debug, Default)]
struct MarkSet {
    classes: IndexSet<Arc<str>>,
    marks: BTreeMap<GlyphId16, (u16, AnchorIndex, Location)>,
}

impl MarkSet {
    fn add_class(
        &mut self,
        class: &MarkClass,
        location: &Location,
        cx: &AddContext,
    ) -> Result<u16, Error> {
        let (class_ix, _) = self.classes.insert_full(class.name.clone());
        let class_ix = class_ix as u16;
        for (glyph, anchor) in &class.marks {
            match self.marks.get(glyph) {
                None => {
                    self.marks
                        .insert(*glyph, (class_ix, *anchor, location.clone()));
                }
                Some((existing, _, first)) if *existing != class_ix => {
                    let existing = &self.classes[*existing as usize];
                    return Err(conflict(
                        cx,
                        format!(
                            "mark {glyph} is in both mark class '{existing}' and '{}'",
                            class.name
                        ),
                        first,
                        location,
                    ));
                }
                Some((_, existing, first)) => {
                    if cx.values.anchor(*existing) != cx.values.anchor(*anchor) {
                        return Err(Error::AnchorConflict {
                            context: cx.context.to_owned(),
                            glyph: *glyph,
                            slot: format!("mark anchor in class '{}'", class.name),
                            first: first.clone(),
                            second: location.clone(),
                        });
                    }
                }
            }
        }
        Ok(class_ix)
    }

    fn class_name(&self, class: u16) -> &str {
        self.classes
            .get_index(class as usize)
            .map(|name| name.as_ref())
            .unwrap_or_default()
    }

    fn class_count(&self) -> u16 {
        self.classes.len() as u16
    }

    /// Resolve the mark array, in mark coverage order.
    fn build(
        &self,
        anchors: &mut IndexSet<ResolvedAnchor>,
        cx: &mut BuildContext,
    ) -> Result<Vec<(u16, u16)>, Error> {
        let mut records = Vec::with_capacity(self.marks.len());
        for (class, anchor, _) in self.marks.values() {
            let anchor = cx.values.resolve_anchor(*anchor, cx.context)?;
            records.push((*class, intern_anchor(anchors, anchor, cx.context)?));
        }
        Ok(records)
    }

    fn glyphs(&self) -> impl Iterator<Item = GlyphId16> + '_ {
        self.marks.keys().copied()
    }
}

/// Add one anchor per mark class to `slots`, checking for conflicts.
fn add_attachments(
    marks: &mut MarkSet,
    slots: &mut BTreeMap<u16, (AnchorIndex, Location)>,
    glyph: GlyphId16,
    attachments: &[MarkAttachment],
    slot_prefix: &str,
    location: &Location,
    cx: &AddContext,
) -> Result<(), Error> {
    for attachment in attachments {
        let class = marks.add_class(&attachment.mark_class, location, cx)?;
        match slots.get(&class) {
            None => {
                slots.insert(class, (attachment.anchor, location.clone()));
            }
            Some((existing, first)) => {
                if cx.values.anchor(*existing) != cx.values.anchor(attachment.anchor) {
                    return Err(Error::AnchorConflict {
                        context: cx.context.to_owned(),
                        glyph,
                        slot: format!("{slot_prefix}mark class '{}'", attachment.mark_class.name),
                        first: first.clone(),
                        second: location.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Accumulates mark-to-base or mark-to-mark rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct MarkAttachBuilder {
    marks: MarkSet,
    bases: BTreeMap<GlyphId16, BTreeMap<u16, (AnchorIndex, Location)>>,
}

impl MarkAttachBuilder {
    pub(crate) fn insert(
        &mut self,
        bases: &GlyphClass,
        attachments: &[MarkAttachment],
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        for base in bases.iter() {
            let slots = self.bases.entry(base).or_default();
            add_attachments(&mut self.marks, slots, base, attachments, "", location, cx)?;
        }
        Ok(())
    }
}

impl Builder for MarkAttachBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        if self.bases.is_empty() {
            return Ok(Vec::new());
        }
        let mut anchors = IndexSet::new();
        let marks = self.marks.build(&mut anchors, cx)?;
        let class_count = self.marks.class_count();
        let mut bases = Vec::with_capacity(self.bases.len());
        for (base, slots) in &self.bases {
            let mut record = Vec::with_capacity(class_count as usize);
            for class in 0..class_count {
                match slots.get(&class) {
                    Some((anchor, _)) => {
                        let anchor = cx.values.resolve_anchor(*anchor, cx.context)?;
                        record.push(Some(intern_anchor(&mut anchors, anchor, cx.context)?));
                    }
                    None => {
                        cx.diagnostics.warning(
                            cx.context,
                            format!(
                                "{base} has no anchor for mark class '{}'",
                                self.marks.class_name(class)
                            ),
                        );
                        record.push(None);
                    }
                }
            }
            bases.push(record);
        }
        Ok(vec![Subtable::MarkAttach(MarkAttach {
            mark_coverage: cx.coverages.add_coverage(self.marks.glyphs()),
            base_coverage: cx.coverages.add_coverage(self.bases.keys().copied()),
            class_count,
            marks,
            bases,
            anchors,
        })])
    }
}

/// Accumulates mark-to-ligature rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct MarkLigBuilder {
    marks: MarkSet,
    ligatures: BTreeMap<GlyphId16, (Vec<BTreeMap<u16, (AnchorIndex, Location)>>, Location)>,
}

impl MarkLigBuilder {
    pub(crate) fn insert(
        &mut self,
        ligatures: &GlyphClass,
        components: &[Vec<MarkAttachment>],
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        if components.is_empty() {
            return Err(Error::InvalidRule {
                context: cx.context.to_owned(),
                location: location.clone(),
                message: "mark-to-ligature rule without components".into(),
            });
        }
        for ligature in ligatures.iter() {
            if let Some((_, first)) = self.ligatures.get(&ligature) {
                return Err(conflict(
                    cx,
                    format!("anchors for ligature {ligature} are given twice"),
                    first,
                    location,
                ));
            }
            let mut slots = Vec::with_capacity(components.len());
            for (ix, attachments) in components.iter().enumerate() {
                let mut component = BTreeMap::new();
                let prefix = format!("component {}, ", ix + 1);
                add_attachments(
                    &mut self.marks,
                    &mut component,
                    ligature,
                    attachments,
                    &prefix,
                    location,
                    cx,
                )?;
                slots.push(component);
            }
            self.ligatures.insert(ligature, (slots, location.clone()));
        }
        Ok(())
    }
}

impl Builder for MarkLigBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        if self.ligatures.is_empty() {
            return Ok(Vec::new());
        }
        let mut anchors = IndexSet::new();
        let marks = self.marks.build(&mut anchors, cx)?;
        let class_count = self.marks.class_count();
        let mut ligatures = Vec::with_capacity(self.ligatures.len());
        for (components, _) in self.ligatures.values() {
            let mut record = Vec::with_capacity(components.len());
            for slots in components {
                let mut component = Vec::with_capacity(class_count as usize);
                for class in 0..class_count {
                    let anchor = match slots.get(&class) {
                        Some((anchor, _)) => {
                            let anchor = cx.values.resolve_anchor(*anchor, cx.context)?;
                            Some(intern_anchor(&mut anchors, anchor, cx.context)?)
                        }
                        None => None,
                    };
                    component.push(anchor);
                }
                record.push(component);
            }
            ligatures.push(record);
        }
        Ok(vec![Subtable::MarkLig(MarkLig {
            mark_coverage: cx.coverages.add_coverage(self.marks.glyphs()),
            ligature_coverage: cx.coverages.add_coverage(self.ligatures.keys().copied()),
            class_count,
            marks,
            ligatures,
            anchors,
        })])
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        coverage::CoveragePool,
        error::{Diagnostics, Severity},
        value::{Anchor, ValueRecord},
    };

    use super::*;

    fn gid(raw: u16) -> GlyphId16 {
        GlyphId16::new(raw)
    }

    fn class<const N: usize>(raw: [u16; N]) -> GlyphClass {
        raw.into_iter().map(GlyphId16::new).collect()
    }

    fn loc(line: u32) -> Location {
        Location::new(line).in_file("test.fea")
    }

    #[derive(Default)]
    struct TestContext {
        coverages: CoveragePool,
        values: ValuePool,
        diagnostics: Diagnostics,
    }

    impl TestContext {
        fn add(&mut self) -> AddContext {
            AddContext {
                values: &self.values,
                diagnostics: &mut self.diagnostics,
                context: "feature 'test'",
            }
        }

        fn build(&mut self, builder: impl Builder) -> Result<Vec<Subtable>, Error> {
            let mut cx = BuildContext {
                coverages: &mut self.coverages,
                values: &mut self.values,
                diagnostics: &mut self.diagnostics,
                context: "feature 'test'",
            };
            builder.build(&mut cx)
        }
    }

    #[test]
    fn single_pos_formats() {
        let mut cx = TestContext::default();
        let ten = cx.values.add_value(ValueRecord::new().with_x_advance(10));
        let also_ten = cx.values.add_value(ValueRecord::new().with_x_advance(10));
        let twenty = cx.values.add_value(ValueRecord::new().with_x_placement(20));

        let mut same = SinglePosBuilder::default();
        same.insert(gid(1), ten, &loc(1), &mut cx.add()).unwrap();
        same.insert(gid(2), also_ten, &loc(2), &mut cx.add()).unwrap();
        let subtables = cx.build(same).unwrap();
        assert!(matches!(subtables.as_slice(), [Subtable::SinglePos1 { .. }]));

        let mut different = SinglePosBuilder::default();
        different.insert(gid(1), ten, &loc(1), &mut cx.add()).unwrap();
        different.insert(gid(2), twenty, &loc(2), &mut cx.add()).unwrap();
        let subtables = cx.build(different).unwrap();
        let [Subtable::SinglePos2 { format, values, .. }] = subtables.as_slice() else {
            panic!("expected format 2: {subtables:?}");
        };
        assert_eq!(*format, ValueFormat::X_ADVANCE | ValueFormat::X_PLACEMENT);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn single_pos_conflict() {
        let mut cx = TestContext::default();
        let ten = cx.values.add_value(ValueRecord::new().with_x_advance(10));
        let twenty = cx.values.add_value(ValueRecord::new().with_x_advance(20));
        let mut builder = SinglePosBuilder::default();
        builder.insert(gid(1), ten, &loc(1), &mut cx.add()).unwrap();
        let err = builder
            .insert(gid(1), twenty, &loc(2), &mut cx.add())
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingRule { .. }));
    }

    #[test]
    fn specific_pairs_come_first() {
        let mut cx = TestContext::default();
        let kern = cx.values.add_value(ValueRecord::new().with_x_advance(-50));
        let mut builder = PairPosBuilder::default();
        builder
            .insert(&class([10, 11]), &class([20, 21]), Some(kern), None, false, &loc(1), &mut cx.add())
            .unwrap();
        builder
            .insert(&class([1]), &class([2]), Some(kern), None, false, &loc(2), &mut cx.add())
            .unwrap();
        let subtables = cx.build(builder).unwrap();
        assert!(matches!(
            subtables.as_slice(),
            [Subtable::PairPos1 { .. }, Subtable::PairPos2(_)]
        ));
        let Subtable::PairPos2(pair) = &subtables[1] else {
            unreachable!()
        };
        assert_eq!(pair.class1_count, 1);
        assert_eq!(pair.class2_count, 2);
        // row 0: the implicit class 0, then the real class
        assert!(pair.records[0].is_none());
        assert!(pair.records[1].is_some());
        // glyphs of class 0 are reached through the coverage
        assert!(cx.coverages.class_def(pair.class_def1).is_empty());
        assert_eq!(cx.coverages.class_def(pair.class_def2).get(gid(21)), 1);
    }

    #[test]
    fn pair_conflict_keeps_first() {
        let mut cx = TestContext::default();
        let one = cx.values.add_value(ValueRecord::new().with_x_advance(-50));
        let two = cx.values.add_value(ValueRecord::new().with_x_advance(-60));
        let mut builder = PairPosBuilder::default();
        builder
            .insert(&class([1]), &class([2]), Some(one), None, false, &loc(1), &mut cx.add())
            .unwrap();
        builder
            .insert(&class([1]), &class([2]), Some(two), None, false, &loc(2), &mut cx.add())
            .unwrap();
        assert!(cx
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning));
        let subtables = cx.build(builder).unwrap();
        let [Subtable::PairPos1 { sets, .. }] = subtables.as_slice() else {
            panic!("expected one format 1 subtable");
        };
        assert_eq!(sets[0][0].first_value.fields[2].unwrap().value, -50);
    }

    #[test]
    fn overlapping_classes_break_subtables() {
        let mut cx = TestContext::default();
        let kern = cx.values.add_value(ValueRecord::new().with_x_advance(-50));
        let mut builder = PairPosBuilder::default();
        builder
            .insert(&class([1, 2]), &class([5, 6]), Some(kern), None, false, &loc(1), &mut cx.add())
            .unwrap();
        // same first class, new second class: same subtable
        builder
            .insert(&class([1, 2]), &class([7, 8]), Some(kern), None, false, &loc(2), &mut cx.add())
            .unwrap();
        // overlaps [1 2] without being equal to it
        builder
            .insert(&class([2, 3]), &class([5, 6]), Some(kern), None, false, &loc(3), &mut cx.add())
            .unwrap();
        builder.add_subtable_break();
        builder
            .insert(&class([9, 10]), &class([5, 6]), Some(kern), None, false, &loc(4), &mut cx.add())
            .unwrap();
        let subtables = cx.build(builder).unwrap();
        assert_eq!(subtables.len(), 3);
        let Subtable::PairPos2(first) = &subtables[0] else {
            panic!("expected class pairs");
        };
        assert_eq!(first.class2_count, 3);
    }

    #[test]
    fn incompatible_formats_break_subtables() {
        let mut cx = TestContext::default();
        let advance = cx.values.add_value(ValueRecord::new().with_x_advance(-50));
        let both = cx
            .values
            .add_value(ValueRecord::new().with_x_advance(-50).with_x_placement(3));
        let placement = cx.values.add_value(ValueRecord::new().with_x_placement(3));
        let mut builder = PairPosBuilder::default();
        builder
            .insert(&class([1, 2]), &class([5, 6]), Some(advance), None, false, &loc(1), &mut cx.add())
            .unwrap();
        builder
            .insert(&class([3, 4]), &class([5, 6]), Some(both), None, false, &loc(2), &mut cx.add())
            .unwrap();
        builder
            .insert(&class([7, 8]), &class([5, 6]), Some(placement), None, false, &loc(3), &mut cx.add())
            .unwrap();
        // a subset of the current format is fine
        let subtables = cx.build(builder).unwrap();
        assert_eq!(subtables.len(), 1);

        let mut builder = PairPosBuilder::default();
        builder
            .insert(&class([1, 2]), &class([5, 6]), Some(advance), None, false, &loc(1), &mut cx.add())
            .unwrap();
        builder
            .insert(&class([3, 4]), &class([5, 6]), Some(placement), None, false, &loc(2), &mut cx.add())
            .unwrap();
        assert_eq!(cx.build(builder).unwrap().len(), 2);
    }

    #[test]
    fn enumerated_pairs_are_specific() {
        let mut cx = TestContext::default();
        let kern = cx.values.add_value(ValueRecord::new().with_x_advance(-5));
        let mut builder = PairPosBuilder::default();
        builder
            .insert(&class([1, 2]), &class([3, 4]), Some(kern), None, true, &loc(1), &mut cx.add())
            .unwrap();
        let subtables = cx.build(builder).unwrap();
        let [Subtable::PairPos1 { sets, .. }] = subtables.as_slice() else {
            panic!("expected one format 1 subtable");
        };
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|set| set.len() == 2));
    }

    #[test]
    fn cursive_glyph_twice_is_fatal() {
        let mut cx = TestContext::default();
        let anchor = cx.values.add_anchor(Anchor::new(0, 0));
        let mut builder = CursiveBuilder::default();
        builder
            .insert(gid(1), Some(anchor), None, &loc(1), &mut cx.add())
            .unwrap();
        assert!(builder
            .insert(gid(1), Some(anchor), None, &loc(2), &mut cx.add())
            .is_err());
        let subtables = cx.build(builder).unwrap();
        let [Subtable::Cursive { records, anchors, .. }] = subtables.as_slice() else {
            panic!("expected cursive");
        };
        assert_eq!(records, &[(Some(0), None)]);
        assert_eq!(anchors.len(), 1);
    }

    fn mark_class(cx: &mut TestContext, name: &str, glyphs: GlyphClass) -> MarkClass {
        let anchor = cx.values.add_anchor(Anchor::new(100, 0));
        MarkClass::new(name).with_marks(glyphs, anchor)
    }

    #[test]
    fn anchor_conflict_is_fatal() {
        let mut cx = TestContext::default();
        let top = mark_class(&mut cx, "top", class([100, 101]));
        let a = cx.values.add_anchor(Anchor::new(300, 600));
        let same_as_a = cx.values.add_anchor(Anchor::new(300, 600));
        let b = cx.values.add_anchor(Anchor::new(320, 600));

        let mut builder = MarkAttachBuilder::default();
        builder
            .insert(&class([42]), &[MarkAttachment::new(a, top.clone())], &loc(10), &mut cx.add())
            .unwrap();
        // the same anchor again is fine
        builder
            .insert(&class([42]), &[MarkAttachment::new(same_as_a, top.clone())], &loc(11), &mut cx.add())
            .unwrap();
        let err = builder
            .insert(&class([42]), &[MarkAttachment::new(b, top)], &loc(12), &mut cx.add())
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::AnchorConflict { .. }));
        assert!(msg.contains("GID_42"), "{msg}");
        assert!(msg.contains("test.fea:10") && msg.contains("test.fea:12"), "{msg}");
    }

    #[test]
    fn mark_in_two_classes_is_fatal() {
        let mut cx = TestContext::default();
        let top = mark_class(&mut cx, "top", class([100]));
        let bottom = mark_class(&mut cx, "bottom", class([100]));
        let anchor = cx.values.add_anchor(Anchor::new(0, 0));
        let mut builder = MarkAttachBuilder::default();
        builder
            .insert(&class([1]), &[MarkAttachment::new(anchor, top)], &loc(1), &mut cx.add())
            .unwrap();
        let err = builder
            .insert(&class([2]), &[MarkAttachment::new(anchor, bottom)], &loc(2), &mut cx.add())
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingRule { .. }));
    }

    #[test]
    fn missing_base_anchor_is_null() {
        let mut cx = TestContext::default();
        let top = mark_class(&mut cx, "top", class([100]));
        let bottom = mark_class(&mut cx, "bottom", class([101]));
        let anchor = cx.values.add_anchor(Anchor::new(0, 0));
        let mut builder = MarkAttachBuilder::default();
        builder
            .insert(
                &class([1]),
                &[MarkAttachment::new(anchor, top.clone()), MarkAttachment::new(anchor, bottom)],
                &loc(1),
                &mut cx.add(),
            )
            .unwrap();
        builder
            .insert(&class([2]), &[MarkAttachment::new(anchor, top)], &loc(2), &mut cx.add())
            .unwrap();
        let subtables = cx.build(builder).unwrap();
        let [Subtable::MarkAttach(mark)] = subtables.as_slice() else {
            panic!("expected mark attachment");
        };
        assert_eq!(mark.class_count, 2);
        assert_eq!(mark.bases[1][1], None);
        assert_eq!(mark.marks, vec![(0, 0), (1, 0)]);
        assert!(cx
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("bottom")));
    }

    #[test]
    fn mark_to_ligature() {
        let mut cx = TestContext::default();
        let top = mark_class(&mut cx, "top", class([100]));
        let anchor = cx.values.add_anchor(Anchor::new(50, 500));
        let mut builder = MarkLigBuilder::default();
        let components = vec![vec![MarkAttachment::new(anchor, top.clone())], vec![]];
        builder
            .insert(&class([7]), &components, &loc(1), &mut cx.add())
            .unwrap();
        let err = builder
            .insert(&class([7]), &components, &loc(2), &mut cx.add())
            .unwrap_err();
        let Error::ConflictingRule { message, first, .. } = &err else {
            panic!("expected a conflict: {err:?}");
        };
        assert_eq!(message, "anchors for ligature GID_7 are given twice");
        assert_eq!(first, &loc(1));
        let subtables = cx.build(builder).unwrap();
        let [Subtable::MarkLig(mark)] = subtables.as_slice() else {
            panic!("expected mark-to-ligature");
        };
        assert_eq!(mark.ligatures, vec![vec![vec![Some(1)], vec![None]]]);
    }
}
