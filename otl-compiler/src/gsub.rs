//! GSUB lookup builders

use std::collections::BTreeMap;

use otl_types::GlyphId16;

use crate::{
    builders::{AddContext, BuildContext, Builder, Compat, TableSplitter},
    error::Error,
    rules::{GlyphClass, Location},
    subtable::{Ligature, Subtable},
};

// format, coverage offset, count
const SEQUENCE_TABLE_HEADER_LEN: usize = 6;

fn conflict(cx: &AddContext, message: String, first: &Location, second: &Location) -> Error {
    Error::ConflictingRule {
        context: cx.context.to_owned(),
        message,
        first: first.clone(),
        second: second.clone(),
    }
}

/// Pair up targets and replacements: class → class is pairwise, class →
/// glyph maps every target to the one glyph.
pub(crate) fn single_sub_pairs(
    target: &GlyphClass,
    replacement: &GlyphClass,
) -> Result<Vec<(GlyphId16, GlyphId16)>, String> {
    match (target.len(), replacement.len()) {
        (0, _) | (_, 0) => Err("empty glyph class in single substitution".into()),
        (_, 1) => {
            let replacement = replacement.glyphs()[0];
            Ok(target.iter().map(|gid| (gid, replacement)).collect())
        }
        (n_target, n_replacement) if n_target == n_replacement => {
            Ok(target.iter().zip(replacement.iter()).collect())
        }
        (n_target, n_replacement) => Err(format!(
            "single substitution maps {n_target} glyphs to {n_replacement} glyphs"
        )),
    }
}

/// Accumulates single substitution rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct SingleSubBuilder {
    items: BTreeMap<GlyphId16, (GlyphId16, Location)>,
}

impl SingleSubBuilder {
    pub(crate) fn check(&self, target: GlyphId16, replacement: GlyphId16) -> Compat {
        match self.items.get(&target) {
            None => Compat::Compatible,
            Some((existing, _)) if *existing == replacement => Compat::Duplicate,
            Some(_) => Compat::Conflict,
        }
    }

    pub(crate) fn insert(
        &mut self,
        target: GlyphId16,
        replacement: GlyphId16,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        match self.items.get(&target) {
            None => {
                self.items.insert(target, (replacement, location.clone()));
            }
            Some((existing, _)) if *existing == replacement => cx.diagnostics.note(
                cx.context,
                format!("removing duplicate substitution of {target} at {location}"),
            ),
            Some((existing, first)) => {
                return Err(conflict(
                    cx,
                    format!("{target} is replaced by both {existing} and {replacement}"),
                    first,
                    location,
                ))
            }
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Builder for SingleSubBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        // deltas are applied modulo 65536, so any common delta fits in an i16
        let mut deltas = self
            .items
            .iter()
            .map(|(k, (v, _))| v.to_u16().wrapping_sub(k.to_u16()) as i16);
        let first = deltas.next();
        let delta = first.filter(|first| deltas.all(|delta| delta == *first));

        let coverage = cx.coverages.add_coverage(self.items.keys().copied());
        Ok(vec![match delta {
            Some(delta) => Subtable::SingleSubst1 { coverage, delta },
            None => Subtable::SingleSubst2 {
                coverage,
                substitutes: self.items.values().map(|(gid, _)| *gid).collect(),
            },
        }])
    }
}

/// Accumulates multiple or alternate substitution rules.
///
/// Both map one glyph to a sequence of glyphs, and share a layout.
#[derive(Clone, Debug)]
pub(crate) struct SequenceSubBuilder {
    items: BTreeMap<GlyphId16, (Vec<GlyphId16>, Location)>,
    alternate: bool,
}

impl SequenceSubBuilder {
    pub(crate) fn multiple() -> Self {
        SequenceSubBuilder {
            items: BTreeMap::new(),
            alternate: false,
        }
    }

    pub(crate) fn alternate() -> Self {
        SequenceSubBuilder {
            items: BTreeMap::new(),
            alternate: true,
        }
    }

    fn kind(&self) -> &'static str {
        if self.alternate {
            "alternate substitution"
        } else {
            "multiple substitution"
        }
    }

    pub(crate) fn check(&self, target: GlyphId16, replacement: &[GlyphId16]) -> Compat {
        match self.items.get(&target) {
            None => Compat::Compatible,
            Some((existing, _)) if existing == replacement => Compat::Duplicate,
            Some(_) => Compat::Conflict,
        }
    }

    pub(crate) fn insert(
        &mut self,
        target: GlyphId16,
        replacement: Vec<GlyphId16>,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        if replacement.is_empty() || replacement.len() > u16::MAX as usize {
            return Err(Error::InvalidRule {
                context: cx.context.to_owned(),
                location: location.clone(),
                message: format!("{} of {target} has no usable glyphs", self.kind()),
            });
        }
        match self.items.get(&target) {
            None => {
                self.items.insert(target, (replacement, location.clone()));
            }
            Some((existing, _)) if *existing == replacement => cx.diagnostics.note(
                cx.context,
                format!("removing duplicate {} of {target} at {location}", self.kind()),
            ),
            Some((_, first)) => {
                return Err(conflict(
                    cx,
                    format!("conflicting {} rules for {target}", self.kind()),
                    first,
                    location,
                ))
            }
        }
        Ok(())
    }
}

impl Builder for SequenceSubBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        let mut splitter = TableSplitter::new(SEQUENCE_TABLE_HEADER_LEN, self.kind());
        for (target, (sequence, _)) in self.items {
            // offset, count, glyphs
            let size = 2 + 2 + 2 * sequence.len();
            splitter.add(target, sequence, size);
        }
        Ok(splitter
            .finish()
            .into_iter()
            .map(|(glyphs, sequences)| {
                let coverage = cx.coverages.add_coverage(glyphs);
                if self.alternate {
                    Subtable::AlternateSubst {
                        coverage,
                        alternates: sequences,
                    }
                } else {
                    Subtable::MultipleSubst {
                        coverage,
                        sequences,
                    }
                }
            })
            .collect())
    }
}

/// Accumulates ligature substitution rules, grouped by first glyph.
#[derive(Clone, Debug, Default)]
pub(crate) struct LigatureSubBuilder {
    items: BTreeMap<GlyphId16, Vec<(Vec<GlyphId16>, GlyphId16, Location)>>,
}

/// Every glyph sequence matched by a sequence of classes.
pub(crate) fn enumerate_sequences(components: &[GlyphClass]) -> Vec<Vec<GlyphId16>> {
    let mut sequences = vec![Vec::new()];
    for class in components {
        sequences = sequences
            .into_iter()
            .flat_map(|prefix| {
                class.iter().map(move |gid| {
                    let mut seq = prefix.clone();
                    seq.push(gid);
                    seq
                })
            })
            .collect();
    }
    sequences
}

impl LigatureSubBuilder {
    pub(crate) fn check(&self, sequence: &[GlyphId16], replacement: GlyphId16) -> Compat {
        let Some((first, rest)) = sequence.split_first() else {
            return Compat::Conflict;
        };
        match self
            .items
            .get(first)
            .and_then(|set| set.iter().find(|(existing, _, _)| existing == rest))
        {
            None => Compat::Compatible,
            Some((_, lig, _)) if *lig == replacement => Compat::Duplicate,
            Some(_) => Compat::Conflict,
        }
    }

    pub(crate) fn insert(
        &mut self,
        sequence: Vec<GlyphId16>,
        replacement: GlyphId16,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        let Some((first, rest)) = sequence.split_first() else {
            return Err(Error::InvalidRule {
                context: cx.context.to_owned(),
                location: location.clone(),
                message: "ligature substitution without components".into(),
            });
        };
        let set = self.items.entry(*first).or_default();
        match set.iter().find(|(existing, _, _)| existing == rest) {
            None => set.push((rest.to_vec(), replacement, location.clone())),
            Some((_, lig, _)) if *lig == replacement => cx.diagnostics.note(
                cx.context,
                format!("removing duplicate ligature substitution at {location}"),
            ),
            Some((_, lig, first_location)) => {
                return Err(conflict(
                    cx,
                    format!(
                        "ligature starting with {first} forms both {lig} and {replacement}"
                    ),
                    first_location,
                    location,
                ))
            }
        }
        Ok(())
    }

    /// Add every sequence matched by `components`.
    pub(crate) fn insert_classes(
        &mut self,
        components: &[GlyphClass],
        replacement: GlyphId16,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        for sequence in enumerate_sequences(components) {
            self.insert(sequence, replacement, location, cx)?;
        }
        Ok(())
    }
}

impl Builder for LigatureSubBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        let coverage = cx.coverages.add_coverage(self.items.keys().copied());
        let sets = self
            .items
            .into_values()
            .map(|mut set| {
                // longest match first; ties in pattern order
                set.sort_by(|(a, _, _), (b, _, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
                set.into_iter()
                    .map(|(components, glyph, _)| Ligature { glyph, components })
                    .collect()
            })
            .collect();
        Ok(vec![Subtable::LigatureSubst { coverage, sets }])
    }
}
