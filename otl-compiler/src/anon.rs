//! Anonymous lookups for the inline actions of contextual rules
//!
//! Each inline action (`sub a' by b` and friends) needs a lookup of its own
//! to point at. Rather than one lookup per action, actions with the same
//! feature, flags and kind are collected into a shared lookup for as long as
//! they do not conflict with what is already there.

use std::collections::HashMap;

use otl_types::GlyphId16;

use crate::{
    builders::{AddContext, Compat},
    compiler::Label,
    coverage::CoveragePool,
    error::{Diagnostics, Error},
    gsub::enumerate_sequences,
    info::{FeatureKey, Lookup, LookupKind, Rules, SubtableInfo},
    lookup_flag::LookupFlag,
    rules::{GlyphClass, Location, Rule},
    value::{ValueIndex, ValuePool},
};

/// The kind of lookup an inline action needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ActionKind {
    SingleSub,
    MultipleSub,
    LigatureSub,
    SinglePos,
}

impl ActionKind {
    fn lookup_kind(self) -> LookupKind {
        match self {
            ActionKind::SingleSub => LookupKind::SingleSub,
            ActionKind::MultipleSub => LookupKind::MultipleSub,
            ActionKind::LigatureSub => LookupKind::LigatureSub,
            ActionKind::SinglePos => LookupKind::SinglePos,
        }
    }
}

/// Actions with equal keys may share a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct AnonKey {
    pub feature: Option<FeatureKey>,
    pub flags: LookupFlag,
    pub mark_filter_set: Option<u16>,
    pub kind: ActionKind,
}

/// The anonymous lookups of a build, in creation order.
#[derive(Clone, Debug, Default)]
pub(crate) struct AnonLookups {
    next_id: u32,
    /// The most recent lookup for each key
    latest: HashMap<AnonKey, usize>,
    lookups: Vec<SubtableInfo>,
}

fn no_conflicts(mut checks: impl Iterator<Item = Compat>) -> bool {
    checks.all(|compat| compat != Compat::Conflict)
}

impl AnonLookups {
    /// The index of a lookup for `key` that can take the new rule.
    fn lookup_for(&mut self, key: AnonKey, fits: impl Fn(&Rules) -> bool) -> usize {
        if let Some(ix) = self.latest.get(&key).copied() {
            if fits(&self.lookups[ix].rules) {
                return ix;
            }
        }
        let label = Label::anonymous(self.next_id);
        self.next_id += 1;
        let context = match &key.feature {
            Some(feature) => format!("{label} in {feature}"),
            None => label.to_string(),
        };
        log::debug!("creating {context}");
        let mut info = SubtableInfo::new(label, key.kind.lookup_kind(), key.feature, context);
        info.flags = key.flags;
        info.mark_filter_set = key.mark_filter_set;
        let ix = self.lookups.len();
        self.lookups.push(info);
        self.latest.insert(key, ix);
        ix
    }

    fn add(
        &mut self,
        key: AnonKey,
        fits: impl Fn(&Rules) -> bool,
        rule: Rule,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<Label, Error> {
        let ix = self.lookup_for(key, fits);
        let info = &mut self.lookups[ix];
        info.add_simple_rule(location, &rule, cx.values, cx.diagnostics)?;
        Ok(info.label)
    }

    pub(crate) fn single_sub(
        &mut self,
        key: AnonKey,
        pairs: &[(GlyphId16, GlyphId16)],
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<Label, Error> {
        let fits = |rules: &Rules| match rules {
            Rules::SingleSub(builder) => {
                no_conflicts(pairs.iter().map(|(target, replacement)| builder.check(*target, *replacement)))
            }
            _ => false,
        };
        let rule = Rule::SingleSub {
            target: pairs.iter().map(|(target, _)| *target).collect(),
            replacement: pairs.iter().map(|(_, replacement)| *replacement).collect(),
        };
        self.add(key, fits, rule, location, cx)
    }

    pub(crate) fn multiple_sub(
        &mut self,
        key: AnonKey,
        targets: &GlyphClass,
        sequence: &[GlyphId16],
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<Label, Error> {
        let fits = |rules: &Rules| match rules {
            Rules::Sequence(builder) => {
                no_conflicts(targets.iter().map(|target| builder.check(target, sequence)))
            }
            _ => false,
        };
        let ix = self.lookup_for(key, fits);
        let info = &mut self.lookups[ix];
        for target in targets.sorted() {
            let rule = Rule::MultipleSub {
                target,
                replacement: sequence.to_vec(),
            };
            info.add_simple_rule(location, &rule, cx.values, cx.diagnostics)?;
        }
        Ok(info.label)
    }

    pub(crate) fn ligature_sub(
        &mut self,
        key: AnonKey,
        components: &[GlyphClass],
        replacement: GlyphId16,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<Label, Error> {
        let sequences = enumerate_sequences(components);
        let fits = |rules: &Rules| match rules {
            Rules::LigatureSub(builder) => {
                no_conflicts(sequences.iter().map(|seq| builder.check(seq, replacement)))
            }
            _ => false,
        };
        let rule = Rule::LigatureSub {
            components: components.to_vec(),
            replacement,
        };
        self.add(key, fits, rule, location, cx)
    }

    pub(crate) fn single_pos(
        &mut self,
        key: AnonKey,
        glyphs: &GlyphClass,
        value: ValueIndex,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<Label, Error> {
        let values = cx.values;
        let fits = |rules: &Rules| match rules {
            Rules::SinglePos(builder) => {
                no_conflicts(glyphs.iter().map(|glyph| builder.check(glyph, value, values)))
            }
            _ => false,
        };
        let rule = Rule::SinglePos {
            glyphs: glyphs.clone(),
            value,
        };
        self.add(key, fits, rule, location, cx)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lookups.len()
    }

    /// Close every anonymous lookup, in creation order.
    pub(crate) fn finish(
        self,
        coverages: &mut CoveragePool,
        values: &mut ValuePool,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<Lookup>, Error> {
        self.lookups
            .into_iter()
            .map(|info| info.close(coverages, values, diagnostics))
            .collect()
    }
}
