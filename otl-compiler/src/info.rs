//! Per-lookup rule accumulation
//!
//! A [`SubtableInfo`] is created when a lookup is opened, collects that
//! lookup's rules, and is consumed when the lookup is closed, producing a
//! [`Lookup`] with its subtables.

use std::fmt::Display;

use otl_types::{Tag, GPOS, GSUB};

use crate::{
    anon::AnonLookups,
    builders::{AddContext, BuildContext, Builder},
    compiler::Label,
    contextual::{lower_pattern, ChainBuilder, LoweringScope, ReverseChainBuilder},
    coverage::CoveragePool,
    error::{Diagnostics, Error},
    gpos::{CursiveBuilder, MarkAttachBuilder, MarkLigBuilder, PairPosBuilder, SinglePosBuilder},
    gsub::{single_sub_pairs, LigatureSubBuilder, SequenceSubBuilder, SingleSubBuilder},
    lookup_flag::LookupFlag,
    rules::{Location, Rule},
    subtable::Subtable,
    value::ValuePool,
};

/// The script, language and feature a lookup was registered under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey {
    pub script: Tag,
    pub language: Tag,
    pub feature: Tag,
}

impl FeatureKey {
    pub fn new(script: Tag, language: Tag, feature: Tag) -> Self {
        FeatureKey {
            script,
            language,
            feature,
        }
    }
}

impl Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature '{}' (script '{}', language '{}')",
            self.feature, self.script, self.language
        )
    }
}

/// The type of a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LookupKind {
    SingleSub,
    MultipleSub,
    AlternateSub,
    LigatureSub,
    ChainSub,
    ReverseChainSub,
    SinglePos,
    PairPos,
    CursivePos,
    MarkToBase,
    MarkToLigature,
    MarkToMark,
    ChainPos,
}

impl LookupKind {
    /// The table this kind of lookup lives in.
    pub fn table(self) -> Tag {
        if self.is_gsub() {
            GSUB
        } else {
            GPOS
        }
    }

    pub fn is_gsub(self) -> bool {
        matches!(
            self,
            LookupKind::SingleSub
                | LookupKind::MultipleSub
                | LookupKind::AlternateSub
                | LookupKind::LigatureSub
                | LookupKind::ChainSub
                | LookupKind::ReverseChainSub
        )
    }

    /// The lookup type written in the lookup table.
    pub fn lookup_type(self) -> u16 {
        match self {
            LookupKind::SingleSub => 1,
            LookupKind::MultipleSub => 2,
            LookupKind::AlternateSub => 3,
            LookupKind::LigatureSub => 4,
            LookupKind::ChainSub => 6,
            LookupKind::ReverseChainSub => 8,
            LookupKind::SinglePos => 1,
            LookupKind::PairPos => 2,
            LookupKind::CursivePos => 3,
            LookupKind::MarkToBase => 4,
            LookupKind::MarkToLigature => 5,
            LookupKind::MarkToMark => 6,
            LookupKind::ChainPos => 8,
        }
    }

    /// The lookup type of an extension lookup in this kind's table.
    pub fn extension_type(self) -> u16 {
        if self.is_gsub() {
            7
        } else {
            9
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LookupKind::SingleSub => "single substitution",
            LookupKind::MultipleSub => "multiple substitution",
            LookupKind::AlternateSub => "alternate substitution",
            LookupKind::LigatureSub => "ligature substitution",
            LookupKind::ChainSub => "chaining contextual substitution",
            LookupKind::ReverseChainSub => "reverse chaining substitution",
            LookupKind::SinglePos => "single positioning",
            LookupKind::PairPos => "pair positioning",
            LookupKind::CursivePos => "cursive attachment",
            LookupKind::MarkToBase => "mark-to-base attachment",
            LookupKind::MarkToLigature => "mark-to-ligature attachment",
            LookupKind::MarkToMark => "mark-to-mark attachment",
            LookupKind::ChainPos => "chaining contextual positioning",
        }
    }
}

fn rule_name(rule: &Rule) -> &'static str {
    match rule {
        Rule::SingleSub { .. } => "single substitution",
        Rule::MultipleSub { .. } => "multiple substitution",
        Rule::AlternateSub { .. } => "alternate substitution",
        Rule::LigatureSub { .. } => "ligature substitution",
        Rule::Contextual(_) => "contextual",
        Rule::ReverseChain { .. } => "reverse chaining substitution",
        Rule::SinglePos { .. } => "single positioning",
        Rule::PairPos { .. } => "pair positioning",
        Rule::Cursive { .. } => "cursive attachment",
        Rule::MarkToBase { .. } => "mark-to-base attachment",
        Rule::MarkToMark { .. } => "mark-to-mark attachment",
        Rule::MarkToLigature { .. } => "mark-to-ligature attachment",
    }
}

/// The rule container for each kind of lookup.
#[derive(Clone, Debug)]
pub(crate) enum Rules {
    SingleSub(SingleSubBuilder),
    Sequence(SequenceSubBuilder),
    LigatureSub(LigatureSubBuilder),
    Chain(ChainBuilder),
    ReverseChain(ReverseChainBuilder),
    SinglePos(SinglePosBuilder),
    PairPos(PairPosBuilder),
    Cursive(CursiveBuilder),
    MarkAttach(MarkAttachBuilder),
    MarkLig(MarkLigBuilder),
}

impl Rules {
    fn for_kind(kind: LookupKind) -> Self {
        match kind {
            LookupKind::SingleSub => Rules::SingleSub(Default::default()),
            LookupKind::MultipleSub => Rules::Sequence(SequenceSubBuilder::multiple()),
            LookupKind::AlternateSub => Rules::Sequence(SequenceSubBuilder::alternate()),
            LookupKind::LigatureSub => Rules::LigatureSub(Default::default()),
            LookupKind::ChainSub | LookupKind::ChainPos => Rules::Chain(Default::default()),
            LookupKind::ReverseChainSub => Rules::ReverseChain(Default::default()),
            LookupKind::SinglePos => Rules::SinglePos(Default::default()),
            LookupKind::PairPos => Rules::PairPos(Default::default()),
            LookupKind::CursivePos => Rules::Cursive(Default::default()),
            LookupKind::MarkToBase | LookupKind::MarkToMark => {
                Rules::MarkAttach(Default::default())
            }
            LookupKind::MarkToLigature => Rules::MarkLig(Default::default()),
        }
    }

    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        match self {
            Rules::SingleSub(builder) => builder.build(cx),
            Rules::Sequence(builder) => builder.build(cx),
            Rules::LigatureSub(builder) => builder.build(cx),
            Rules::Chain(builder) => builder.build(cx),
            Rules::ReverseChain(builder) => builder.build(cx),
            Rules::SinglePos(builder) => builder.build(cx),
            Rules::PairPos(builder) => builder.build(cx),
            Rules::Cursive(builder) => builder.build(cx),
            Rules::MarkAttach(builder) => builder.build(cx),
            Rules::MarkLig(builder) => builder.build(cx),
        }
    }
}

/// A closed lookup.
#[derive(Clone, Debug)]
pub(crate) struct Lookup {
    pub label: Label,
    pub kind: LookupKind,
    pub flags: LookupFlag,
    pub mark_filter_set: Option<u16>,
    pub use_extension: bool,
    pub subtables: Vec<Subtable>,
    /// For messages from the assembler
    pub context: String,
}

/// Accumulates the rules of one open lookup.
#[derive(Clone, Debug)]
pub(crate) struct SubtableInfo {
    pub label: Label,
    pub kind: LookupKind,
    pub flags: LookupFlag,
    pub mark_filter_set: Option<u16>,
    pub use_extension: bool,
    pub feature: Option<FeatureKey>,
    pub context: String,
    pub rules: Rules,
}

impl SubtableInfo {
    pub(crate) fn new(
        label: Label,
        kind: LookupKind,
        feature: Option<FeatureKey>,
        context: String,
    ) -> Self {
        SubtableInfo {
            label,
            kind,
            flags: LookupFlag::empty(),
            mark_filter_set: None,
            use_extension: false,
            feature,
            context,
            rules: Rules::for_kind(kind),
        }
    }

    /// Add a rule, moving any inline actions of a contextual rule into
    /// anonymous lookups.
    pub(crate) fn add_rule(
        &mut self,
        location: &Location,
        rule: &Rule,
        anon: &mut AnonLookups,
        values: &ValuePool,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), Error> {
        let scope = LoweringScope {
            is_gsub: self.kind.is_gsub(),
            feature: self.feature,
            flags: self.flags,
            mark_filter_set: self.mark_filter_set,
        };
        let mut cx = AddContext {
            values,
            diagnostics,
            context: &self.context,
        };
        match (&mut self.rules, rule) {
            (Rules::Chain(builder), Rule::Contextual(pattern)) => {
                builder.push(lower_pattern(pattern, location, scope, anon, &mut cx)?);
                Ok(())
            }
            (rules, rule) => add_simple_rule(self.kind, rules, location, rule, &mut cx),
        }
    }

    /// Add a rule that is not contextual.
    pub(crate) fn add_simple_rule(
        &mut self,
        location: &Location,
        rule: &Rule,
        values: &ValuePool,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), Error> {
        let mut cx = AddContext {
            values,
            diagnostics,
            context: &self.context,
        };
        add_simple_rule(self.kind, &mut self.rules, location, rule, &mut cx)
    }

    /// Handle an explicit subtable break.
    pub(crate) fn subtable_break(&mut self, diagnostics: &mut Diagnostics) {
        match &mut self.rules {
            Rules::PairPos(builder) => builder.add_subtable_break(),
            _ => diagnostics.warning(
                &self.context,
                format!("subtable breaks are not supported in {} lookups", self.kind.name()),
            ),
        }
    }

    /// Turn the accumulated rules into subtables.
    pub(crate) fn close(
        self,
        coverages: &mut CoveragePool,
        values: &mut ValuePool,
        diagnostics: &mut Diagnostics,
    ) -> Result<Lookup, Error> {
        let mut cx = BuildContext {
            coverages,
            values,
            diagnostics,
            context: &self.context,
        };
        let subtables = self.rules.build(&mut cx)?;
        log::trace!(
            "closed {}: {} {} subtables",
            self.context,
            subtables.len(),
            self.kind.name()
        );
        Ok(Lookup {
            label: self.label,
            kind: self.kind,
            flags: self.flags,
            mark_filter_set: self.mark_filter_set,
            use_extension: self.use_extension,
            subtables,
            context: self.context,
        })
    }
}

fn add_simple_rule(
    kind: LookupKind,
    rules: &mut Rules,
    location: &Location,
    rule: &Rule,
    cx: &mut AddContext,
) -> Result<(), Error> {
    match (rules, rule) {
        (Rules::SingleSub(builder), Rule::SingleSub { target, replacement }) => {
            let pairs = single_sub_pairs(target, replacement).map_err(|message| {
                Error::InvalidRule {
                    context: cx.context.to_owned(),
                    location: location.clone(),
                    message,
                }
            })?;
            for (target, replacement) in pairs {
                builder.insert(target, replacement, location, cx)?;
            }
        }
        (Rules::Sequence(builder), Rule::MultipleSub { target, replacement })
            if kind == LookupKind::MultipleSub =>
        {
            builder.insert(*target, replacement.clone(), location, cx)?;
        }
        (Rules::Sequence(builder), Rule::AlternateSub { target, alternates })
            if kind == LookupKind::AlternateSub =>
        {
            builder.insert(*target, alternates.glyphs().to_vec(), location, cx)?;
        }
        (
            Rules::LigatureSub(builder),
            Rule::LigatureSub {
                components,
                replacement,
            },
        ) => builder.insert_classes(components, *replacement, location, cx)?,
        (Rules::ReverseChain(builder), Rule::ReverseChain { pattern, replacement }) => {
            builder.insert(pattern, replacement, location, cx)?
        }
        (Rules::SinglePos(builder), Rule::SinglePos { glyphs, value }) => {
            for glyph in glyphs.sorted() {
                builder.insert(glyph, *value, location, cx)?;
            }
        }
        (
            Rules::PairPos(builder),
            Rule::PairPos {
                first,
                second,
                first_value,
                second_value,
                enumerate,
            },
        ) => builder.insert(
            first,
            second,
            *first_value,
            *second_value,
            *enumerate,
            location,
            cx,
        )?,
        (Rules::Cursive(builder), Rule::Cursive { glyphs, entry, exit }) => {
            for glyph in glyphs.sorted() {
                builder.insert(glyph, *entry, *exit, location, cx)?;
            }
        }
        (Rules::MarkAttach(builder), Rule::MarkToBase { bases, attachments })
            if kind == LookupKind::MarkToBase =>
        {
            builder.insert(bases, attachments, location, cx)?
        }
        (
            Rules::MarkAttach(builder),
            Rule::MarkToMark {
                base_marks,
                attachments,
            },
        ) if kind == LookupKind::MarkToMark => builder.insert(base_marks, attachments, location, cx)?,
        (
            Rules::MarkLig(builder),
            Rule::MarkToLigature {
                ligatures,
                components,
            },
        ) => builder.insert(ligatures, components, location, cx)?,
        (_, rule) => {
            return Err(Error::InvalidRule {
                context: cx.context.to_owned(),
                location: location.clone(),
                message: format!("{} rule in a {} lookup", rule_name(rule), kind.name()),
            })
        }
    }
    Ok(())
}
