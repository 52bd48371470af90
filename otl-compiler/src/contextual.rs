//! Chaining contextual and reverse chaining rules
//!
//! Chain rules are written one format 3 subtable per rule. Inline actions
//! (`sub a' by b`, `pos a' 20`...) are moved into anonymous lookups, and the
//! rule keeps only a lookup record pointing at them.

use std::collections::{BTreeMap, HashMap};

use otl_types::GlyphId16;

use crate::{
    anon::{ActionKind, AnonKey, AnonLookups},
    builders::{AddContext, BuildContext, Builder},
    compiler::Label,
    coverage::CoverageId,
    error::{Error, Overflow},
    gsub::single_sub_pairs,
    info::FeatureKey,
    lookup_flag::LookupFlag,
    rules::{ContextAction, GlyphClass, GlyphPattern, Location},
    subtable::{ChainContext, Subtable},
};

/// A chain rule with its inline actions replaced by lookup records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChainRule {
    /// Closest glyph first
    pub backtrack: Vec<Vec<GlyphId16>>,
    pub input: Vec<Vec<GlyphId16>>,
    pub lookahead: Vec<Vec<GlyphId16>>,
    pub records: Vec<(u16, Label)>,
}

/// Where the anonymous lookups created for a rule belong.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LoweringScope {
    pub is_gsub: bool,
    pub feature: Option<FeatureKey>,
    pub flags: LookupFlag,
    pub mark_filter_set: Option<u16>,
}

impl LoweringScope {
    fn key(&self, kind: ActionKind) -> AnonKey {
        AnonKey {
            feature: self.feature,
            flags: self.flags,
            mark_filter_set: self.mark_filter_set,
            kind,
        }
    }
}

fn invalid(cx: &AddContext, location: &Location, message: impl Into<String>) -> Error {
    Error::InvalidRule {
        context: cx.context.to_owned(),
        location: location.clone(),
        message: message.into(),
    }
}

/// Turn a pattern into a [`ChainRule`], creating anonymous lookups for its
/// inline actions.
pub(crate) fn lower_pattern(
    pattern: &GlyphPattern,
    location: &Location,
    scope: LoweringScope,
    anon: &mut AnonLookups,
    cx: &mut AddContext,
) -> Result<ChainRule, Error> {
    pattern
        .validate()
        .map_err(|message| invalid(cx, location, message))?;
    let input_nodes = pattern.input().collect::<Vec<_>>();
    let mut records = Vec::new();
    for (ix, node) in input_nodes.iter().enumerate() {
        let seq_index = u16::try_from(ix).map_err(|_| {
            Error::overflow(
                cx.context,
                Overflow {
                    what: "sequence index",
                    value: ix,
                    limit: u16::MAX as usize,
                },
            )
        })?;
        for action in &node.actions {
            let substitution = !matches!(action, ContextAction::Lookup(_) | ContextAction::Position(_));
            if substitution != scope.is_gsub && !matches!(action, ContextAction::Lookup(_)) {
                return Err(invalid(
                    cx,
                    location,
                    "inline action does not belong to this table",
                ));
            }
            let label = match action {
                ContextAction::Lookup(label) => *label,
                ContextAction::Substitute(replacement) => {
                    let pairs = single_sub_pairs(&node.glyphs, replacement)
                        .map_err(|message| invalid(cx, location, message))?;
                    anon.single_sub(scope.key(ActionKind::SingleSub), &pairs, location, cx)?
                }
                ContextAction::SubstituteSequence(sequence) => anon.multiple_sub(
                    scope.key(ActionKind::MultipleSub),
                    &node.glyphs,
                    sequence,
                    location,
                    cx,
                )?,
                ContextAction::Ligature(glyph) => {
                    let components = input_nodes[ix..]
                        .iter()
                        .map(|node| node.glyphs.clone())
                        .collect::<Vec<_>>();
                    if components.len() < 2 {
                        return Err(invalid(cx, location, "a ligature needs two or more components"));
                    }
                    anon.ligature_sub(
                        scope.key(ActionKind::LigatureSub),
                        &components,
                        *glyph,
                        location,
                        cx,
                    )?
                }
                ContextAction::Position(value) => anon.single_pos(
                    scope.key(ActionKind::SinglePos),
                    &node.glyphs,
                    *value,
                    location,
                    cx,
                )?,
            };
            records.push((seq_index, label));
        }
    }

    let mut backtrack = pattern
        .backtrack()
        .map(|node| node.glyphs.sorted())
        .collect::<Vec<_>>();
    backtrack.reverse();
    Ok(ChainRule {
        backtrack,
        input: input_nodes.iter().map(|node| node.glyphs.sorted()).collect(),
        lookahead: pattern.lookahead().map(|node| node.glyphs.sorted()).collect(),
        records,
    })
}

/// Accumulates chaining contextual rules, in insertion order.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChainBuilder {
    rules: Vec<ChainRule>,
}

impl ChainBuilder {
    pub(crate) fn push(&mut self, rule: ChainRule) {
        self.rules.push(rule);
    }
}

impl Builder for ChainBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        let mut subtables = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            // identical classes in one rule share a coverage table
            let mut seen: HashMap<Vec<GlyphId16>, CoverageId> = HashMap::new();
            let mut coverage = |glyphs: Vec<GlyphId16>| {
                *seen
                    .entry(glyphs)
                    .or_insert_with_key(|glyphs| cx.coverages.add_coverage(glyphs.iter().copied()))
            };
            let backtrack = rule.backtrack.into_iter().map(&mut coverage).collect();
            let input = rule.input.into_iter().map(&mut coverage).collect();
            let lookahead = rule.lookahead.into_iter().map(&mut coverage).collect();
            subtables.push(Subtable::ChainContext(ChainContext {
                backtrack,
                input,
                lookahead,
                records: rule.records,
            }));
        }
        Ok(subtables)
    }
}

#[derive(Clone, Debug)]
struct ReverseRule {
    backtrack: Vec<Vec<GlyphId16>>,
    lookahead: Vec<Vec<GlyphId16>>,
    substitutes: BTreeMap<GlyphId16, GlyphId16>,
}

/// Accumulates reverse chaining single substitution rules.
#[derive(Clone, Debug, Default)]
pub(crate) struct ReverseChainBuilder {
    rules: Vec<ReverseRule>,
}

impl ReverseChainBuilder {
    pub(crate) fn insert(
        &mut self,
        pattern: &GlyphPattern,
        replacement: &GlyphClass,
        location: &Location,
        cx: &mut AddContext,
    ) -> Result<(), Error> {
        pattern
            .validate()
            .map_err(|message| invalid(cx, location, message))?;
        let mut input = pattern.input();
        let (Some(target), None) = (input.next(), input.next()) else {
            return Err(invalid(
                cx,
                location,
                "reverse chaining substitution takes exactly one marked glyph class",
            ));
        };
        if target.actions.iter().any(|action| matches!(action, ContextAction::Lookup(_))) {
            return Err(invalid(
                cx,
                location,
                "reverse chaining substitution cannot apply lookups",
            ));
        }
        let pairs = single_sub_pairs(&target.glyphs, replacement)
            .map_err(|message| invalid(cx, location, message))?;
        let mut substitutes = BTreeMap::new();
        for (target, replacement) in pairs {
            if let Some(existing) = substitutes.insert(target, replacement) {
                if existing != replacement {
                    return Err(invalid(
                        cx,
                        location,
                        format!("{target} is replaced by both {existing} and {replacement}"),
                    ));
                }
            }
        }
        let mut backtrack = pattern
            .backtrack()
            .map(|node| node.glyphs.sorted())
            .collect::<Vec<_>>();
        backtrack.reverse();
        self.rules.push(ReverseRule {
            backtrack,
            lookahead: pattern.lookahead().map(|node| node.glyphs.sorted()).collect(),
            substitutes,
        });
        Ok(())
    }
}

impl Builder for ReverseChainBuilder {
    fn build(self, cx: &mut BuildContext) -> Result<Vec<Subtable>, Error> {
        Ok(self
            .rules
            .into_iter()
            .map(|rule| Subtable::ReverseChainSingleSubst {
                coverage: cx.coverages.add_coverage(rule.substitutes.keys().copied()),
                backtrack: rule
                    .backtrack
                    .into_iter()
                    .map(|glyphs| cx.coverages.add_coverage(glyphs))
                    .collect(),
                lookahead: rule
                    .lookahead
                    .into_iter()
                    .map(|glyphs| cx.coverages.add_coverage(glyphs))
                    .collect(),
                substitutes: rule.substitutes.into_values().collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use otl_types::Tag;

    use crate::{
        coverage::CoveragePool,
        error::Diagnostics,
        rules::PatternNode,
        value::{ValuePool, ValueRecord},
    };

    use super::*;

    fn gid(raw: u16) -> GlyphId16 {
        GlyphId16::new(raw)
    }

    fn class<const N: usize>(raw: [u16; N]) -> GlyphClass {
        raw.into_iter().map(GlyphId16::new).collect()
    }

    fn scope(is_gsub: bool) -> LoweringScope {
        LoweringScope {
            is_gsub,
            feature: Some(FeatureKey::new(
                Tag::new(b"latn"),
                Tag::new(b"dflt"),
                Tag::new(b"calt"),
            )),
            flags: LookupFlag::empty(),
            mark_filter_set: None,
        }
    }

    #[derive(Default)]
    struct TestContext {
        coverages: CoveragePool,
        values: ValuePool,
        diagnostics: Diagnostics,
        anon: AnonLookups,
    }

    impl TestContext {
        fn lower(&mut self, pattern: &GlyphPattern, is_gsub: bool) -> Result<ChainRule, Error> {
            let mut cx = AddContext {
                values: &self.values,
                diagnostics: &mut self.diagnostics,
                context: "test",
            };
            lower_pattern(pattern, &Location::new(1), scope(is_gsub), &mut self.anon, &mut cx)
        }
    }

    #[test]
    fn backtrack_is_reversed() {
        let mut cx = TestContext::default();
        let pattern = GlyphPattern::new(vec![
            PatternNode::backtrack(gid(1)),
            PatternNode::backtrack(gid(2)),
            PatternNode::input(class([4, 3])),
            PatternNode::lookahead(gid(5)),
        ]);
        let rule = cx.lower(&pattern, true).unwrap();
        assert_eq!(rule.backtrack, vec![vec![gid(2)], vec![gid(1)]]);
        assert_eq!(rule.input, vec![vec![gid(3), gid(4)]]);
        assert!(rule.records.is_empty());
    }

    #[test]
    fn inline_substitutions_share_anonymous_lookups() {
        let mut cx = TestContext::default();
        let one = GlyphPattern::new(vec![
            PatternNode::backtrack(gid(1)),
            PatternNode::input(gid(2)).with_action(ContextAction::Substitute(gid(20).into())),
        ]);
        let two = GlyphPattern::new(vec![
            PatternNode::backtrack(gid(5)),
            PatternNode::input(gid(3)).with_action(ContextAction::Substitute(gid(30).into())),
        ]);
        // same target, different result: needs a new lookup
        let three = GlyphPattern::new(vec![
            PatternNode::input(gid(2)).with_action(ContextAction::Substitute(gid(21).into())),
        ]);
        let one = cx.lower(&one, true).unwrap();
        let two = cx.lower(&two, true).unwrap();
        let three = cx.lower(&three, true).unwrap();
        assert_eq!(one.records[0].1, two.records[0].1);
        assert_ne!(one.records[0].1, three.records[0].1);
        assert!(one.records[0].1.is_anonymous());
        assert_eq!(cx.anon.len(), 2);
    }

    #[test]
    fn inline_ligature_uses_every_input() {
        let mut cx = TestContext::default();
        let pattern = GlyphPattern::new(vec![
            PatternNode::input(gid(1)).with_action(ContextAction::Ligature(gid(9))),
            PatternNode::input(gid(2)),
            PatternNode::lookahead(gid(3)),
        ]);
        let rule = cx.lower(&pattern, true).unwrap();
        assert_eq!(rule.records.len(), 1);
        assert_eq!(rule.records[0].0, 0);
    }

    #[test]
    fn actions_must_match_table() {
        let mut cx = TestContext::default();
        let value = cx.values.add_value(ValueRecord::new().with_x_advance(5));
        let pattern = GlyphPattern::new(vec![
            PatternNode::input(gid(1)).with_action(ContextAction::Position(value))
        ]);
        assert!(cx.lower(&pattern, true).is_err());
        assert!(cx.lower(&pattern, false).is_ok());
    }

    #[test]
    fn chain_classes_share_coverage() {
        let mut pool = CoveragePool::default();
        let mut values = ValuePool::default();
        let mut diagnostics = Diagnostics::default();
        let mut builder = ChainBuilder::default();
        builder.push(ChainRule {
            backtrack: vec![vec![gid(1), gid(2)]],
            input: vec![vec![gid(1), gid(2)]],
            lookahead: vec![vec![gid(3)]],
            records: vec![],
        });
        let mut cx = BuildContext {
            coverages: &mut pool,
            values: &mut values,
            diagnostics: &mut diagnostics,
            context: "test",
        };
        let subtables = builder.build(&mut cx).unwrap();
        let [Subtable::ChainContext(chain)] = subtables.as_slice() else {
            panic!("expected a chain subtable");
        };
        assert_eq!(chain.backtrack, chain.input);
        assert_ne!(chain.input, chain.lookahead);
    }

    #[test]
    fn reverse_chain() {
        let mut pool = CoveragePool::default();
        let mut values = ValuePool::default();
        let mut diagnostics = Diagnostics::default();
        let mut builder = ReverseChainBuilder::default();
        let pattern = GlyphPattern::new(vec![
            PatternNode::input(class([12, 10])),
            PatternNode::lookahead(gid(40)),
        ]);
        let mut add = AddContext {
            values: &values,
            diagnostics: &mut diagnostics,
            context: "test",
        };
        builder
            .insert(&pattern, &class([22, 20]), &Location::new(1), &mut add)
            .unwrap();
        let two_inputs = GlyphPattern::new(vec![
            PatternNode::input(gid(1)),
            PatternNode::input(gid(2)),
        ]);
        assert!(builder
            .insert(&two_inputs, &class([3]), &Location::new(2), &mut add)
            .is_err());

        let mut cx = BuildContext {
            coverages: &mut pool,
            values: &mut values,
            diagnostics: &mut diagnostics,
            context: "test",
        };
        let subtables = builder.build(&mut cx).unwrap();
        let [Subtable::ReverseChainSingleSubst {
            coverage,
            substitutes,
            lookahead,
            ..
        }] = subtables.as_slice()
        else {
            panic!("expected reverse chain");
        };
        // substitutes follow coverage order
        assert_eq!(pool.coverage(*coverage).glyphs(), [gid(10), gid(12)]);
        assert_eq!(substitutes, &[gid(20), gid(22)]);
        assert_eq!(lookahead.len(), 1);
    }
}
