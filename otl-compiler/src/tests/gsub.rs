use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use read_fonts::{
    tables::{
        gsub::{Gsub, SingleSubst, SubstitutionLookup, SubstitutionSubtables},
        layout::{ChainedSequenceContext, CoverageTable},
    },
    FontData, FontRead, ReadError,
};
use rstest::rstest;

use super::{class, features, gid, glyphs, language_systems, tag, TestBuild};
use crate::{
    ContextAction, GlyphClass, GlyphPattern, Label, LookupKind, PatternNode, Rule,
};

/// The subtables of a lookup, which must be of the given kind.
macro_rules! subtables {
    ($lookup:expr, $kind:ident) => {
        match $lookup.subtables().unwrap() {
            SubstitutionSubtables::$kind(subtables) => {
                subtables.iter().map(Result::unwrap).collect::<Vec<_>>()
            }
            _ => panic!("expected {} subtables", stringify!($kind)),
        }
    };
}

fn single(target: u16, replacement: u16) -> Rule {
    Rule::SingleSub {
        target: gid(target).into(),
        replacement: gid(replacement).into(),
    }
}

fn lookups<'a>(gsub: &Gsub<'a>) -> Vec<SubstitutionLookup<'a>> {
    gsub.lookup_list()
        .unwrap()
        .lookups()
        .iter()
        .map(Result::unwrap)
        .collect()
}

/// The lookup type, looking through extensions.
fn lookup_type(lookup: &SubstitutionLookup) -> u16 {
    match lookup.subtables().unwrap() {
        SubstitutionSubtables::Single(_) => 1,
        SubstitutionSubtables::Multiple(_) => 2,
        SubstitutionSubtables::Alternate(_) => 3,
        SubstitutionSubtables::Ligature(_) => 4,
        SubstitutionSubtables::Contextual(_) => 5,
        SubstitutionSubtables::ChainContextual(_) => 6,
        SubstitutionSubtables::Reverse(_) => 8,
    }
}

fn single_format(subtable: &SingleSubst) -> u16 {
    match subtable {
        SingleSubst::Format1(_) => 1,
        SingleSubst::Format2(_) => 2,
    }
}

fn single_map(subtable: &SingleSubst) -> BTreeMap<u16, u16> {
    match subtable {
        SingleSubst::Format1(table) => {
            let delta = table.delta_glyph_id() as u16;
            glyphs(&table.coverage().unwrap())
                .into_iter()
                .map(|gid| (gid, gid.wrapping_add(delta)))
                .collect()
        }
        SingleSubst::Format2(table) => {
            let substitutes = table.substitute_glyph_ids();
            assert_eq!(substitutes.len(), table.glyph_count() as usize);
            glyphs(&table.coverage().unwrap())
                .into_iter()
                .zip(substitutes.iter().map(|gid| gid.get().to_u16()))
                .collect()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Chain {
    backtrack: Vec<Vec<u16>>,
    input: Vec<Vec<u16>>,
    lookahead: Vec<Vec<u16>>,
    /// (sequence index, lookup index)
    records: Vec<(u16, u16)>,
}

fn coverage_list<'a>(
    coverages: impl Iterator<Item = Result<CoverageTable<'a>, ReadError>>,
) -> Vec<Vec<u16>> {
    coverages.map(|coverage| glyphs(&coverage.unwrap())).collect()
}

fn chain(subtable: &ChainedSequenceContext) -> Chain {
    let ChainedSequenceContext::Format3(table) = subtable else {
        panic!("expected a format 3 chain");
    };
    Chain {
        backtrack: coverage_list(table.backtrack_coverages().iter()),
        input: coverage_list(table.input_coverages().iter()),
        lookahead: coverage_list(table.lookahead_coverages().iter()),
        records: table
            .seq_lookup_records()
            .iter()
            .map(|record| (record.sequence_index(), record.lookup_list_index()))
            .collect(),
    }
}

fn chain_records(lookup: &SubstitutionLookup) -> Vec<Vec<(u16, u16)>> {
    subtables!(lookup, ChainContextual)
        .iter()
        .map(|subtable| chain(subtable).records)
        .collect()
}

#[test]
fn single_sub_with_common_delta() {
    let mut build = TestBuild::new();
    build.begin_feature(b"smcp");
    build.lookup(LookupKind::SingleSub, [single(5, 9), single(7, 11)]);
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();

    assert_eq!(
        features(&gsub.feature_list().unwrap()),
        vec![(tag(b"smcp"), vec![0])]
    );
    assert_eq!(
        language_systems(&gsub.script_list().unwrap()),
        BTreeMap::from([((tag(b"DFLT"), tag(b"dflt")), vec![0])])
    );
    let lookups = lookups(&gsub);
    assert_eq!(lookups[0].lookup_type(), 1);
    let subtables = subtables!(lookups[0], Single);
    assert_eq!(subtables.len(), 1);
    let SingleSubst::Format1(table) = &subtables[0] else {
        panic!("expected format 1");
    };
    assert_eq!(table.delta_glyph_id(), 4);
    assert_eq!(glyphs(&table.coverage().unwrap()), vec![5, 7]);
}

#[rstest]
#[case::one_glyph(&[(3, 10)], 1)]
#[case::negative_delta(&[(10, 3), (12, 5)], 1)]
#[case::different_deltas(&[(1, 3), (2, 5)], 2)]
#[case::delta_wraps(&[(1, 40001), (2, 40002)], 1)]
#[case::wide_different_deltas(&[(0, 40000), (1, 3)], 2)]
#[case::unsorted_input(&[(20, 21), (4, 5), (9, 10)], 1)]
fn single_sub_format(#[case] pairs: &[(u16, u16)], #[case] format: u16) {
    let mut build = TestBuild::new();
    build.begin_feature(b"test");
    build.lookup(
        LookupKind::SingleSub,
        pairs.iter().map(|(a, b)| single(*a, *b)),
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    let subtables = subtables!(lookups(&gsub)[0], Single);
    assert_eq!(single_format(&subtables[0]), format);
    let expected = pairs.iter().copied().collect::<BTreeMap<_, _>>();
    assert_eq!(single_map(&subtables[0]), expected);
}

#[test]
fn wrapping_delta_is_stored_as_i16() {
    let mut build = TestBuild::new();
    build.begin_feature(b"test");
    build.lookup(LookupKind::SingleSub, [single(1, 40001), single(2, 40002)]);
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    let subtables = subtables!(lookups(&gsub)[0], Single);
    let SingleSubst::Format1(table) = &subtables[0] else {
        panic!("expected format 1");
    };
    assert_eq!(table.delta_glyph_id(), 40000u16 as i16);
}

#[test]
fn large_alternate_lookup_is_split() {
    let mut build = TestBuild::new();
    build.begin_feature(b"aalt");
    let alternates = (0..33).map(|i| gid(2000 + i)).collect::<GlyphClass>();
    build.lookup(
        LookupKind::AlternateSub,
        (0..1000).map(|target| Rule::AlternateSub {
            target: gid(target),
            alternates: alternates.clone(),
        }),
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();

    let lookups = lookups(&gsub);
    assert_eq!(lookup_type(&lookups[0]), 3);
    let subtables = subtables!(lookups[0], Alternate);
    assert!(subtables.len() >= 2, "{} subtables", subtables.len());
    let mut seen = Vec::new();
    for subtable in &subtables {
        let alternate_sets = subtable.alternate_sets();
        for set in alternate_sets.iter() {
            assert_eq!(set.unwrap().alternate_glyph_ids().len(), 33);
        }
        seen.extend(glyphs(&subtable.coverage().unwrap()));
    }
    assert_eq!(seen, (0..1000).collect::<Vec<_>>());
}

#[test]
fn ligatures() {
    let mut build = TestBuild::new();
    build.begin_feature(b"liga");
    build.lookup(
        LookupKind::LigatureSub,
        [
            Rule::LigatureSub {
                components: vec![gid(10).into(), gid(11).into()],
                replacement: gid(100),
            },
            Rule::LigatureSub {
                components: vec![gid(10).into(), gid(11).into(), gid(12).into()],
                replacement: gid(101),
            },
            Rule::LigatureSub {
                components: vec![class([20, 21]), gid(22).into()],
                replacement: gid(102),
            },
        ],
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    let subtables = subtables!(lookups(&gsub)[0], Ligature);

    let table = &subtables[0];
    let mut ligatures = Vec::new();
    let firsts = glyphs(&table.coverage().unwrap());
    for (first, set) in firsts.into_iter().zip(table.ligature_sets().iter()) {
        for ligature in set.unwrap().ligatures().iter() {
            let ligature = ligature.unwrap();
            let mut components = vec![first];
            components.extend(
                ligature
                    .component_glyph_ids()
                    .iter()
                    .map(|gid| gid.get().to_u16()),
            );
            ligatures.push((components, ligature.ligature_glyph().to_u16()));
        }
    }
    assert_eq!(
        ligatures,
        vec![
            (vec![10, 11, 12], 101),
            (vec![10, 11], 100),
            (vec![20, 22], 102),
            (vec![21, 22], 102),
        ]
    );
}

#[test]
fn multiple_sub() {
    let mut build = TestBuild::new();
    build.begin_feature(b"ccmp");
    build.lookup(
        LookupKind::MultipleSub,
        [
            Rule::MultipleSub {
                target: gid(8),
                replacement: vec![gid(1), gid(2)],
            },
            Rule::MultipleSub {
                target: gid(3),
                replacement: vec![gid(4), gid(5), gid(6)],
            },
        ],
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    let lookups = lookups(&gsub);
    assert_eq!(lookups[0].lookup_type(), 2);
    let subtables = subtables!(lookups[0], Multiple);

    let table = &subtables[0];
    let sequences = glyphs(&table.coverage().unwrap())
        .into_iter()
        .zip(table.sequences().iter())
        .map(|(gid, sequence)| {
            let substitutes = sequence
                .unwrap()
                .substitute_glyph_ids()
                .iter()
                .map(|gid| gid.get().to_u16())
                .collect::<Vec<_>>();
            (gid, substitutes)
        })
        .collect::<BTreeMap<_, _>>();
    assert_eq!(
        sequences,
        BTreeMap::from([(3, vec![4, 5, 6]), (8, vec![1, 2])])
    );
}

#[test]
fn contextual_with_inline_substitution() {
    let mut build = TestBuild::new();
    build.begin_feature(b"calt");
    let pattern = GlyphPattern::new(vec![
        PatternNode::backtrack(class([1, 2])),
        PatternNode::backtrack(gid(3)),
        PatternNode::input(gid(5)).with_action(ContextAction::Substitute(gid(6).into())),
        PatternNode::lookahead(gid(7)),
    ]);
    build.lookup(LookupKind::ChainSub, [Rule::Contextual(pattern)]);
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();

    let lookups = lookups(&gsub);
    assert_eq!(lookups.len(), 2);
    assert_eq!(lookups[0].lookup_type(), 6);
    // the anonymous lookup is not part of the feature
    assert_eq!(features(&gsub.feature_list().unwrap())[0].1, vec![0]);
    let chains = subtables!(lookups[0], ChainContextual);
    assert_eq!(
        chain(&chains[0]),
        Chain {
            backtrack: vec![vec![3], vec![1, 2]],
            input: vec![vec![5]],
            lookahead: vec![vec![7]],
            records: vec![(0, 1)],
        }
    );
    assert_eq!(lookups[1].lookup_type(), 1);
    let anon = subtables!(lookups[1], Single);
    assert_eq!(single_map(&anon[0]), BTreeMap::from([(5, 6)]));
}

#[test]
fn inline_actions_share_an_anonymous_lookup() {
    let mut build = TestBuild::new();
    build.begin_feature(b"calt");
    let rule = |before: u16, target: u16, replacement: u16| {
        Rule::Contextual(GlyphPattern::new(vec![
            PatternNode::backtrack(gid(before)),
            PatternNode::input(gid(target))
                .with_action(ContextAction::Substitute(gid(replacement).into())),
        ]))
    };
    build.lookup(
        LookupKind::ChainSub,
        // the third rule conflicts with the first, so needs a new lookup
        [rule(1, 10, 20), rule(2, 11, 21), rule(3, 10, 22)],
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();

    let lookups = lookups(&gsub);
    assert_eq!(lookups.len(), 3);
    assert_eq!(
        chain_records(&lookups[0]),
        vec![vec![(0, 1)], vec![(0, 1)], vec![(0, 2)]]
    );
    assert_eq!(
        single_map(&subtables!(lookups[1], Single)[0]),
        BTreeMap::from([(10, 20), (11, 21)])
    );
    assert_eq!(
        single_map(&subtables!(lookups[2], Single)[0]),
        BTreeMap::from([(10, 22)])
    );
}

#[test]
fn ignore_rule_has_no_records() {
    let mut build = TestBuild::new();
    build.begin_feature(b"calt");
    let target = build.lookup(LookupKind::SingleSub, [single(5, 6)]);
    let ignore = GlyphPattern::new(vec![
        PatternNode::backtrack(gid(1)),
        PatternNode::input(gid(5)),
    ]);
    let apply = GlyphPattern::new(vec![
        PatternNode::input(gid(5)).with_action(ContextAction::Lookup(target))
    ]);
    build.lookup(
        LookupKind::ChainSub,
        [Rule::Contextual(ignore), Rule::Contextual(apply)],
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    assert_eq!(
        chain_records(&lookups(&gsub)[1]),
        vec![vec![], vec![(0, 0)]]
    );
}

#[test]
fn reverse_chain() {
    let mut build = TestBuild::new();
    build.begin_feature(b"rclt");
    let pattern = GlyphPattern::new(vec![
        PatternNode::backtrack(gid(1)),
        PatternNode::input(class([4, 3])),
        PatternNode::lookahead(class([8, 9])),
    ]);
    build.lookup(
        LookupKind::ReverseChainSub,
        [Rule::ReverseChain {
            pattern,
            replacement: class([14, 13]),
        }],
    );
    build.end_feature();
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    let lookups = lookups(&gsub);
    assert_eq!(lookups[0].lookup_type(), 8);

    let subtables = subtables!(lookups[0], Reverse);
    let table = &subtables[0];
    assert_eq!(coverage_list(table.backtrack_coverages().iter()), vec![vec![1]]);
    assert_eq!(
        coverage_list(table.lookahead_coverages().iter()),
        vec![vec![8, 9]]
    );
    let mapping = glyphs(&table.coverage().unwrap())
        .into_iter()
        .zip(
            table
                .substitute_glyph_ids()
                .iter()
                .map(|gid| gid.get().to_u16()),
        )
        .collect::<BTreeMap<_, _>>();
    assert_eq!(mapping, BTreeMap::from([(3, 13), (4, 14)]));
}

#[test]
fn forward_reference() {
    let mut build = TestBuild::new();
    // the chain refers to a lookup that is defined afterwards
    let later: Label = build.compiler.new_label();
    build.begin_feature(b"calt");
    let pattern = GlyphPattern::new(vec![
        PatternNode::input(gid(5)).with_action(ContextAction::Lookup(later)),
        PatternNode::lookahead(gid(6)),
    ]);
    build.lookup(LookupKind::ChainSub, [Rule::Contextual(pattern)]);
    build.end_feature();
    build
        .compiler
        .lookup_begin(
            LookupKind::SingleSub,
            crate::LookupFlag::empty(),
            None,
            later,
            false,
        )
        .unwrap();
    let location = build.next_location();
    build.compiler.add_rule(location, single(5, 50)).unwrap();
    build.compiler.lookup_end().unwrap();

    let tables = build.finish();
    let index = tables.gsub_index.clone().unwrap();
    assert_eq!(index.lookup_index(later), Some(1));
    let bytes = tables.gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    assert_eq!(chain_records(&lookups(&gsub)[0]), vec![vec![(0, 1)]]);
}

#[test]
fn scripts_and_languages() {
    let mut build = TestBuild::new();
    let label = build.lookup(LookupKind::SingleSub, [single(1, 2)]);
    for (script, lang) in [(b"latn", b"dflt"), (b"latn", b"DEU "), (b"cyrl", b"dflt")] {
        build
            .compiler
            .feature_begin(tag(script), tag(lang), tag(b"smcp"))
            .unwrap();
        build.compiler.reference_lookup(label).unwrap();
        build.compiler.feature_end().unwrap();
    }
    let bytes = build.finish().gsub.unwrap();
    let gsub = Gsub::read(FontData::new(&bytes)).unwrap();
    assert_eq!(features(&gsub.feature_list().unwrap()).len(), 1);
    let systems = language_systems(&gsub.script_list().unwrap());
    assert_eq!(
        systems.keys().copied().collect::<Vec<_>>(),
        vec![
            (tag(b"cyrl"), tag(b"dflt")),
            (tag(b"latn"), tag(b"DEU ")),
            (tag(b"latn"), tag(b"dflt")),
        ]
    );
    assert!(systems.values().all(|features| features == &[0]));
}
