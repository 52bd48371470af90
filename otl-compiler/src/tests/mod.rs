//! End-to-end tests: rules go in through the [`Compiler`], and the tables
//! that come out are read back with `read-fonts`.

mod gsub;

use std::collections::BTreeMap;

use otl_types::{GlyphId16, Tag};
use read_fonts::tables::layout::{ClassDef, CoverageTable, FeatureList, ScriptList};

use crate::{
    CompiledTables, Compiler, CompilerOptions, GlyphClass, Label, Location, LookupFlag,
    LookupKind, Rule,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gid(raw: u16) -> GlyphId16 {
    GlyphId16::new(raw)
}

fn tag(raw: &[u8; 4]) -> Tag {
    Tag::new(raw)
}

fn class<const N: usize>(raw: [u16; N]) -> GlyphClass {
    raw.iter().copied().map(gid).collect()
}

/// Drives a [`Compiler`] through the common case: one feature under
/// `DFLT`/`dflt`, with lookups added one after another.
struct TestBuild {
    compiler: Compiler,
    line: u32,
}

impl TestBuild {
    fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    fn with_options(options: CompilerOptions) -> Self {
        init_logging();
        TestBuild {
            compiler: Compiler::new(options),
            line: 0,
        }
    }

    fn begin_feature(&mut self, feature: &[u8; 4]) -> &mut Self {
        self.compiler
            .feature_begin(tag(b"DFLT"), tag(b"dflt"), tag(feature))
            .unwrap();
        self
    }

    fn end_feature(&mut self) -> &mut Self {
        self.compiler.feature_end().unwrap();
        self
    }

    /// Add a lookup of `kind` with the given rules, returning its label.
    fn lookup(&mut self, kind: LookupKind, rules: impl IntoIterator<Item = Rule>) -> Label {
        self.lookup_with(kind, LookupFlag::empty(), None, false, rules)
    }

    fn lookup_with(
        &mut self,
        kind: LookupKind,
        flags: LookupFlag,
        mark_filter_set: Option<u16>,
        use_extension: bool,
        rules: impl IntoIterator<Item = Rule>,
    ) -> Label {
        let label = self.compiler.new_label();
        self.compiler
            .lookup_begin(kind, flags, mark_filter_set, label, use_extension)
            .unwrap();
        for rule in rules {
            let location = self.next_location();
            self.compiler.add_rule(location, rule).unwrap();
        }
        self.compiler.lookup_end().unwrap();
        label
    }

    fn next_location(&mut self) -> Location {
        self.line += 1;
        Location::new(self.line).in_file("test.fea")
    }

    fn finish(self) -> CompiledTables {
        self.compiler.finish().unwrap()
    }
}

fn glyphs(coverage: &CoverageTable) -> Vec<u16> {
    coverage.iter().map(|gid| gid.to_u16()).collect()
}

/// The glyphs of a ClassDef with a non-zero class.
fn classes(class_def: &ClassDef) -> BTreeMap<u16, u16> {
    class_def
        .iter()
        .filter(|(_, class)| *class != 0)
        .map(|(gid, class)| (gid.to_u16(), class))
        .collect()
}

fn read_tag(raw: read_fonts::types::Tag) -> Tag {
    Tag::new(&raw.to_be_bytes())
}

/// The features of each (script, language), by feature index.
fn language_systems(script_list: &ScriptList) -> BTreeMap<(Tag, Tag), Vec<u16>> {
    let mut out = BTreeMap::new();
    for record in script_list.script_records() {
        let script = record.script(script_list.offset_data()).unwrap();
        let script_tag = read_tag(record.script_tag());
        let mut lang_systems = Vec::new();
        if let Some(default) = script.default_lang_sys() {
            lang_systems.push((tag(b"dflt"), default.unwrap()));
        }
        for lang in script.lang_sys_records() {
            let lang_sys = lang.lang_sys(script.offset_data()).unwrap();
            lang_systems.push((read_tag(lang.lang_sys_tag()), lang_sys));
        }
        for (lang_tag, lang_sys) in lang_systems {
            assert_eq!(lang_sys.required_feature_index(), 0xFFFF);
            let features = lang_sys
                .feature_indices()
                .iter()
                .map(|index| index.get())
                .collect();
            out.insert((script_tag, lang_tag), features);
        }
    }
    out
}

/// Each feature's tag and lookup indices, in feature list order.
fn features(feature_list: &FeatureList) -> Vec<(Tag, Vec<u16>)> {
    feature_list
        .feature_records()
        .iter()
        .map(|record| {
            let feature = record.feature(feature_list.offset_data()).unwrap();
            let lookups = feature
                .lookup_list_indices()
                .iter()
                .map(|index| index.get())
                .collect();
            (read_tag(record.feature_tag()), lookups)
        })
        .collect()
}
