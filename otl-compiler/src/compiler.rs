//! The driver API
//!
//! A front end (typically a feature file compiler) opens features and
//! lookups, feeds rules into them, and finally calls [`Compiler::finish`]
//! to get the binary tables.
//!
//! ```
//! # use otl_compiler::*;
//! # use otl_types::{GlyphId16, Tag};
//! let mut compiler = Compiler::new(CompilerOptions::default());
//! let label = compiler.new_label();
//! compiler
//!     .feature_begin(Tag::new(b"latn"), Tag::new(b"dflt"), Tag::new(b"smcp"))
//!     .unwrap();
//! compiler
//!     .lookup_begin(LookupKind::SingleSub, LookupFlag::empty(), None, label, false)
//!     .unwrap();
//! let rule = Rule::SingleSub {
//!     target: GlyphId16::new(5).into(),
//!     replacement: GlyphId16::new(9).into(),
//! };
//! compiler.add_rule(Location::new(1), rule).unwrap();
//! compiler.lookup_end().unwrap();
//! compiler.feature_end().unwrap();
//! let tables = compiler.finish().unwrap();
//! assert!(tables.gsub.is_some());
//! assert!(tables.gpos.is_none());
//! ```

use std::{collections::HashMap, fmt::Display};

use indexmap::IndexMap;
use otl_types::{Tag, GPOS, GSUB};

use crate::{
    anon::AnonLookups,
    assemble::{assemble, FeatureEntry, LayoutIndex, TableInput},
    coverage::CoveragePool,
    error::{Diagnostic, Diagnostics, Error},
    gdef::GdefBuilder,
    info::{FeatureKey, Lookup, LookupKind, SubtableInfo},
    lookup_flag::LookupFlag,
    options::CompilerOptions,
    params::FeatureParams,
    rules::{Location, Rule},
    value::{Anchor, AnchorIndex, ValueIndex, ValuePool, ValueRecord},
    variations::{VariationIndexRemapping, VariationModel},
};

const ANONYMOUS_BIT: u32 = 1 << 31;

/// Identifies a lookup.
///
/// Labels are handed out by [`Compiler::new_label`]. A label can be used
/// before the lookup it names is defined; references are resolved to lookup
/// indices only when the tables are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(u32);

impl Label {
    pub(crate) fn anonymous(id: u32) -> Self {
        Label(id | ANONYMOUS_BIT)
    }

    /// `true` for labels of lookups synthesized for inline rule actions.
    pub fn is_anonymous(self) -> bool {
        self.0 & ANONYMOUS_BIT != 0
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(id: u32) -> Self {
        Label(id)
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_anonymous() {
            write!(f, "anonymous lookup #{}", self.0 & !ANONYMOUS_BIT)
        } else {
            write!(f, "lookup #{}", self.0)
        }
    }
}

/// The output of a build.
#[derive(Clone, Debug, Default)]
pub struct CompiledTables {
    pub gsub: Option<Vec<u8>>,
    pub gpos: Option<Vec<u8>>,
    pub gdef: Option<Vec<u8>>,
    pub gsub_index: Option<LayoutIndex>,
    pub gpos_index: Option<LayoutIndex>,
    /// Notes and warnings, in the order they were produced.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Debug, Default)]
enum LookupState {
    #[default]
    Closed,
    Open(Box<SubtableInfo>),
}

#[derive(Clone, Debug, Default)]
struct FeatureState {
    lookups: Vec<Label>,
    params: Option<FeatureParams>,
}

/// Builds GSUB, GPOS and GDEF from a stream of rules.
#[derive(Debug, Default)]
pub struct Compiler {
    options: CompilerOptions,
    next_label: u32,
    coverages: CoveragePool,
    values: ValuePool,
    gdef: GdefBuilder,
    diagnostics: Diagnostics,
    anon: AnonLookups,
    current_feature: Option<FeatureKey>,
    state: LookupState,
    /// Closed lookups, in definition order
    lookups: Vec<Lookup>,
    kinds: HashMap<Label, LookupKind>,
    features: IndexMap<FeatureKey, FeatureState>,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Compiler {
            options,
            ..Default::default()
        }
    }

    /// Set the master locations that value deltas refer to.
    ///
    /// This must happen before any variable value is used by a rule.
    pub fn set_variation_model(&mut self, model: VariationModel) {
        self.values.set_variation_model(model);
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn add_value(&mut self, value: ValueRecord) -> ValueIndex {
        self.values.add_value(value)
    }

    pub fn add_anchor(&mut self, anchor: Anchor) -> AnchorIndex {
        self.values.add_anchor(anchor)
    }

    pub fn gdef_mut(&mut self) -> &mut GdefBuilder {
        &mut self.gdef
    }

    fn ensure_closed(&self, action: &str) -> Result<(), Error> {
        match &self.state {
            LookupState::Closed => Ok(()),
            LookupState::Open(info) => Err(Error::InvalidState(format!(
                "cannot {action} while {} is open",
                info.context
            ))),
        }
    }

    fn current_feature(&self, action: &str) -> Result<FeatureKey, Error> {
        self.current_feature
            .ok_or_else(|| Error::InvalidState(format!("cannot {action} outside of a feature")))
    }

    pub fn feature_begin(&mut self, script: Tag, language: Tag, feature: Tag) -> Result<(), Error> {
        self.ensure_closed("begin a feature")?;
        if let Some(open) = self.current_feature {
            return Err(Error::InvalidState(format!(
                "cannot begin a feature while {open} is open"
            )));
        }
        let key = FeatureKey::new(script, language, feature);
        log::trace!("begin {key}");
        self.features.entry(key).or_default();
        self.current_feature = Some(key);
        Ok(())
    }

    pub fn feature_end(&mut self) -> Result<(), Error> {
        self.ensure_closed("end a feature")?;
        self.current_feature("end a feature")?;
        self.current_feature = None;
        Ok(())
    }

    /// Open a lookup.
    ///
    /// Inside a feature the lookup is also registered with that feature.
    pub fn lookup_begin(
        &mut self,
        kind: LookupKind,
        flags: LookupFlag,
        mark_filter_set: Option<u16>,
        label: Label,
        use_extension: bool,
    ) -> Result<(), Error> {
        self.ensure_closed("begin a lookup")?;
        if let Some(existing) = self.kinds.get(&label) {
            if *existing != kind {
                return Err(Error::LookupKindMismatch {
                    label,
                    first: existing.name(),
                    second: kind.name(),
                });
            }
            return Err(Error::InvalidState(format!("{label} is defined twice")));
        }
        self.kinds.insert(label, kind);
        let context = match self.current_feature {
            Some(feature) => {
                if let Some(state) = self.features.get_mut(&feature) {
                    state.lookups.push(label);
                }
                format!("{label} in {feature}")
            }
            None => label.to_string(),
        };
        log::debug!("begin {context} ({})", kind.name());
        let mut info = SubtableInfo::new(label, kind, self.current_feature, context);
        info.flags = flags;
        info.mark_filter_set = mark_filter_set;
        info.use_extension = use_extension;
        self.state = LookupState::Open(Box::new(info));
        Ok(())
    }

    /// Close the open lookup, building its subtables.
    pub fn lookup_end(&mut self) -> Result<(), Error> {
        let LookupState::Open(info) = std::mem::take(&mut self.state) else {
            return Err(Error::InvalidState(
                "cannot end a lookup when none is open".into(),
            ));
        };
        let lookup = info.close(&mut self.coverages, &mut self.values, &mut self.diagnostics)?;
        self.lookups.push(lookup);
        Ok(())
    }

    /// Start a new subtable in the open lookup.
    pub fn subtable_break(&mut self) -> Result<(), Error> {
        let info = match &mut self.state {
            LookupState::Open(info) => info,
            LookupState::Closed => {
                return Err(Error::InvalidState(
                    "cannot break a subtable outside of a lookup".into(),
                ))
            }
        };
        info.subtable_break(&mut self.diagnostics);
        Ok(())
    }

    /// Add a rule to the open lookup.
    pub fn add_rule(&mut self, location: Location, rule: Rule) -> Result<(), Error> {
        let info = match &mut self.state {
            LookupState::Open(info) => info,
            LookupState::Closed => {
                return Err(Error::InvalidState(format!(
                    "rule at {location} is outside of a lookup"
                )))
            }
        };
        info.add_rule(
            &location,
            &rule,
            &mut self.anon,
            &self.values,
            &mut self.diagnostics,
        )?;
        // only rules that made it into a lookup contribute glyph classes
        if self.options.infer_glyph_classes {
            self.gdef.infer_from_rule(&rule);
        }
        Ok(())
    }

    /// Register an existing (or not yet defined) lookup with the open feature.
    pub fn reference_lookup(&mut self, label: Label) -> Result<(), Error> {
        self.ensure_closed("reference a lookup")?;
        let feature = self.current_feature("reference a lookup")?;
        if let Some(state) = self.features.get_mut(&feature) {
            state.lookups.push(label);
        }
        Ok(())
    }

    /// Attach parameters to the open feature.
    pub fn set_feature_params(&mut self, params: FeatureParams) -> Result<(), Error> {
        self.ensure_closed("set feature parameters")?;
        let feature = self.current_feature("set feature parameters")?;
        let context = feature.to_string();
        if !params.allowed_for(feature.feature) {
            let message = format!("parameters of this kind are not allowed in '{}'", feature.feature);
            if self.options.strict_feature_params {
                return Err(Error::InvalidState(format!("{context}: {message}")));
            }
            self.diagnostics
                .warning(&context, format!("{message}; ignoring them"));
            return Ok(());
        }
        let Some(state) = self.features.get_mut(&feature) else {
            return Ok(());
        };
        if state.params.as_ref().is_some_and(|existing| *existing != params) {
            self.diagnostics
                .warning(&context, "feature parameters set twice; keeping the first");
        } else {
            state.params = Some(params);
        }
        Ok(())
    }

    fn check_lookup(&self, lookup: &Lookup) -> Result<(), Error> {
        if let Some(class) = lookup.flags.mark_attachment_class() {
            if !self.gdef.has_mark_attachment_class(class) {
                return Err(Error::MissingMarkClass {
                    context: lookup.context.clone(),
                    class,
                });
            }
        }
        if let Some(set) = lookup.mark_filter_set {
            if !self.gdef.has_mark_filter_set(set) {
                return Err(Error::MissingMarkFilterSet {
                    context: lookup.context.clone(),
                    set,
                });
            }
        }
        Ok(())
    }

    /// The feature entries of the table `tag`.
    fn feature_entries(&self, tag: Tag) -> Result<Vec<FeatureEntry>, Error> {
        let mut entries = Vec::new();
        for (key, state) in &self.features {
            let mut lookups = Vec::new();
            for label in &state.lookups {
                let kind = self.kinds.get(label).ok_or_else(|| Error::UnknownLabel {
                    context: key.to_string(),
                    label: *label,
                })?;
                if kind.table() == tag {
                    lookups.push(*label);
                }
            }
            let params = state.params.clone().filter(|params| params.table() == tag);
            if lookups.is_empty() && params.is_none() {
                continue;
            }
            entries.push(FeatureEntry {
                key: *key,
                lookups,
                params,
            });
        }
        Ok(entries)
    }

    /// Build the tables.
    pub fn finish(mut self) -> Result<CompiledTables, Error> {
        self.ensure_closed("finish")?;
        if let Some(feature) = self.current_feature {
            return Err(Error::InvalidState(format!(
                "cannot finish while {feature} is open"
            )));
        }
        let anon = std::mem::take(&mut self.anon).finish(
            &mut self.coverages,
            &mut self.values,
            &mut self.diagnostics,
        )?;
        for lookup in self.lookups.iter().chain(&anon) {
            self.check_lookup(lookup)?;
        }

        // caret values may add deltas, so the store is built after GDEF is resolved
        let gdef = std::mem::take(&mut self.gdef)
            .build(self.options.infer_glyph_classes, &mut self.values)?;
        let store = self.values.build_variation_store();
        let no_remap = VariationIndexRemapping::default();
        let remap = store.as_ref().map(|(_, remap)| remap).unwrap_or(&no_remap);

        let mut tables = CompiledTables::default();
        for tag in [GSUB, GPOS] {
            let lookups = self
                .lookups
                .iter()
                .chain(&anon)
                .filter(|lookup| lookup.kind.table() == tag)
                .cloned()
                .collect::<Vec<_>>();
            let features = self.feature_entries(tag)?;
            if lookups.is_empty() && features.is_empty() {
                continue;
            }
            let (bytes, index) = assemble(TableInput {
                tag,
                lookups: &lookups,
                features: &features,
                coverages: &self.coverages,
                remap,
                options: &self.options,
            })?;
            log::info!(
                "built '{tag}': {} lookups, {} features, {} bytes",
                lookups.len(),
                index.features.len(),
                bytes.len()
            );
            if tag == GSUB {
                tables.gsub = Some(bytes);
                tables.gsub_index = Some(index);
            } else {
                tables.gpos = Some(bytes);
                tables.gpos_index = Some(index);
            }
        }
        if !gdef.is_empty() || store.is_some() {
            let bytes = gdef.write(store.as_ref().map(|(store, _)| store), remap)?;
            log::info!("built 'GDEF': {} bytes", bytes.len());
            tables.gdef = Some(bytes);
        }
        tables.diagnostics = self.diagnostics.into_inner();
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use otl_types::GlyphId16;

    use crate::{
        error::Severity,
        rules::{GlyphClass, MarkAttachment, MarkClass},
    };

    use super::*;

    fn gid(raw: u16) -> GlyphId16 {
        GlyphId16::new(raw)
    }

    fn tag(raw: &[u8; 4]) -> Tag {
        Tag::new(raw)
    }

    fn single_sub(from: u16, to: u16) -> Rule {
        Rule::SingleSub {
            target: gid(from).into(),
            replacement: gid(to).into(),
        }
    }

    #[test]
    fn label_display() {
        assert_eq!(Label(3).to_string(), "lookup #3");
        assert_eq!(Label::anonymous(3).to_string(), "anonymous lookup #3");
        assert!(Label::anonymous(0).is_anonymous());
        assert!(!Label(0).is_anonymous());
    }

    #[test]
    fn labels_are_distinct() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let one = compiler.new_label();
        let two = compiler.new_label();
        assert_ne!(one, two);
    }

    #[test]
    fn rules_need_a_lookup() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        assert!(matches!(
            compiler.add_rule(Location::new(1), single_sub(1, 2)),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(compiler.lookup_end(), Err(Error::InvalidState(_))));
        assert!(matches!(compiler.feature_end(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn rejected_rule_leaves_glyph_classes_alone() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let anchor = compiler.add_anchor(Anchor::new(0, 0));
        let mark_class = MarkClass::new("top").with_marks(gid(100), anchor);
        let rule = Rule::MarkToBase {
            bases: gid(10).into(),
            attachments: vec![MarkAttachment::new(anchor, mark_class)],
        };
        assert!(matches!(
            compiler.add_rule(Location::new(3), rule),
            Err(Error::InvalidState(_))
        ));
        let tables = compiler.finish().unwrap();
        assert!(tables.gdef.is_none());
    }

    #[test]
    fn label_reuse() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let label = compiler.new_label();
        compiler
            .lookup_begin(LookupKind::SingleSub, LookupFlag::empty(), None, label, false)
            .unwrap();
        compiler.lookup_end().unwrap();
        let err = compiler
            .lookup_begin(LookupKind::SinglePos, LookupFlag::empty(), None, label, false)
            .unwrap_err();
        assert_eq!(
            err,
            Error::LookupKindMismatch {
                label,
                first: "single substitution",
                second: "single positioning",
            }
        );
    }

    #[test]
    fn standalone_lookup_referenced_later() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let label = compiler.new_label();
        compiler
            .lookup_begin(LookupKind::SingleSub, LookupFlag::empty(), None, label, false)
            .unwrap();
        compiler.add_rule(Location::new(1), single_sub(1, 2)).unwrap();
        compiler.lookup_end().unwrap();
        for lang in [b"dflt", b"TRK "] {
            compiler
                .feature_begin(tag(b"latn"), tag(lang), tag(b"smcp"))
                .unwrap();
            compiler.reference_lookup(label).unwrap();
            compiler.feature_end().unwrap();
        }
        let tables = compiler.finish().unwrap();
        let index = tables.gsub_index.unwrap();
        // both languages share one feature record
        assert_eq!(index.features.len(), 1);
        assert_eq!(index.scripts.len(), 2);
        assert_eq!(index.lookup_index(label), Some(0));
    }

    #[test]
    fn undefined_reference() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let label = compiler.new_label();
        compiler
            .feature_begin(tag(b"latn"), tag(b"dflt"), tag(b"liga"))
            .unwrap();
        compiler.reference_lookup(label).unwrap();
        compiler.feature_end().unwrap();
        assert!(matches!(
            compiler.finish(),
            Err(Error::UnknownLabel { label: l, .. }) if l == label
        ));
    }

    #[test]
    fn missing_mark_class_and_set() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let label = compiler.new_label();
        compiler
            .lookup_begin(
                LookupKind::SingleSub,
                LookupFlag::empty().with_mark_attachment_class(2),
                None,
                label,
                false,
            )
            .unwrap();
        compiler.lookup_end().unwrap();
        assert!(matches!(
            compiler.finish(),
            Err(Error::MissingMarkClass { class: 2, .. })
        ));

        let mut compiler = Compiler::new(CompilerOptions::default());
        let label = compiler.new_label();
        compiler.gdef_mut().add_mark_filter_set([gid(1)]);
        compiler
            .lookup_begin(LookupKind::SingleSub, LookupFlag::empty(), Some(1), label, false)
            .unwrap();
        compiler.lookup_end().unwrap();
        assert!(matches!(
            compiler.finish(),
            Err(Error::MissingMarkFilterSet { set: 1, .. })
        ));
    }

    #[test]
    fn feature_params_policy() {
        let params = FeatureParams::StylisticSet {
            ui_name_id: otl_types::NameId::new(256),
        };
        let mut compiler =
            Compiler::new(CompilerOptions::default().with_strict_feature_params(false));
        compiler
            .feature_begin(tag(b"DFLT"), tag(b"dflt"), tag(b"liga"))
            .unwrap();
        compiler.set_feature_params(params.clone()).unwrap();
        compiler.feature_end().unwrap();
        let tables = compiler.finish().unwrap();
        // nothing left to write
        assert!(tables.gsub.is_none());
        assert_eq!(tables.diagnostics.len(), 1);
        assert_eq!(tables.diagnostics[0].severity, Severity::Warning);

        let mut compiler = Compiler::new(CompilerOptions::default());
        compiler
            .feature_begin(tag(b"DFLT"), tag(b"dflt"), tag(b"liga"))
            .unwrap();
        assert!(compiler.set_feature_params(params.clone()).is_err());

        // a feature with only parameters is still written
        let mut compiler = Compiler::new(CompilerOptions::default());
        compiler
            .feature_begin(tag(b"DFLT"), tag(b"dflt"), tag(b"ss01"))
            .unwrap();
        compiler.set_feature_params(params.clone()).unwrap();
        compiler.feature_end().unwrap();
        let tables = compiler.finish().unwrap();
        let index = tables.gsub_index.unwrap();
        assert_eq!(index.features[0].params, Some(params));
        assert!(tables.gpos.is_none());
    }

    #[test]
    fn anonymous_lookups_come_last() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let calt = compiler.new_label();
        let later = compiler.new_label();
        compiler
            .feature_begin(tag(b"DFLT"), tag(b"dflt"), tag(b"calt"))
            .unwrap();
        compiler
            .lookup_begin(LookupKind::ChainSub, LookupFlag::empty(), None, calt, false)
            .unwrap();
        let pattern = crate::rules::GlyphPattern::new(vec![
            crate::rules::PatternNode::backtrack(gid(1)),
            crate::rules::PatternNode::input(gid(2))
                .with_action(crate::rules::ContextAction::Substitute(GlyphClass::from(gid(3)))),
        ]);
        compiler
            .add_rule(Location::new(3), Rule::Contextual(pattern))
            .unwrap();
        compiler.lookup_end().unwrap();
        compiler
            .lookup_begin(LookupKind::SingleSub, LookupFlag::empty(), None, later, false)
            .unwrap();
        compiler.add_rule(Location::new(5), single_sub(4, 5)).unwrap();
        compiler.lookup_end().unwrap();
        compiler.feature_end().unwrap();

        let tables = compiler.finish().unwrap();
        let index = tables.gsub_index.unwrap();
        assert_eq!(index.lookups.len(), 3);
        assert_eq!(index.lookup_index(calt), Some(0));
        assert_eq!(index.lookup_index(later), Some(1));
        let (anon, ix) = index.lookups.get_index(2).unwrap();
        assert!(anon.is_anonymous());
        assert_eq!(*ix, 2);
        // anonymous lookups are reached through the chain, not the feature
        assert_eq!(index.features[0].lookups, vec![0, 1]);
    }

    #[test]
    fn gdef_only_when_needed() {
        let mut compiler = Compiler::new(CompilerOptions::default());
        let label = compiler.new_label();
        compiler
            .lookup_begin(LookupKind::SingleSub, LookupFlag::empty(), None, label, false)
            .unwrap();
        compiler.add_rule(Location::new(1), single_sub(1, 2)).unwrap();
        compiler.lookup_end().unwrap();
        let tables = compiler.finish().unwrap();
        assert!(tables.gdef.is_none());
        assert!(tables.gsub.is_some());
    }
}
