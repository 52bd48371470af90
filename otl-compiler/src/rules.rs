//! The rules a front end feeds to the compiler
//!
//! Rules arrive already parsed: glyph names are resolved to glyph ids,
//! values and anchors are in the [`ValuePool`](crate::value::ValuePool),
//! and contextual patterns are split into backtrack, input and lookahead
//! positions.

use std::{fmt::Display, sync::Arc};

use otl_types::GlyphId16;

use crate::{
    compiler::Label,
    value::{AnchorIndex, ValueIndex},
};

/// Where a rule came from, for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Option<Arc<str>>,
    pub line: u32,
}

impl Location {
    pub fn new(line: u32) -> Self {
        Location { file: None, line }
    }

    pub fn in_file(mut self, file: impl Into<Arc<str>>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

/// An ordered sequence of glyphs.
///
/// Order matters when two classes are mapped pairwise, as in
/// `sub [a b] by [a.sc b.sc]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlyphClass(Vec<GlyphId16>);

impl GlyphClass {
    pub fn new(glyphs: Vec<GlyphId16>) -> Self {
        GlyphClass(glyphs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GlyphId16> + '_ {
        self.0.iter().copied()
    }

    pub fn glyphs(&self) -> &[GlyphId16] {
        &self.0
    }

    /// The glyphs in ascending order, without duplicates.
    pub(crate) fn sorted(&self) -> Vec<GlyphId16> {
        let mut glyphs = self.0.clone();
        glyphs.sort_unstable();
        glyphs.dedup();
        glyphs
    }
}

impl From<GlyphId16> for GlyphClass {
    fn from(glyph: GlyphId16) -> Self {
        GlyphClass(vec![glyph])
    }
}

impl FromIterator<GlyphId16> for GlyphClass {
    fn from_iter<T: IntoIterator<Item = GlyphId16>>(iter: T) -> Self {
        GlyphClass(iter.into_iter().collect())
    }
}

/// The role of one position in a contextual pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Backtrack,
    /// A marked (input) position.
    Input,
    Lookahead,
}

/// What happens at a marked position of a contextual rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContextAction {
    /// Apply an existing lookup.
    Lookup(Label),
    /// Inline single substitution: `sub a' by b`
    Substitute(GlyphClass),
    /// Inline multiple substitution: `sub a' by b c`
    SubstituteSequence(Vec<GlyphId16>),
    /// Inline ligature substitution of every input position, starting here.
    Ligature(GlyphId16),
    /// Inline single positioning: `pos a' 20`
    Position(ValueIndex),
}

/// One position of a contextual pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PatternNode {
    pub glyphs: GlyphClass,
    pub role: NodeRole,
    pub actions: Vec<ContextAction>,
}

impl PatternNode {
    pub fn backtrack(glyphs: impl Into<GlyphClass>) -> Self {
        Self::new(glyphs.into(), NodeRole::Backtrack)
    }

    pub fn input(glyphs: impl Into<GlyphClass>) -> Self {
        Self::new(glyphs.into(), NodeRole::Input)
    }

    pub fn lookahead(glyphs: impl Into<GlyphClass>) -> Self {
        Self::new(glyphs.into(), NodeRole::Lookahead)
    }

    fn new(glyphs: GlyphClass, role: NodeRole) -> Self {
        PatternNode {
            glyphs,
            role,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ContextAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_marked(&self) -> bool {
        self.role == NodeRole::Input
    }
}

/// A contextual glyph pattern, in logical order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlyphPattern(pub Vec<PatternNode>);

impl GlyphPattern {
    pub fn new(nodes: Vec<PatternNode>) -> Self {
        GlyphPattern(nodes)
    }

    pub fn backtrack(&self) -> impl Iterator<Item = &PatternNode> {
        self.0.iter().filter(|n| n.role == NodeRole::Backtrack)
    }

    pub fn input(&self) -> impl Iterator<Item = &PatternNode> {
        self.0.iter().filter(|n| n.role == NodeRole::Input)
    }

    pub fn lookahead(&self) -> impl Iterator<Item = &PatternNode> {
        self.0.iter().filter(|n| n.role == NodeRole::Lookahead)
    }

    /// Check that roles appear as backtrack*, input+, lookahead*.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let mut state = NodeRole::Backtrack;
        let mut saw_input = false;
        for node in &self.0 {
            if node.glyphs.is_empty() {
                return Err("empty glyph class in pattern".into());
            }
            match (state, node.role) {
                (NodeRole::Backtrack, role) => state = role,
                (NodeRole::Input, NodeRole::Input | NodeRole::Lookahead) => state = node.role,
                (NodeRole::Lookahead, NodeRole::Lookahead) => (),
                _ => return Err("marked glyphs must be contiguous".into()),
            }
            if node.role == NodeRole::Input {
                saw_input = true;
            } else if !node.actions.is_empty() {
                return Err("actions are only allowed on marked glyphs".into());
            }
        }
        if !saw_input {
            return Err("contextual rule has no marked glyphs".into());
        }
        Ok(())
    }
}

/// A mark class: marks with the anchor each attaches by.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MarkClass {
    pub name: Arc<str>,
    pub marks: Vec<(GlyphId16, AnchorIndex)>,
}

impl MarkClass {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        MarkClass {
            name: name.into(),
            marks: Vec::new(),
        }
    }

    /// Add every glyph of `glyphs`, all using the same anchor.
    pub fn with_marks(mut self, glyphs: impl Into<GlyphClass>, anchor: AnchorIndex) -> Self {
        self.marks
            .extend(glyphs.into().iter().map(|gid| (gid, anchor)));
        self
    }
}

/// An anchor on a base (or ligature component) for one mark class.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MarkAttachment {
    pub anchor: AnchorIndex,
    pub mark_class: MarkClass,
}

impl MarkAttachment {
    pub fn new(anchor: AnchorIndex, mark_class: MarkClass) -> Self {
        MarkAttachment { anchor, mark_class }
    }
}

/// A single rule of a lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    /// `sub a by b`, `sub [a b] by [c d]` or `sub [a b] by c`
    SingleSub {
        target: GlyphClass,
        replacement: GlyphClass,
    },
    /// `sub a by b c`
    MultipleSub {
        target: GlyphId16,
        replacement: Vec<GlyphId16>,
    },
    /// `sub a from [b c]`
    AlternateSub {
        target: GlyphId16,
        alternates: GlyphClass,
    },
    /// `sub a [b c] d by e`
    LigatureSub {
        components: Vec<GlyphClass>,
        replacement: GlyphId16,
    },
    /// A chaining contextual rule (substitution or positioning, per the
    /// lookup); a pattern without actions is an `ignore` rule.
    Contextual(GlyphPattern),
    /// `rsub a b' c by d`: the single marked position is replaced.
    ReverseChain {
        pattern: GlyphPattern,
        replacement: GlyphClass,
    },
    /// `pos a 10`
    SinglePos { glyphs: GlyphClass, value: ValueIndex },
    /// `pos a b 10`, `pos @A @B 10` or `enum pos a @B 10`
    PairPos {
        first: GlyphClass,
        second: GlyphClass,
        first_value: Option<ValueIndex>,
        second_value: Option<ValueIndex>,
        /// Treat the classes as a list of specific glyph pairs.
        enumerate: bool,
    },
    /// `pos cursive a <anchor> <anchor>`
    Cursive {
        glyphs: GlyphClass,
        entry: Option<AnchorIndex>,
        exit: Option<AnchorIndex>,
    },
    /// `pos base a <anchor> mark @M`
    MarkToBase {
        bases: GlyphClass,
        attachments: Vec<MarkAttachment>,
    },
    /// `pos mark a <anchor> mark @M`
    MarkToMark {
        base_marks: GlyphClass,
        attachments: Vec<MarkAttachment>,
    },
    /// `pos ligature a <anchor> mark @M ligComponent <anchor NULL>`
    ///
    /// One entry per component; an empty list is a component without
    /// anchors.
    MarkToLigature {
        ligatures: GlyphClass,
        components: Vec<Vec<MarkAttachment>>,
    },
}
