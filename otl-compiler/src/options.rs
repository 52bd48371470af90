//! Compiler configuration

/// Options that control how layout tables are built.
///
/// The defaults match what a font compiler wants nearly all of the time;
/// the setters allow adjusting individual fields builder-style:
///
/// ```
/// # use otl_compiler::CompilerOptions;
/// let options = CompilerOptions::default().with_max_layout_iterations(16);
/// assert_eq!(options.max_layout_iterations, 16);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompilerOptions {
    /// Write every lookup as an extension lookup.
    pub use_extension_lookups: bool,
    /// Promote lookups to extension lookups when their offsets overflow.
    ///
    /// If this is `false`, an overflowing lookup that did not ask for
    /// extension is a fatal error.
    pub auto_extension: bool,
    /// The number of layout passes attempted before giving up.
    pub max_layout_iterations: usize,
    /// Infer GDEF glyph classes from mark attachment lookups when the
    /// caller does not supply any.
    pub infer_glyph_classes: bool,
    /// Reject `ssXX`/`cvXX` parameters on features with other tags.
    pub strict_feature_params: bool,
}

impl CompilerOptions {
    /// Default number of layout passes.
    pub const DEFAULT_MAX_LAYOUT_ITERATIONS: usize = 8;

    pub fn with_extension_lookups(mut self, flag: bool) -> Self {
        self.use_extension_lookups = flag;
        self
    }

    pub fn with_auto_extension(mut self, flag: bool) -> Self {
        self.auto_extension = flag;
        self
    }

    pub fn with_max_layout_iterations(mut self, iterations: usize) -> Self {
        self.max_layout_iterations = iterations;
        self
    }

    pub fn with_inferred_glyph_classes(mut self, flag: bool) -> Self {
        self.infer_glyph_classes = flag;
        self
    }

    pub fn with_strict_feature_params(mut self, flag: bool) -> Self {
        self.strict_feature_params = flag;
        self
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            use_extension_lookups: false,
            auto_extension: true,
            max_layout_iterations: Self::DEFAULT_MAX_LAYOUT_ITERATIONS,
            infer_glyph_classes: true,
            strict_feature_params: true,
        }
    }
}
