//! Errors and diagnostics produced while compiling layout tables

use std::fmt::{Display, Formatter};

use otl_types::{GlyphId16, Tag};

use crate::{compiler::Label, rules::Location};

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Informational; the input was accepted as written.
    Note,
    /// Something looks wrong, but a table can still be built.
    Warning,
    /// The build cannot continue. These are reported as an [`Error`].
    Fatal,
}

/// A non-fatal message collected during a build.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub severity: Severity,
    /// The feature/script/language/lookup the message concerns.
    pub context: String,
    pub message: String,
}

/// A value that does not fit in the field it has to be written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overflow {
    /// The construct that overflowed, e.g. "coverage offset".
    pub what: &'static str,
    pub value: usize,
    pub limit: usize,
}

/// A fatal error; the whole build is abandoned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Two rules in the same lookup disagree.
    ConflictingRule {
        context: String,
        message: String,
        first: Location,
        second: Location,
    },
    /// Two different anchors were given for the same glyph and slot.
    AnchorConflict {
        context: String,
        glyph: GlyphId16,
        /// The slot in question, e.g. "mark class 'top'" or "component 2"
        slot: String,
        first: Location,
        second: Location,
    },
    /// A rule that cannot be expressed in the current lookup.
    InvalidRule {
        context: String,
        location: Location,
        message: String,
    },
    /// A table or subtable is too large for its offsets or counts.
    Overflow { context: String, overflow: Overflow },
    /// Offset resolution did not settle within the configured iterations.
    NotConverged { table: Tag, iterations: usize },
    /// A label was used by lookups of two different kinds.
    LookupKindMismatch {
        label: Label,
        first: &'static str,
        second: &'static str,
    },
    /// A lookup reference that never got a definition.
    UnknownLabel { context: String, label: Label },
    /// A glyph was put in two different mark attachment classes.
    MarkClassConflict {
        context: String,
        glyph: GlyphId16,
        first: u16,
        second: u16,
    },
    /// A lookup flag names a mark attachment class that was never defined.
    MissingMarkClass { context: String, class: u16 },
    /// A lookup names a mark filtering set that was never defined.
    MissingMarkFilterSet { context: String, set: u16 },
    /// A value uses deltas, but no variation model was supplied.
    MissingVariationModel { context: String },
    /// Master locations that cannot form a variation model, or a value
    /// that refers to a location the model does not have.
    InvalidVariationModel(String),
    /// The driver methods were called out of order.
    InvalidState(String),
}

impl Error {
    pub(crate) fn overflow(context: impl Into<String>, overflow: Overflow) -> Self {
        Error::Overflow {
            context: context.into(),
            overflow,
        }
    }

    /// The severity of this error. Always [`Severity::Fatal`].
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Note => f.write_str("note"),
            Severity::Warning => f.write_str("warning"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.context, self.message)
    }
}

impl Display for Overflow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} overflow ({} exceeds {})",
            self.what, self.value, self.limit
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ConflictingRule {
                context,
                message,
                first,
                second,
            } => write!(
                f,
                "{context}: {message} (first at {first}, conflicting rule at {second})"
            ),
            Error::AnchorConflict {
                context,
                glyph,
                slot,
                first,
                second,
            } => write!(
                f,
                "{context}: glyph {glyph} has conflicting anchors for {slot} \
                 (defined at {first} and again at {second})"
            ),
            Error::InvalidRule {
                context,
                location,
                message,
            } => write!(f, "{context}: {message} at {location}"),
            Error::Overflow { context, overflow } => write!(f, "{context}: {overflow}"),
            Error::NotConverged { table, iterations } => write!(
                f,
                "'{table}' offsets did not converge after {iterations} iterations"
            ),
            Error::LookupKindMismatch {
                label,
                first,
                second,
            } => write!(f, "{label} is used as {first} and as {second}"),
            Error::UnknownLabel { context, label } => {
                write!(f, "{context}: reference to undefined {label}")
            }
            Error::MarkClassConflict {
                context,
                glyph,
                first,
                second,
            } => write!(
                f,
                "{context}: glyph {glyph} is in mark attachment classes {first} and {second}"
            ),
            Error::MissingMarkClass { context, class } => {
                write!(f, "{context}: missing mark class {class}")
            }
            Error::MissingMarkFilterSet { context, set } => {
                write!(f, "{context}: missing mark filtering set {set}")
            }
            Error::MissingVariationModel { context } => {
                write!(f, "{context}: variable value without a variation model")
            }
            Error::InvalidVariationModel(msg) => write!(f, "invalid variation model: {msg}"),
            Error::InvalidState(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

/// Collects notes and warnings as they are produced.
#[derive(Clone, Debug, Default)]
pub(crate) struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub(crate) fn note(&mut self, context: &str, message: impl Into<String>) {
        let message = message.into();
        log::info!("{context}: {message}");
        self.items.push(Diagnostic {
            severity: Severity::Note,
            context: context.to_owned(),
            message,
        });
    }

    pub(crate) fn warning(&mut self, context: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{context}: {message}");
        self.items.push(Diagnostic {
            severity: Severity::Warning,
            context: context.to_owned(),
            message,
        });
    }

    pub(crate) fn into_inner(self) -> Vec<Diagnostic> {
        self.items
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}
