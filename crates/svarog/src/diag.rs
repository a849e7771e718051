//! The diagnostics sink.
//!
//! Elaboration is never aborted by user-input problems: every component
//! reports through [`Diagnostics`] and substitutes a placeholder (empty
//! array, uninstantiated definition, invalid constant) so siblings keep
//! elaborating. Only internal invariant violations panic.

use strum::{Display, IntoStaticStr};

use ahash::AHashSet;

use crate::source::{SourceMap, SourceRange};

/// Every kind of diagnostic the elaboration core can emit.
///
/// Uses strum derives so the code renders as its variant name in driver
/// output and tests can match on the static string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, serde::Serialize)]
pub enum DiagCode {
    // --- Parse ---
    /// Parser-level failure in a source file.
    SyntaxError,

    // --- Lookup failures ---
    /// An instantiated cell name matched no definition in the search order.
    UnknownModule,
    /// A qualified name referenced a library that was never registered.
    UnknownLibrary,
    /// A package referenced in an import does not exist.
    UnknownPackage,
    /// An imported or exported name does not exist in the named package.
    UnknownPackageMember,
    /// Two definitions with the same name were added to one library.
    DuplicateDefinition,

    // --- Configuration errors ---
    /// A `design` entry in a config does not resolve to a definition.
    InvalidTopCell,
    /// A config used as a redirect target has more than one top cell.
    AmbiguousConfigRedirect,
    /// Two rules for the same instance path populate the same slot.
    ConflictingConfigRule,
    /// An `instance` override path never matched a hierarchical position.
    InvalidInstancePath,
    /// An `instance` override descends through a non-module parent.
    InvalidInstanceForParent,
    /// A `use`-rule target expected a config but found a module-like cell.
    NotAConfig,

    // --- Containment violations ---
    /// A definition kind is instantiated under a parent that may not hold it.
    ContainmentViolation,
    /// A bind directive appears inside a body that itself came from a bind.
    BindUnderBind,
    /// A bind directive targets a primitive.
    BindTargetPrimitive,
    /// A checker is instantiated inside a fork-join block.
    CheckerInForkJoin,
    /// A checker is instantiated inside another checker's procedural code.
    CheckerInCheckerProc,
    /// `always` (unclocked) procedure inside a checker body.
    AlwaysInChecker,
    /// Blocking assignment inside a checker's `always_ff` procedure.
    BlockingInAlwaysFf,

    // --- Port connection ---
    /// A gate instance has the wrong number of terminals for its type.
    PrimitivePortCountWrong,
    /// Ordered and named connections mixed in one instantiation.
    MixedOrderedNamedPorts,
    /// More ordered connections than ports.
    TooManyPortConnections,
    /// A named connection references a port the definition does not have.
    UnknownNamedPort,
    /// The same port is connected twice.
    DuplicatePortConnection,
    /// An interface port is connected to something that is not a matching
    /// interface instance, array, or modport.
    IfacePortTypeMismatch,
    /// An interface port was left unconnected and no default could be made.
    IfacePortUnconnected,

    // --- Parameters ---
    /// Ordered and named parameter assignments mixed in one instantiation.
    MixedOrderedNamedParams,
    /// More ordered parameter values than port parameters.
    TooManyOrderedParams,
    /// A named parameter assignment references an unknown parameter.
    UnknownNamedParam,
    /// An override (assignment, defparam, or config) targets a localparam.
    LocalParamOverride,
    /// A body or local parameter is declared with no initializer.
    MissingParamInitializer,
    /// A defparam path does not resolve to a parameter.
    UnknownDefparamTarget,

    // --- Resource caps ---
    /// An instance array dimension is wider than `max_instance_array`.
    MaxInstanceArrayExceeded,
    /// The instance hierarchy is deeper than `max_hierarchy_depth`.
    MaxInstanceDepthExceeded,
    /// Recursive checker instantiation exceeded `max_checker_instance_depth`.
    MaxCheckerDepthExceeded,
}

/// How severe a diagnostic is; errors drive the driver's exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, serde::Serialize)]
pub enum Severity {
    Warning,
    Error,
}

impl DiagCode {
    /// Default severity for this code.
    ///
    /// `InvalidInstancePath` is the one warning-level code: a dangling
    /// override rule cannot corrupt the elaborated tree.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::InvalidInstancePath => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A single reported problem.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub severity: Severity,
    pub range: SourceRange,
    pub message: String,
}

/// Append-only collector for diagnostics.
///
/// Lookup failures are reported once at the first offending site: the
/// `(code, range)` pair is deduplicated so a placeholder that gets revisited
/// does not cascade into repeated reports.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diags: Vec<Diagnostic>,
    seen: AHashSet<(DiagCode, SourceRange)>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `code` at `range` with a rendered message.
    ///
    /// Returns `true` if the diagnostic was recorded, `false` if an identical
    /// `(code, range)` pair was already present.
    pub fn report(&mut self, code: DiagCode, range: SourceRange, message: impl Into<String>) -> bool {
        if !self.seen.insert((code, range)) {
            return false;
        }
        let severity = code.severity();
        if severity == Severity::Error {
            self.errors += 1;
        }
        self.diags.push(Diagnostic {
            code,
            severity,
            range,
            message: message.into(),
        });
        true
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors
    }

    #[must_use]
    pub fn all(&self) -> &[Diagnostic] {
        &self.diags
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    /// True if any diagnostic with `code` has been reported.
    #[must_use]
    pub fn contains(&self, code: DiagCode) -> bool {
        self.diags.iter().any(|d| d.code == code)
    }

    /// Renders all diagnostics as `file:line:col severity[Code]: message` lines.
    #[must_use]
    pub fn render(&self, sources: &SourceMap) -> String {
        let mut out = String::new();
        for diag in &self.diags {
            let loc = sources.locate(diag.range);
            let code: &'static str = diag.code.into();
            out.push_str(&format!("{loc} {}[{code}]: {}\n", diag.severity, diag.message));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_by_code_and_range() {
        let mut diags = Diagnostics::new();
        let range = SourceRange::new(4, 9);
        assert!(diags.report(DiagCode::UnknownModule, range, "unknown module 'm'"));
        assert!(!diags.report(DiagCode::UnknownModule, range, "unknown module 'm'"));
        assert!(diags.report(DiagCode::UnknownModule, SourceRange::new(20, 25), "unknown module 'n'"));
        assert_eq!(diags.error_count(), 2);
    }

    #[test]
    fn warning_does_not_set_exit_state() {
        let mut diags = Diagnostics::new();
        diags.report(DiagCode::InvalidInstancePath, SourceRange::default(), "dangling path");
        assert!(!diags.has_errors());
        assert!(diags.contains(DiagCode::InvalidInstancePath));
    }
}
