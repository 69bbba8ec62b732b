use codespan_reporting::diagnostic::{Diagnostic, Label};
use itertools::Itertools;

use crate::core::typing::TypeError;
use crate::core::{pretty, ArcTerm, Telescope, Term};
use crate::source::{ByteRange, FileId};
use crate::surface::elaboration::ScopeError;
use crate::symbol::Symbol;
use crate::bug_report_note;

/// Errors encountered while compiling a definition.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// A clause has the wrong number of patterns, or a constructor pattern
    /// the wrong number of sub-patterns.
    ArityMismatch {
        range: ByteRange,
        expected: usize,
        found: usize,
    },
    /// A name is bound twice in the same clause, or two `where` auxiliaries
    /// of the same function share a name.
    DuplicateBinding {
        range: ByteRange,
        previous: ByteRange,
        name: Symbol,
    },
    /// Some combination of arguments is not covered by any clause.
    NonExhaustiveMatch {
        range: ByteRange,
        function: Symbol,
        context: Telescope,
        /// The arguments that are not covered, in terms of `context`.
        missing: Vec<ArcTerm>,
    },
    /// A clause is never used.
    RedundantClause { range: ByteRange },
    /// An auxiliary was referred to outside of the clause that defines it.
    UnboundAuxiliary { range: ByteRange, name: Symbol },
    UnboundName {
        range: ByteRange,
        name: Symbol,
        suggestion: Option<Symbol>,
    },
    /// A name was applied to sub-patterns, but is not a constructor.
    NotAConstructor { range: ByteRange, name: Symbol },
    /// A list pattern was used without a `notation list` declaration.
    MissingListNotation { range: ByteRange },
    /// An inaccessible pattern does not match the value forced by the other
    /// patterns.
    InaccessibleMismatch {
        range: ByteRange,
        context: Telescope,
        expected: ArcTerm,
        found: ArcTerm,
    },
    /// A user-written term is ill-typed.
    TypeError { range: ByteRange, error: TypeError },
    /// A term produced by the compiler is ill-typed. This is a bug in the
    /// compiler rather than in the definition.
    IllTypedCompilation { function: Symbol, error: TypeError },
    /// The definition is already being compiled elsewhere.
    AlreadyCompiling { range: ByteRange, name: Symbol },
}

impl From<ScopeError> for CompileError {
    fn from(error: ScopeError) -> CompileError {
        match error {
            ScopeError::UnboundName {
                range,
                name,
                suggestion,
            } => CompileError::UnboundName {
                range,
                name,
                suggestion,
            },
            ScopeError::UnboundAuxiliary { range, name } => {
                CompileError::UnboundAuxiliary { range, name }
            }
        }
    }
}

impl CompileError {
    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        let primary_label = |range: &ByteRange| Label::primary(file_id, *range);
        let secondary_label = |range: &ByteRange| Label::secondary(file_id, *range);

        match self {
            CompileError::ArityMismatch {
                range,
                expected,
                found,
            } => Diagnostic::error()
                .with_message("mismatched number of patterns")
                .with_labels(vec![primary_label(range)
                    .with_message(format!("expected {expected} patterns, found {found}"))]),
            CompileError::DuplicateBinding {
                range,
                previous,
                name,
            } => Diagnostic::error()
                .with_message(format!("`{name}` is bound more than once"))
                .with_labels(vec![
                    primary_label(range).with_message("rebound here"),
                    secondary_label(previous).with_message("first bound here"),
                ]),
            CompileError::NonExhaustiveMatch {
                range,
                function,
                context,
                missing,
            } => {
                let pp = pretty::Context::new();
                pp.bind_telescope(context);
                let pattern = pp.render(&Term::fun_apps(Term::global(*function), missing.iter().cloned()));
                let mut notes = vec![format!("patterns not covered: `{pattern}`")];
                if !context.is_empty() {
                    notes.push(format!(
                        "in the context `{}`",
                        pp.render_telescope(context).iter().format(", "),
                    ));
                }
                Diagnostic::error()
                    .with_message(format!("non-exhaustive patterns in `{function}`"))
                    .with_labels(vec![primary_label(range).with_message("patterns not covered")])
                    .with_notes(notes)
            }
            CompileError::RedundantClause { range } => Diagnostic::error()
                .with_message("redundant clause")
                .with_labels(vec![primary_label(range).with_message("this clause is never used")]),
            CompileError::UnboundAuxiliary { range, name } => Diagnostic::error()
                .with_message(format!("auxiliary `{name}` is not in scope"))
                .with_labels(vec![primary_label(range).with_message("used outside of its clause")])
                .with_notes(vec![
                    "auxiliaries are only visible in the clause that defines them".to_owned(),
                ]),
            CompileError::UnboundName {
                range,
                name,
                suggestion,
            } => Diagnostic::error()
                .with_message(format!("cannot find `{name}` in scope"))
                .with_labels(vec![primary_label(range).with_message("unbound name")])
                .with_notes(match suggestion {
                    Some(suggestion) => vec![format!("help: did you mean `{suggestion}`?")],
                    None => Vec::new(),
                }),
            CompileError::NotAConstructor { range, name } => Diagnostic::error()
                .with_message(format!("`{name}` is not a constructor"))
                .with_labels(vec![primary_label(range).with_message("expected a constructor")]),
            CompileError::MissingListNotation { range } => Diagnostic::error()
                .with_message("list pattern without list notation")
                .with_labels(vec![primary_label(range)])
                .with_notes(vec!["declare one with `notation list nil cons;`".to_owned()]),
            CompileError::InaccessibleMismatch {
                range,
                context,
                expected,
                found,
            } => {
                let pp = pretty::Context::new();
                pp.bind_telescope(context);
                Diagnostic::error()
                    .with_message("inaccessible pattern does not match the forced value")
                    .with_labels(vec![primary_label(range)
                        .with_message(format!("expected `{}`", pp.render(expected)))])
                    .with_notes(vec![format!("found `{}`", pp.render(found))])
            }
            CompileError::TypeError { range, error } => Diagnostic::error()
                .with_message(error.to_string())
                .with_labels(vec![primary_label(range)]),
            CompileError::IllTypedCompilation { function, error } => Diagnostic::bug()
                .with_message(format!("compiled `{function}` to an ill-typed term"))
                .with_notes(vec![
                    error.to_string(),
                    bug_report_note(),
                ]),
            CompileError::AlreadyCompiling { range, name } => Diagnostic::error()
                .with_message(format!("`{name}` is already being compiled"))
                .with_labels(vec![primary_label(range)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ill_typed_compilations_are_bugs() {
        let error = CompileError::IllTypedCompilation {
            function: Symbol::intern("length"),
            error: TypeError::UnboundGlobal(Symbol::intern("missing")),
        };
        let diagnostic = error.to_diagnostic(FileId::try_from(1).unwrap());

        assert_eq!(diagnostic.severity, codespan_reporting::diagnostic::Severity::Bug);
        let note = diagnostic.notes.last().unwrap();
        assert!(note.starts_with("please file a bug report"));
        assert!(!note.contains(": /issues/new"), "{note}");
    }
}
