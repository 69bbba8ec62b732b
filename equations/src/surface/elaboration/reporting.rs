use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

use crate::compile::CompileError;
use crate::core::typing::TypeError;
use crate::source::{ByteRange, FileId};
use crate::surface::elaboration::ScopeError;
use crate::symbol::Symbol;

/// Elaboration diagnostic messages.
#[derive(Debug, Clone)]
pub enum Message {
    /// The name was not previously bound in the current scope.
    UnboundName {
        range: ByteRange,
        name: Symbol,
        suggestion: Option<Symbol>,
    },
    DuplicateDefinition {
        range: ByteRange,
        name: Symbol,
        previous: Option<ByteRange>,
    },
    /// The type of an inductive family does not end in `Type`.
    InvalidInductiveType {
        range: ByteRange,
        name: Symbol,
    },
    /// The type of a constructor does not end in its family, applied to the
    /// family's parameters.
    InvalidConstructorType {
        range: ByteRange,
        ctor: Symbol,
        inductive: Symbol,
    },
    InvalidRewriteRule {
        range: ByteRange,
        name: Symbol,
    },
    InvalidListNotation {
        range: ByteRange,
    },
    TypeError {
        range: ByteRange,
        error: TypeError,
    },
    Compile(CompileError),
    CompileWarning(CompileError),
}

impl From<ScopeError> for Message {
    fn from(error: ScopeError) -> Message {
        match error {
            ScopeError::UnboundName {
                range,
                name,
                suggestion,
            } => Message::UnboundName {
                range,
                name,
                suggestion,
            },
            ScopeError::UnboundAuxiliary { range, name } => Message::UnboundName {
                range,
                name,
                suggestion: None,
            },
        }
    }
}

impl Message {
    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        let primary_label = |range: &ByteRange| Label::primary(file_id, *range);
        let secondary_label = |range: &ByteRange| Label::secondary(file_id, *range);

        match self {
            Message::UnboundName {
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
            Message::DuplicateDefinition {
                range,
                name,
                previous,
            } => Diagnostic::error()
                .with_message(format!("the name `{name}` is defined multiple times"))
                .with_labels(
                    std::iter::once(primary_label(range).with_message("redefined here"))
                        .chain(previous.iter().map(|previous| {
                            secondary_label(previous).with_message("previous definition here")
                        }))
                        .collect(),
                ),
            Message::InvalidInductiveType { range, name } => Diagnostic::error()
                .with_message(format!("invalid type for inductive family `{name}`"))
                .with_labels(vec![primary_label(range).with_message("expected a type ending in `Type`")]),
            Message::InvalidConstructorType {
                range,
                ctor,
                inductive,
            } => Diagnostic::error()
                .with_message(format!("invalid type for constructor `{ctor}`"))
                .with_labels(vec![primary_label(range)
                    .with_message(format!("expected a type ending in `{inductive}`"))])
                .with_notes(vec![format!(
                    "the parameters of `{inductive}` must be passed unchanged"
                )]),
            Message::InvalidRewriteRule { range, name } => Diagnostic::error()
                .with_message(format!("invalid rewrite rule `{name}`"))
                .with_labels(vec![primary_label(range)])
                .with_notes(vec![
                    "expected a type of the form `(xs : Δ) -> Eq A (f ps) rhs`, where `f` is a definition"
                        .to_owned(),
                ]),
            Message::InvalidListNotation { range } => Diagnostic::error()
                .with_message("invalid list notation")
                .with_labels(vec![primary_label(range)])
                .with_notes(vec![
                    "expected a constructor with no fields and a constructor with two fields of the same family"
                        .to_owned(),
                ]),
            Message::TypeError { range, error } => Diagnostic::error()
                .with_message(error.to_string())
                .with_labels(vec![primary_label(range)]),
            Message::Compile(error) => error.to_diagnostic(file_id),
            Message::CompileWarning(error) => Diagnostic {
                severity: Severity::Warning,
                ..error.to_diagnostic(file_id)
            },
        }
    }
}
