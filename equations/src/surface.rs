//! Surface language.

use codespan_reporting::diagnostic::Diagnostic;

use crate::source::{ByteRange, FileId};
use crate::symbol::Symbol;

mod lexer;
mod parser;

pub mod elaboration;

pub use self::parser::ParseMessage;

/// Surface terms.
#[derive(Debug, Clone)]
pub enum Term {
    /// Named terms, referring to locals, auxiliaries or globals.
    Name(ByteRange, Symbol),
    /// The type of types.
    Universe(ByteRange),
    /// Annotated terms.
    Ann(ByteRange, Box<Term>, Box<Term>),
    /// Arrow types.
    Arrow(ByteRange, Box<Term>, Box<Term>),
    /// Dependent function types.
    FunType(ByteRange, Vec<Param>, Box<Term>),
    /// Function literals.
    FunLiteral(ByteRange, Vec<Param>, Box<Term>),
    /// Function applications.
    FunElim(ByteRange, Box<Term>, Box<Term>),
}

impl Term {
    /// Get the source range of the term.
    pub fn range(&self) -> ByteRange {
        match self {
            Term::Name(range, _)
            | Term::Universe(range)
            | Term::Ann(range, _, _)
            | Term::Arrow(range, _, _)
            | Term::FunType(range, _, _)
            | Term::FunLiteral(range, _, _)
            | Term::FunElim(range, _, _) => *range,
        }
    }

    /// Parse a standalone term, such as a goal supplied on the command line.
    pub fn parse(file_id: FileId, source: &str) -> (Option<Term>, Vec<ParseMessage>) {
        parser::parse_term(file_id, source)
    }
}

/// A group of parameters sharing a type, as in `(x y : A)`.
#[derive(Debug, Clone)]
pub struct Param {
    pub names: Vec<(ByteRange, Symbol)>,
    pub r#type: Term,
}

/// Surface patterns.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Named patterns. These are resolved to either constructors or pattern
    /// variables once the signature is known.
    Name(ByteRange, Symbol),
    /// Placeholder patterns.
    Placeholder(ByteRange),
    /// Constructor applications, as in `cons a l`.
    Ctor(ByteRange, (ByteRange, Symbol), Vec<Pattern>),
    /// Inaccessible patterns, as in `.n` or `.(succ n)`.
    Inaccessible(ByteRange, Term),
    /// List literals, as in `[a, b]`.
    List(ByteRange, Vec<Pattern>),
}

impl Pattern {
    pub fn range(&self) -> ByteRange {
        match self {
            Pattern::Name(range, _)
            | Pattern::Placeholder(range)
            | Pattern::Ctor(range, _, _)
            | Pattern::Inaccessible(range, _)
            | Pattern::List(range, _) => *range,
        }
    }
}

/// One clause of a pattern-matching definition.
#[derive(Debug, Clone)]
pub struct Clause {
    pub range: ByteRange,
    pub patterns: Vec<Pattern>,
    pub rhs: Rhs,
    /// Auxiliary definitions visible in this clause.
    pub where_block: Vec<Definition>,
}

#[derive(Debug, Clone)]
pub enum Rhs {
    /// `=> term`
    Term(Term),
    /// `with term (in name)? { clauses }`
    With {
        scrut: Term,
        equation: Option<(ByteRange, Symbol)>,
        clauses: Vec<Clause>,
    },
    /// A clause with no right-hand side.
    Absurd(ByteRange),
}

/// Pattern-matching definitions.
#[derive(Debug, Clone)]
pub struct Definition {
    pub range: ByteRange,
    pub name: (ByteRange, Symbol),
    pub transparent: bool,
    pub params: Vec<Param>,
    pub r#type: Term,
    pub clauses: Vec<Clause>,
}

/// Inductive family declarations.
#[derive(Debug, Clone)]
pub struct Inductive {
    pub range: ByteRange,
    pub name: (ByteRange, Symbol),
    pub params: Vec<Param>,
    pub r#type: Term,
    pub ctors: Vec<((ByteRange, Symbol), Term)>,
}

/// Top-level items.
#[derive(Debug, Clone)]
pub enum Item {
    Inductive(Inductive),
    Definition(Definition),
    /// Postulated constants.
    Axiom {
        range: ByteRange,
        name: (ByteRange, Symbol),
        r#type: Term,
    },
    /// User-supplied rewrite rules, trusted without proof.
    Rewrite {
        range: ByteRange,
        name: (ByteRange, Symbol),
        r#type: Term,
    },
    /// `notation list nil cons;`
    ListNotation {
        range: ByteRange,
        nil: (ByteRange, Symbol),
        cons: (ByteRange, Symbol),
    },
}

impl Item {
    pub fn range(&self) -> ByteRange {
        match self {
            Item::Inductive(inductive) => inductive.range,
            Item::Definition(definition) => definition.range,
            Item::Axiom { range, .. }
            | Item::Rewrite { range, .. }
            | Item::ListNotation { range, .. } => *range,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub items: Vec<Item>,
}

impl Module {
    /// Parse a module, recovering at item boundaries after syntax errors.
    pub fn parse(file_id: FileId, source: &str) -> (Module, Vec<ParseMessage>) {
        parser::parse_module(file_id, source)
    }
}

impl ParseMessage {
    pub fn to_diagnostic(&self, file_id: FileId) -> Diagnostic<FileId> {
        parser::to_diagnostic(self, file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_definition_with_clauses() {
        let file_id = FileId::try_from(1).unwrap();
        let source = "
            inductive Nat : Type { zero : Nat, succ : Nat -> Nat }

            def double (n : Nat) : Nat {
              | zero => zero
              | succ n => succ (succ (double n))
            }
        ";
        let (module, messages) = Module::parse(file_id, source);
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(module.items.len(), 2);
        match &module.items[1] {
            Item::Definition(definition) => {
                assert_eq!(definition.name.1, Symbol::intern("double"));
                assert_eq!(definition.clauses.len(), 2);
                assert!(matches!(definition.clauses[1].patterns[0], Pattern::Ctor(..)));
            }
            _ => panic!("expected a definition"),
        }
    }

    #[test]
    fn parse_with_and_where() {
        let file_id = FileId::try_from(1).unwrap();
        let source = "
            def filter (A : Type) (p : A -> Bool) (l : List A) : List A {
              | A, p, nil => nil A
              | A, p, cons a l with p a in h {
                | true => cons A a (filter A p l)
                | false => go l
              }
              where go (l : List A) : List A {
                | l => filter A p l
              }
            }
        ";
        let (module, messages) = Module::parse(file_id, source);
        assert!(messages.is_empty(), "{messages:?}");
        let Item::Definition(definition) = &module.items[0] else {
            panic!("expected a definition")
        };
        let clause = &definition.clauses[1];
        assert!(matches!(&clause.rhs, Rhs::With { equation: Some(_), clauses, .. } if clauses.len() == 2));
        assert_eq!(clause.where_block.len(), 1);
    }

    #[test]
    fn parse_errors_are_recovered() {
        let file_id = FileId::try_from(1).unwrap();
        let source = "
            axiom A : ;
            axiom B : Type;
        ";
        let (module, messages) = Module::parse(file_id, source);
        assert_eq!(messages.len(), 1);
        assert_eq!(module.items.len(), 1);
    }
}
