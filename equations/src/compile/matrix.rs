//! Normalisation of surface clauses into a pattern matrix.
//!
//! Names in patterns are resolved to constructors or pattern variables, list
//! literals are desugared, and the shape of every clause is checked before
//! any splitting happens.

use fxhash::FxHashMap;

use crate::compile::CompileError;
use crate::core::signature::Signature;
use crate::source::ByteRange;
use crate::surface::{self, Definition};
use crate::symbol::Symbol;

/// Patterns with names resolved.
#[derive(Debug, Clone)]
pub enum Pattern {
    Wildcard(ByteRange),
    Var(ByteRange, Symbol),
    /// Constructor patterns. The parameters of the inductive family are
    /// omitted.
    Ctor(ByteRange, Symbol, Vec<Pattern>),
    /// A term that is forced by the other patterns.
    Inaccessible(ByteRange, surface::Term),
}

impl Pattern {
    pub fn range(&self) -> ByteRange {
        match self {
            Pattern::Wildcard(range)
            | Pattern::Var(range, _)
            | Pattern::Ctor(range, _, _)
            | Pattern::Inaccessible(range, _) => *range,
        }
    }

    fn bindings(&self, bindings: &mut Vec<(ByteRange, Symbol)>) {
        match self {
            Pattern::Var(range, name) => bindings.push((*range, *name)),
            Pattern::Ctor(_, _, patterns) => patterns.iter().for_each(|p| p.bindings(bindings)),
            Pattern::Wildcard(_) | Pattern::Inaccessible(_, _) => {}
        }
    }
}

/// A row of the pattern matrix.
#[derive(Debug, Clone)]
pub struct Clause {
    pub range: ByteRange,
    pub patterns: Vec<Pattern>,
    pub rhs: Rhs,
    pub wheres: Vec<Definition>,
}

#[derive(Debug, Clone)]
pub enum Rhs {
    Term(surface::Term),
    With {
        scrut: surface::Term,
        equation: Option<(ByteRange, Symbol)>,
        /// The nested clauses, each with a single pattern for the inspected
        /// value.
        clauses: Vec<Clause>,
    },
    Absurd(ByteRange),
}

impl Clause {
    /// Add patterns for parameters that are not matched by the user, as in
    /// the context an auxiliary is lifted over.
    pub fn pad(mut self, before: usize, after: usize) -> Clause {
        let range = self.range;
        let patterns = std::iter::repeat_with(|| Pattern::Wildcard(range)).take(before);
        let patterns = patterns
            .chain(std::mem::take(&mut self.patterns))
            .chain(std::iter::repeat_with(|| Pattern::Wildcard(range)).take(after));
        self.patterns = patterns.collect();
        self
    }
}

/// Normalise the clauses of a function that takes `arity` arguments.
pub fn normalise(
    signature: &Signature,
    arity: usize,
    clauses: &[surface::Clause],
) -> Result<Vec<Clause>, CompileError> {
    let context = MatrixContext { signature };
    (clauses.iter())
        .map(|clause| context.clause(clause, arity, &[]))
        .collect()
}

/// The names of every `where` auxiliary that appears in the clauses,
/// including in nested `with` clauses and in the clauses of the auxiliaries
/// themselves.
pub fn where_names(clauses: &[surface::Clause]) -> Result<Vec<Symbol>, CompileError> {
    fn go(
        clauses: &[surface::Clause],
        seen: &mut FxHashMap<Symbol, ByteRange>,
        names: &mut Vec<Symbol>,
    ) -> Result<(), CompileError> {
        for clause in clauses {
            for definition in &clause.where_block {
                let (range, name) = definition.name;
                if let Some(previous) = seen.insert(name, range) {
                    return Err(CompileError::DuplicateBinding {
                        range,
                        previous,
                        name,
                    });
                }
                names.push(name);
                go(&definition.clauses, seen, names)?;
            }
            if let surface::Rhs::With { clauses, .. } = &clause.rhs {
                go(clauses, seen, names)?;
            }
        }
        Ok(())
    }

    let mut names = Vec::new();
    go(clauses, &mut FxHashMap::default(), &mut names)?;
    Ok(names)
}

struct MatrixContext<'a> {
    signature: &'a Signature,
}

impl<'a> MatrixContext<'a> {
    fn clause(
        &self,
        clause: &surface::Clause,
        arity: usize,
        inherited: &[(ByteRange, Symbol)],
    ) -> Result<Clause, CompileError> {
        if clause.patterns.len() != arity {
            return Err(CompileError::ArityMismatch {
                range: clause.range,
                expected: arity,
                found: clause.patterns.len(),
            });
        }

        let patterns = (clause.patterns.iter())
            .map(|pattern| self.pattern(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let mut bindings = inherited.to_vec();
        for pattern in &patterns {
            let initial_len = bindings.len();
            pattern.bindings(&mut bindings);
            for index in initial_len..bindings.len() {
                let (range, name) = bindings[index];
                let previous = bindings[..index].iter().find(|(_, other)| *other == name);
                if let Some((previous, _)) = previous {
                    return Err(CompileError::DuplicateBinding {
                        range,
                        previous: *previous,
                        name,
                    });
                }
            }
        }

        let rhs = match &clause.rhs {
            surface::Rhs::Term(term) => Rhs::Term(term.clone()),
            surface::Rhs::Absurd(range) => Rhs::Absurd(*range),
            surface::Rhs::With {
                scrut,
                equation,
                clauses,
            } => {
                bindings.extend(equation.iter().copied());
                let clauses = (clauses.iter())
                    .map(|clause| self.clause(clause, 1, &bindings))
                    .collect::<Result<_, _>>()?;
                Rhs::With {
                    scrut: scrut.clone(),
                    equation: *equation,
                    clauses,
                }
            }
        };

        Ok(Clause {
            range: clause.range,
            patterns,
            rhs,
            wheres: clause.where_block.clone(),
        })
    }

    fn pattern(&self, pattern: &surface::Pattern) -> Result<Pattern, CompileError> {
        match pattern {
            surface::Pattern::Name(range, name) => match self.signature.constructor(*name) {
                Some(ctor) if ctor.num_fields == 0 => Ok(Pattern::Ctor(*range, *name, Vec::new())),
                Some(ctor) => Err(CompileError::ArityMismatch {
                    range: *range,
                    expected: ctor.num_fields,
                    found: 0,
                }),
                None => Ok(Pattern::Var(*range, *name)),
            },
            surface::Pattern::Placeholder(range) => Ok(Pattern::Wildcard(*range)),
            surface::Pattern::Ctor(range, (name_range, name), patterns) => {
                let ctor = match self.signature.constructor(*name) {
                    Some(ctor) => ctor,
                    None if self.signature.contains(*name) => {
                        return Err(CompileError::NotAConstructor {
                            range: *name_range,
                            name: *name,
                        })
                    }
                    None => {
                        return Err(CompileError::UnboundName {
                            range: *name_range,
                            name: *name,
                            suggestion: self.suggest_constructor(*name),
                        })
                    }
                };
                if ctor.num_fields != patterns.len() {
                    return Err(CompileError::ArityMismatch {
                        range: *range,
                        expected: ctor.num_fields,
                        found: patterns.len(),
                    });
                }
                let patterns = (patterns.iter())
                    .map(|pattern| self.pattern(pattern))
                    .collect::<Result<_, _>>()?;
                Ok(Pattern::Ctor(*range, *name, patterns))
            }
            surface::Pattern::Inaccessible(range, term) => {
                Ok(Pattern::Inaccessible(*range, term.clone()))
            }
            surface::Pattern::List(range, elems) => {
                let (nil, cons) = (self.signature.list_notation())
                    .ok_or(CompileError::MissingListNotation { range: *range })?;
                let elems = (elems.iter())
                    .map(|elem| self.pattern(elem))
                    .collect::<Result<Vec<_>, _>>()?;
                let nil = Pattern::Ctor(*range, nil, Vec::new());
                Ok((elems.into_iter().rev()).fold(nil, |tail, head| {
                    let range = head.range().merge(tail.range());
                    Pattern::Ctor(range, cons, vec![head, tail])
                }))
            }
        }
    }

    fn suggest_constructor(&self, name: Symbol) -> Option<Symbol> {
        let name = name.resolve();
        (self.signature.names())
            .filter(|candidate| self.signature.constructor(*candidate).is_some())
            .map(|candidate| (levenshtein::levenshtein(name, candidate.resolve()), candidate))
            .filter(|(distance, _)| *distance <= usize::max(2, name.len() / 3))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;
    use crate::surface::{Item, Module};

    fn parse_definition(source: &str) -> (Signature, Definition) {
        let file_id = FileId::try_from(1).unwrap();
        let prelude = "
            inductive Nat : Type { zero : Nat, succ : Nat -> Nat }
            inductive List (A : Type) : Type { nil : List A, cons : A -> List A -> List A }
            notation list nil cons;
        ";
        let (module, messages) = Module::parse(file_id, &format!("{prelude}{source}"));
        assert!(messages.is_empty(), "{messages:?}");
        let elaboration = crate::surface::elaboration::elaborate_module(
            &crate::rewrite::RewriteDatabase::new(),
            &Module {
                items: module.items[..3].to_vec(),
            },
            &Default::default(),
        );
        let Some(Item::Definition(definition)) = module.items.last().cloned() else {
            panic!("expected a definition")
        };
        (elaboration.signature, definition)
    }

    #[test]
    fn constructors_and_variables() {
        let (signature, definition) = parse_definition("def f (n : Nat) : Nat { | succ zero => n | n => n }");
        let clauses = normalise(&signature, 1, &definition.clauses).unwrap();
        assert!(matches!(
            &clauses[0].patterns[0],
            Pattern::Ctor(_, _, patterns) if matches!(patterns[..], [Pattern::Ctor(..)])
        ));
        assert!(matches!(clauses[1].patterns[0], Pattern::Var(..)));
    }

    #[test]
    fn list_patterns_are_desugared() {
        let (signature, definition) = parse_definition("def f (A : Type) (l : List A) : Nat { | A, [a] => zero }");
        let clauses = normalise(&signature, 2, &definition.clauses).unwrap();
        match &clauses[0].patterns[1] {
            Pattern::Ctor(_, cons, patterns) => {
                assert_eq!(*cons, Symbol::intern("cons"));
                assert!(matches!(&patterns[1], Pattern::Ctor(_, nil, _) if *nil == Symbol::intern("nil")));
            }
            pattern => panic!("unexpected pattern: {pattern:?}"),
        }
    }

    #[test]
    fn arity_mismatch() {
        let (signature, definition) = parse_definition("def f (n : Nat) : Nat { | n, m => n }");
        let error = normalise(&signature, 1, &definition.clauses).unwrap_err();
        assert!(matches!(error, CompileError::ArityMismatch { expected: 1, found: 2, .. }));

        let (signature, definition) = parse_definition("def f (n : Nat) : Nat { | succ => n }");
        let error = normalise(&signature, 1, &definition.clauses).unwrap_err();
        assert!(matches!(error, CompileError::ArityMismatch { expected: 1, found: 0, .. }));
    }

    #[test]
    fn duplicate_bindings() {
        let (signature, definition) = parse_definition("def f (n m : Nat) : Nat { | n, n => n }");
        let error = normalise(&signature, 2, &definition.clauses).unwrap_err();
        assert!(matches!(error, CompileError::DuplicateBinding { .. }));

        // Names from the enclosing clause are inherited by `with` clauses
        let (signature, definition) =
            parse_definition("def f (n : Nat) : Nat { | n with n { | n => n } }");
        let error = normalise(&signature, 1, &definition.clauses).unwrap_err();
        assert!(matches!(error, CompileError::DuplicateBinding { .. }));
    }

    #[test]
    fn duplicate_where_names() {
        let (_, definition) = parse_definition(
            "
            def f (n : Nat) : Nat {
              | zero => g where g : Nat { | => zero }
              | succ n => g where g : Nat { | => zero }
            }
            ",
        );
        assert!(matches!(
            where_names(&definition.clauses),
            Err(CompileError::DuplicateBinding { .. })
        ));
    }

    #[test]
    fn unknown_constructors() {
        let (signature, definition) = parse_definition("def f (n : Nat) : Nat { | suc n => n }");
        match normalise(&signature, 1, &definition.clauses) {
            Err(CompileError::UnboundName { suggestion, .. }) => {
                assert_eq!(suggestion, Some(Symbol::intern("succ")));
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }
}
