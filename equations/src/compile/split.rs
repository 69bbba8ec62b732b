//! The splitting engine.
//!
//! Splitting works on a problem: a context of pattern variables, the goal
//! type, the arguments of the function expressed in that context, and the
//! clauses that may still apply. The first clause that does not fail to
//! match decides what happens next. If it matches, the problem becomes a
//! leaf. If it is blocked on a variable, that variable is split on each of
//! its possible constructors, and the clauses are matched again in every
//! refined context.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::compile::matrix::{Clause, Pattern};
use crate::compile::{CompileError, Compiler};
use crate::core::semantics::Env;
use crate::core::typing::{Candidate, Refinement, TypeError};
use crate::core::{ArcTerm, Telescope, Term};
use crate::source::ByteRange;
use crate::surface;
use crate::symbol::{Symbol, Var};

/// The result of splitting.
#[derive(Debug, Clone)]
pub enum SplitTree {
    /// A case split on a variable of the context.
    Split {
        context: Telescope,
        var: Var,
        /// One branch per possible constructor, in declaration order.
        branches: Vec<SplitBranch>,
    },
    /// A clause that matched.
    Leaf(Leaf),
    /// A variable of the context that has no possible constructors.
    Absurd {
        context: Telescope,
        var: Var,
        args: Vec<ArcTerm>,
        goal: ArcTerm,
    },
}

#[derive(Debug, Clone)]
pub struct SplitBranch {
    pub ctor: Symbol,
    pub fields: Vec<Var>,
    pub tree: SplitTree,
}

#[derive(Debug, Clone)]
pub struct Leaf {
    /// The index of the clause that matched.
    pub clause: usize,
    pub context: Telescope,
    /// The arguments of the function, as matched by the clause.
    pub args: Vec<ArcTerm>,
    pub goal: ArcTerm,
    pub body: LeafBody,
}

#[derive(Debug, Clone)]
pub enum LeafBody {
    Term(ArcTerm),
    /// The clause continues by inspecting another value.
    With(Box<WithNode>),
}

impl LeafBody {
    /// The right-hand side of the leaf, as it appears in the case tree.
    pub fn term(&self) -> &ArcTerm {
        match self {
            LeafBody::Term(term) => term,
            LeafBody::With(node) => &node.call,
        }
    }
}

/// A `with` clause, compiled to a call to an auxiliary function.
#[derive(Debug, Clone)]
pub struct WithNode {
    pub function: Symbol,
    /// The inspected value.
    pub scrut: ArcTerm,
    pub scrut_type: ArcTerm,
    /// The parameter of the auxiliary that stands for the inspected value.
    pub scrut_var: Var,
    /// The parameter of the auxiliary that remembers where the inspected
    /// value came from.
    pub equation_var: Var,
    /// The call to the auxiliary that replaces the clause.
    pub call: ArcTerm,
    /// The splitting tree of the auxiliary.
    pub tree: Box<SplitTree>,
}

impl SplitTree {
    /// The number of leaves and absurd nodes, including those of `with`
    /// auxiliaries.
    pub fn num_cases(&self) -> usize {
        match self {
            SplitTree::Split { branches, .. } => branches.iter().map(|b| b.tree.num_cases()).sum(),
            SplitTree::Leaf(Leaf {
                body: LeafBody::With(node),
                ..
            }) => node.tree.num_cases(),
            SplitTree::Leaf(_) | SplitTree::Absurd { .. } => 1,
        }
    }
}

/// The function whose clauses are being split.
pub(super) struct Definition<'p> {
    pub name: Symbol,
    pub range: ByteRange,
    pub clauses: &'p [Clause],
}

pub(super) struct Problem {
    pub context: Telescope,
    pub goal: ArcTerm,
    pub args: Vec<ArcTerm>,
    /// Names bound by enclosing clauses.
    pub env: Vec<(Symbol, ArcTerm)>,
    /// The clauses that may still match, in order.
    pub rows: Vec<usize>,
}

impl Problem {
    fn refine(&self, refinement: &Refinement, rows: Vec<usize>) -> Problem {
        let subst = &refinement.subst;
        Problem {
            context: refinement.context.clone(),
            goal: subst.apply(&self.goal),
            args: subst.apply_all(&self.args),
            env: (self.env.iter())
                .map(|(name, term)| (*name, subst.apply(term)))
                .collect(),
            rows,
        }
    }
}

/// The bindings made by a clause that matched.
pub(super) struct Matched {
    pub env: Vec<(Symbol, ArcTerm)>,
    /// Inaccessible patterns, with the values they must be convertible with.
    pub inaccessible: Vec<(ByteRange, surface::Term, ArcTerm)>,
}

enum Match {
    Yes(Matched),
    No,
    /// Matching is blocked on a variable. The pattern is the one that was
    /// matched against it.
    Stuck(Var, Pattern),
}

impl<'a> Compiler<'a> {
    pub(super) fn split(
        &mut self,
        definition: &Definition<'_>,
        problem: Problem,
        used: &mut [bool],
    ) -> Result<SplitTree, CompileError> {
        for (index, row) in problem.rows.iter().enumerate() {
            match self.match_row(&problem, &definition.clauses[*row])? {
                Match::No => continue,
                Match::Yes(matched) => {
                    trace!("clause {} of {} matched", row, definition.name);
                    used[*row] = true;
                    let row = *row;
                    return self.leaf(definition, problem, row, matched);
                }
                Match::Stuck(var, pattern) => {
                    let rows = problem.rows[index..].to_vec();
                    return self.split_on(definition, problem, rows, var, &pattern, used);
                }
            }
        }

        match self.checker().find_empty(&problem.context) {
            Some(var) => Ok(SplitTree::Absurd {
                context: problem.context,
                var,
                args: problem.args,
                goal: problem.goal,
            }),
            None => Err(CompileError::NonExhaustiveMatch {
                range: definition.range,
                function: definition.name,
                context: problem.context,
                missing: problem.args,
            }),
        }
    }

    fn split_on(
        &mut self,
        definition: &Definition<'_>,
        problem: Problem,
        rows: Vec<usize>,
        var: Var,
        pattern: &Pattern,
        used: &mut [bool],
    ) -> Result<SplitTree, CompileError> {
        debug!("splitting {} on `{}`", definition.name, var.name());

        let refinements = {
            let checker = self.checker();
            let type_error = |error| CompileError::TypeError {
                range: pattern.range(),
                error,
            };
            let candidates = checker.constructors(&problem.context, var).map_err(type_error)?;

            let mut refinements = Vec::new();
            for candidate in candidates {
                let refinement = match candidate {
                    Candidate::Possible(refinement) => refinement,
                    Candidate::Impossible { ctor } => {
                        trace!("`{}` is impossible for `{}`", ctor, var.name());
                        continue;
                    }
                };
                // Name the fields after the pattern variables of the clause
                let refinement = match pattern {
                    Pattern::Ctor(_, ctor, patterns) if *ctor == refinement.ctor => {
                        let fields: Vec<_> = Iterator::zip(refinement.fields.iter(), patterns)
                            .map(|(field, pattern)| match pattern {
                                Pattern::Var(_, name) => Var::fresh(*name),
                                _ => *field,
                            })
                            .collect();
                        match checker.refine(&problem.context, var, *ctor, Some(&fields[..])) {
                            Ok(Candidate::Possible(refinement)) => refinement,
                            Ok(Candidate::Impossible { .. }) => refinement,
                            Err(error) => return Err(type_error(error)),
                        }
                    }
                    _ => refinement,
                };
                refinements.push(refinement);
            }
            refinements
        };

        if refinements.is_empty() {
            return Ok(SplitTree::Absurd {
                context: problem.context,
                var,
                args: problem.args,
                goal: problem.goal,
            });
        }

        let mut branches = Vec::with_capacity(refinements.len());
        for refinement in refinements {
            let subproblem = problem.refine(&refinement, rows.clone());
            let tree = self.split(definition, subproblem, used)?;
            branches.push(SplitBranch {
                ctor: refinement.ctor,
                fields: refinement.fields,
                tree,
            });
        }

        Ok(SplitTree::Split {
            context: problem.context,
            var,
            branches,
        })
    }

    fn match_row(&self, problem: &Problem, clause: &Clause) -> Result<Match, CompileError> {
        let env = Env::new(&self.signature);
        let mut matched = Matched {
            env: problem.env.clone(),
            inaccessible: Vec::new(),
        };
        let mut stuck = None;
        let mut error = None;

        let mut queue: VecDeque<_> = Iterator::zip(clause.patterns.iter(), problem.args.iter().cloned()).collect();
        while let Some((pattern, term)) = queue.pop_front() {
            match pattern {
                Pattern::Wildcard(_) => {}
                Pattern::Var(_, name) => matched.env.push((*name, term)),
                Pattern::Inaccessible(range, surface_term) => {
                    matched.inaccessible.push((*range, surface_term.clone(), term));
                }
                Pattern::Ctor(range, ctor, patterns) => {
                    let value = env.whnf(&term);
                    if let Some(var) = value.as_var() {
                        stuck.get_or_insert_with(|| (var, pattern.clone()));
                        continue;
                    }
                    match Term::global_spine(&value) {
                        Some((head, args)) if head == *ctor => {
                            let num_params = (self.signature.constructor(head)).map_or(0, |ctor| ctor.num_params);
                            let fields = args.into_iter().skip(num_params);
                            for constraint in Iterator::zip(patterns.iter(), fields).rev() {
                                queue.push_front(constraint);
                            }
                        }
                        Some((head, _)) if self.signature.constructor(head).is_some() => {
                            return Ok(Match::No);
                        }
                        _ => {
                            error.get_or_insert_with(|| CompileError::TypeError {
                                range: *range,
                                error: TypeError::CaseOnNonVariable { scrut: value },
                            });
                        }
                    }
                }
            }
        }

        match (stuck, error) {
            (Some((var, pattern)), _) => Ok(Match::Stuck(var, pattern)),
            (None, Some(error)) => Err(error),
            (None, None) => Ok(Match::Yes(matched)),
        }
    }
}
