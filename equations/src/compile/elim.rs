//! Elimination principles derived from splitting trees.
//!
//! For a function `f : Π Δ₀. T`, the principle has the type
//!
//! ```text
//! f.elim : Π (P : Π Δ₀. Type). Π H₁ … Hₖ. Π Δ₀. P Δ₀
//! ```
//!
//! with one hypothesis per leaf or absurd node of the tree, including the
//! leaves of `with` auxiliaries. A hypothesis assumes the motive for every
//! full recursive call made by its right-hand side, and concludes it for the
//! patterns of its leaf:
//!
//! ```text
//! Hⱼ : Π Δⱼ. Π (IH : P rs)… . P qsⱼ
//! ```
//!
//! The proof follows the case tree of `f`, and is itself a recursive
//! function. It is type checked before it is returned.

use std::sync::Arc;

use log::debug;

use crate::compile::split::{LeafBody, SplitTree};
use crate::compile::CompileError;
use crate::core::semantics::{alpha_eq, Env, Subst};
use crate::core::signature::{Function, Signature};
use crate::core::typing::Checker;
use crate::core::{ArcTerm, Branch, Telescope, Term};
use crate::rewrite::Eliminator;
use crate::symbol::{Symbol, Var};

#[derive(Debug, Clone)]
pub struct Elimination {
    /// `f.elim`
    pub name: Symbol,
    pub r#type: ArcTerm,
    pub term: ArcTerm,
    /// The number of arguments of the function.
    pub arity: usize,
    pub hypotheses: Vec<Hypothesis>,
}

/// The shape of a hypothesis: `Π Δⱼ. Π (IH : P rs)… . P qsⱼ`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Hypothesis {
    /// Whether the hypothesis belongs to an absurd node, and so is never
    /// used by the proof.
    pub absurd: bool,
    /// The length of `Δⱼ`.
    pub num_params: usize,
    pub num_ihs: usize,
}

impl Elimination {
    pub fn eliminator(&self, function: Symbol) -> Eliminator {
        Eliminator {
            name: self.name,
            function,
            arity: self.arity,
            hypotheses: self.hypotheses.clone(),
        }
    }
}

/// Derive the elimination principle of `function`, whose arguments are
/// `context`, and add it to the signature.
pub fn synthesize(
    signature: &mut Signature,
    function: Symbol,
    context: &Telescope,
    tree: &SplitTree,
) -> Result<Elimination, CompileError> {
    let name = function.qualify("elim");
    let motive = Var::fresh(Symbol::intern("P"));
    let hypothesis_vars = (1..=tree.num_cases())
        .map(|index| Var::fresh(Symbol::intern(format!("H{index}"))))
        .collect();

    let mut builder = Builder {
        function,
        name,
        arity: context.len(),
        motive,
        hypothesis_vars,
        hypotheses: Vec::new(),
    };
    let proof = builder.proof(tree, &[]);

    let motive_params = freshen(context);
    let mut params = Telescope::new();
    params.push(motive, Term::fun_types(&motive_params, Term::universe()));
    for ((var, r#type), _) in &builder.hypotheses {
        params.push(*var, r#type.clone());
    }
    let conclusion = Term::fun_types(context, builder.motive_app(context.args()));
    let r#type = Term::fun_types(&params, conclusion);
    let term = Term::fun_lits(&params, Term::fun_lits(context, proof));

    debug!("checking {} with {} hypotheses", name, builder.hypotheses.len());
    signature.add_function(Function {
        name,
        r#type: r#type.clone(),
        body: None,
        transparent: false,
        elim: None,
    });
    (Checker::new(Env::new(signature)).check(&Telescope::new(), &term, &r#type))
        .map_err(|error| CompileError::IllTypedCompilation {
            function: name,
            error,
        })?;
    signature.add_function(Function {
        name,
        r#type: r#type.clone(),
        body: Some(term.clone()),
        transparent: false,
        elim: None,
    });

    Ok(Elimination {
        name,
        r#type,
        term,
        arity: context.len(),
        hypotheses: builder.hypotheses.into_iter().map(|(_, hypothesis)| hypothesis).collect(),
    })
}

/// A copy of a telescope with fresh variables.
fn freshen(telescope: &Telescope) -> Telescope {
    let mut subst = Subst::new();
    let mut fresh = Telescope::new();
    for (var, r#type) in telescope.iter() {
        let new_var = var.refresh();
        fresh.push(new_var, subst.apply(r#type));
        subst.insert(*var, Term::var(new_var));
    }
    fresh
}

/// The arguments of an enclosing leaf whose body is a `with` auxiliary.
struct WithScope {
    params: Vec<Var>,
    args: Vec<ArcTerm>,
}

struct Builder {
    function: Symbol,
    name: Symbol,
    arity: usize,
    motive: Var,
    hypothesis_vars: Vec<Var>,
    hypotheses: Vec<((Var, ArcTerm), Hypothesis)>,
}

impl Builder {
    fn motive_app(&self, args: Vec<ArcTerm>) -> ArcTerm {
        Term::fun_apps(Term::var(self.motive), args)
    }

    /// Express the arguments of an auxiliary leaf as arguments of the
    /// function, through the `with` leaves that enclose it.
    fn to_root(&self, args: &[ArcTerm], scopes: &[WithScope]) -> Vec<ArcTerm> {
        let mut args = args.to_vec();
        for scope in scopes.iter().rev() {
            let subst = Subst::from_pairs(Iterator::zip(scope.params.iter().copied(), args));
            args = subst.apply_all(&scope.args);
        }
        args
    }

    fn hypothesis(
        &mut self,
        context: &Telescope,
        args: &[ArcTerm],
        calls: &[Vec<ArcTerm>],
        absurd: bool,
        scopes: &[WithScope],
    ) -> Var {
        let var = self.hypothesis_vars[self.hypotheses.len()];
        let mut params = context.clone();
        for call in calls {
            params.push(Var::fresh(Symbol::intern("IH")), self.motive_app(call.clone()));
        }
        let conclusion = self.motive_app(self.to_root(args, scopes));
        let r#type = Term::fun_types(&params, conclusion);
        self.hypotheses.push((
            (var, r#type),
            Hypothesis {
                absurd,
                num_params: context.len(),
                num_ihs: calls.len(),
            },
        ));
        var
    }

    fn proof(&mut self, tree: &SplitTree, scopes: &[WithScope]) -> ArcTerm {
        match tree {
            SplitTree::Split { var, branches, .. } => Arc::new(Term::Case(
                Term::var(*var),
                (branches.iter())
                    .map(|branch| Branch {
                        ctor: branch.ctor,
                        fields: branch.fields.clone(),
                        body: self.proof(&branch.tree, scopes),
                    })
                    .collect(),
            )),
            SplitTree::Absurd {
                context, var, args, ..
            } => {
                self.hypothesis(context, args, &[], true, scopes);
                Arc::new(Term::Absurd(Term::var(*var)))
            }
            SplitTree::Leaf(leaf) => match &leaf.body {
                LeafBody::Term(body) => {
                    let mut calls = Vec::new();
                    recursive_calls(body, self.function, self.arity, &mut calls);
                    let hypothesis = self.hypothesis(&leaf.context, &leaf.args, &calls, false, scopes);

                    let elim = Term::fun_apps(
                        Term::global(self.name),
                        std::iter::once(Term::var(self.motive))
                            .chain(self.hypothesis_vars.iter().copied().map(Term::var)),
                    );
                    let ihs = (calls.into_iter()).map(|call| Term::fun_apps(elim.clone(), call));
                    Term::fun_apps(Term::var(hypothesis), leaf.context.args().into_iter().chain(ihs))
                }
                LeafBody::With(node) => {
                    let conclusion = self.motive_app(self.to_root(&leaf.args, scopes));

                    let mut inner_scopes = Vec::with_capacity(scopes.len() + 1);
                    inner_scopes.extend(scopes.iter().map(|scope| WithScope {
                        params: scope.params.clone(),
                        args: scope.args.clone(),
                    }));
                    inner_scopes.push(WithScope {
                        params: leaf.context.vars().collect(),
                        args: leaf.args.clone(),
                    });
                    let subproof = self.proof(&node.tree, &inner_scopes);

                    // (fun w h => subproof : Π w h. P qs) e (refl A e)
                    let equation_type = Term::eq(
                        node.scrut_type.clone(),
                        node.scrut.clone(),
                        Term::var(node.scrut_var),
                    );
                    let proof = Arc::new(Term::FunLit(
                        node.scrut_var,
                        node.scrut_type.clone(),
                        Arc::new(Term::FunLit(node.equation_var, equation_type.clone(), subproof)),
                    ));
                    let r#type = Arc::new(Term::FunType(
                        node.scrut_var,
                        node.scrut_type.clone(),
                        Arc::new(Term::FunType(node.equation_var, equation_type, conclusion)),
                    ));
                    Term::fun_apps(
                        Arc::new(Term::Ann(proof, r#type)),
                        [
                            node.scrut.clone(),
                            Term::refl(node.scrut_type.clone(), node.scrut.clone()),
                        ],
                    )
                }
            },
        }
    }
}

/// Full applications of `function` in `term`, outside of binders.
fn recursive_calls(term: &ArcTerm, function: Symbol, arity: usize, calls: &mut Vec<Vec<ArcTerm>>) {
    match term.as_ref() {
        Term::FunApp(_, _) => {
            let (head, args) = Term::spine(term);
            let is_call = matches!(head.as_ref(), Term::Global(name) if *name == function);
            if is_call && args.len() == arity {
                let is_duplicate = (calls.iter())
                    .any(|call| Iterator::zip(call.iter(), &args).all(|(lhs, rhs)| alpha_eq(lhs, rhs)));
                if !is_duplicate {
                    calls.push(args.clone());
                }
            }
            recursive_calls(head, function, arity, calls);
            for arg in &args {
                recursive_calls(arg, function, arity, calls);
            }
        }
        Term::Ann(term, _) => recursive_calls(term, function, arity, calls),
        Term::Universe
        | Term::LocalVar(_)
        | Term::Global(_)
        | Term::FunType(_, _, _)
        | Term::FunLit(_, _, _)
        | Term::Case(_, _)
        | Term::Absurd(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_under_binders_are_ignored() {
        let f = Symbol::intern("f");
        let x = Var::fresh(Symbol::intern("x"));
        let y = Var::fresh(Symbol::intern("y"));

        // f x (fun y => f y y)
        let inner = Term::fun_apps(Term::global(f), [Term::var(y), Term::var(y)]);
        let lambda = Arc::new(Term::FunLit(y, Term::universe(), inner));
        let term = Term::fun_apps(Term::global(f), [Term::var(x), lambda]);

        let mut calls = Vec::new();
        recursive_calls(&term, f, 2, &mut calls);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].as_var(), Some(x));
    }

    #[test]
    fn partial_applications_are_not_calls() {
        let f = Symbol::intern("f");
        let x = Var::fresh(Symbol::intern("x"));
        let term = Term::fun_app(Term::global(f), Term::var(x));

        let mut calls = Vec::new();
        recursive_calls(&term, f, 2, &mut calls);
        assert!(calls.is_empty());
    }

    #[test]
    fn repeated_calls_share_a_hypothesis() {
        let f = Symbol::intern("f");
        let g = Symbol::intern("g");
        let x = Var::fresh(Symbol::intern("x"));
        let call = Term::fun_app(Term::global(f), Term::var(x));
        let term = Term::fun_apps(Term::global(g), [call.clone(), call]);

        let mut calls = Vec::new();
        recursive_calls(&term, f, 1, &mut calls);
        assert_eq!(calls.len(), 1);
    }
}
