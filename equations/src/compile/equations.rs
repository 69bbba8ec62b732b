//! Equations between a function applied to the patterns of a leaf and the
//! right-hand side of that leaf.
//!
//! Each equation is proven by reflexivity, which holds because the function
//! unfolds to its case tree, and the case tree reduces to the leaf when
//! applied to the leaf's patterns.

use log::trace;

use crate::compile::split::SplitTree;
use crate::compile::CompileError;
use crate::core::semantics::Env;
use crate::core::signature::Signature;
use crate::core::typing::Checker;
use crate::core::{ArcTerm, Telescope, Term};
use crate::rewrite::RewriteRule;
use crate::symbol::Symbol;

#[derive(Debug, Clone)]
pub struct Equation {
    /// `f.equation_j`
    pub name: Symbol,
    /// `Π Δⱼ. Eq Tⱼ (f qsⱼ) rhsⱼ`
    pub r#type: ArcTerm,
    /// `λ Δⱼ. refl Tⱼ (f qsⱼ)`
    pub proof: ArcTerm,
    pub rule: RewriteRule,
}

/// Generate and check the equations of `function`, one per leaf of `tree`,
/// numbered from one in tree order.
pub fn generate(signature: &Signature, function: Symbol, tree: &SplitTree) -> Result<Vec<Equation>, CompileError> {
    let unfold = [function];
    let checker = Checker::new(Env::with_unfold(signature, &unfold));
    let mut equations = Vec::new();
    collect(&checker, function, tree, &mut equations)?;
    Ok(equations)
}

fn collect(
    checker: &Checker<'_>,
    function: Symbol,
    tree: &SplitTree,
    equations: &mut Vec<Equation>,
) -> Result<(), CompileError> {
    match tree {
        SplitTree::Split { branches, .. } => {
            for branch in branches {
                collect(checker, function, &branch.tree, equations)?;
            }
            Ok(())
        }
        SplitTree::Absurd { .. } => Ok(()),
        SplitTree::Leaf(leaf) => {
            let name = function.qualify(format!("equation_{}", equations.len() + 1));
            let lhs = Term::fun_apps(Term::global(function), leaf.args.iter().cloned());
            let rhs = leaf.body.term().clone();
            let r#type = Term::fun_types(
                &leaf.context,
                Term::eq(leaf.goal.clone(), lhs.clone(), rhs.clone()),
            );
            let proof = Term::fun_lits(&leaf.context, Term::refl(leaf.goal.clone(), lhs.clone()));

            trace!("checking {}", name);
            (checker.check(&Telescope::new(), &proof, &r#type)).map_err(|error| {
                CompileError::IllTypedCompilation {
                    function: name,
                    error,
                }
            })?;

            equations.push(Equation {
                name,
                r#type,
                proof,
                rule: RewriteRule {
                    name,
                    context: leaf.context.clone(),
                    r#type: leaf.goal.clone(),
                    lhs,
                    rhs,
                },
            });
            Ok(())
        }
    }
}
