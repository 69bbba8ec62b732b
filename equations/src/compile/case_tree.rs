//! Translation of splitting trees to core terms.

use std::sync::Arc;

use crate::compile::split::SplitTree;
use crate::core::{ArcTerm, Branch, Term};

/// The body of the compiled function, in the context of its arguments.
pub fn synthesize(tree: &SplitTree) -> ArcTerm {
    match tree {
        SplitTree::Split { var, branches, .. } => Arc::new(Term::Case(
            Term::var(*var),
            (branches.iter())
                .map(|branch| Branch {
                    ctor: branch.ctor,
                    fields: branch.fields.clone(),
                    body: synthesize(&branch.tree),
                })
                .collect(),
        )),
        SplitTree::Leaf(leaf) => leaf.body.term().clone(),
        SplitTree::Absurd { var, .. } => Arc::new(Term::Absurd(Term::var(*var))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::split::{Leaf, LeafBody, SplitBranch};
    use crate::core::Telescope;
    use crate::symbol::{Symbol, Var};

    fn leaf(body: ArcTerm) -> SplitTree {
        SplitTree::Leaf(Leaf {
            clause: 0,
            context: Telescope::new(),
            args: Vec::new(),
            goal: Term::universe(),
            body: LeafBody::Term(body),
        })
    }

    #[test]
    fn splits_become_case_splits() {
        let n = Var::fresh(Symbol::intern("n"));
        let m = Var::fresh(Symbol::intern("m"));
        let zero = Symbol::intern("zero");
        let succ = Symbol::intern("succ");
        let tree = SplitTree::Split {
            context: Telescope::new(),
            var: n,
            branches: vec![
                SplitBranch {
                    ctor: zero,
                    fields: Vec::new(),
                    tree: leaf(Term::global(zero)),
                },
                SplitBranch {
                    ctor: succ,
                    fields: vec![m],
                    tree: leaf(Term::var(m)),
                },
            ],
        };

        match synthesize(&tree).as_ref() {
            Term::Case(scrut, branches) => {
                assert_eq!(scrut.as_var(), Some(n));
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[1].fields, vec![m]);
                assert_eq!(branches[1].body.as_var(), Some(m));
            }
            term => panic!("expected a case split, found {term:?}"),
        }
    }

    #[test]
    fn absurd_nodes() {
        let e = Var::fresh(Symbol::intern("e"));
        let tree = SplitTree::Absurd {
            context: Telescope::new(),
            var: e,
            args: Vec::new(),
            goal: Term::universe(),
        };
        assert!(matches!(synthesize(&tree).as_ref(), Term::Absurd(scrut) if scrut.as_var() == Some(e)));
    }
}
