//! Proof support built on compiled definitions.
//!
//! [`simplify`] rewrites a goal with the equations registered for a set of
//! functions, and [`case_split`] applies the elimination principle of a
//! function to a goal that mentions one of its applications.

use codespan_reporting::diagnostic::Diagnostic;
use fxhash::FxHashSet;
use log::{debug, trace};
use std::sync::Arc;

use crate::core::pretty;
use crate::core::semantics::{abstract_term, alpha_eq, Env, Subst};
use crate::core::signature::{eq_name, Signature};
use crate::core::{ArcTerm, Branch, Telescope, Term};
use crate::rewrite::{RewriteDatabase, RewriteRule};
use crate::source::FileId;
use crate::symbol::{Symbol, Var};

/// The maximum number of rewrites performed by [`simplify`]. Rewriting with
/// user-supplied rules is not guaranteed to terminate.
const MAX_REWRITES: usize = 1000;

/// A type to inhabit, in a context of hypotheses.
#[derive(Debug, Clone)]
pub struct Goal {
    pub context: Telescope,
    pub r#type: ArcTerm,
}

impl Goal {
    pub fn new(context: Telescope, r#type: ArcTerm) -> Goal {
        Goal { context, r#type }
    }

    /// Introduce the leading dependent function binders of a type as
    /// hypotheses.
    pub fn from_type(r#type: &ArcTerm) -> Goal {
        let (context, r#type) = Telescope::from_fun_type(r#type);
        Goal { context, r#type }
    }
}

#[derive(Debug, Clone)]
pub struct Simplified {
    pub goal: Goal,
    /// Whether the goal became an equation between convertible terms.
    pub closed: bool,
}

/// Normalise a goal and rewrite it with the equations of `names`, outermost
/// redexes first, until no rule applies.
pub fn simplify(db: &RewriteDatabase, signature: &Signature, goal: &Goal, names: &[Symbol]) -> Simplified {
    let env = Env::new(signature);
    let rules = db.rules(names);

    let mut r#type = env.normalise(&goal.r#type);
    for step in 0.. {
        if step == MAX_REWRITES {
            debug!("giving up on simplification after {step} rewrites");
            break;
        }
        match rewrite_outermost(&rules, &r#type) {
            Some(next) => r#type = env.normalise(&next),
            None => break,
        }
    }

    let closed = match Term::global_spine(&r#type) {
        Some((head, args)) if head == eq_name() && args.len() == 3 => env.is_convertible(&args[1], &args[2]),
        _ => false,
    };

    Simplified {
        goal: Goal::new(goal.context.clone(), r#type),
        closed,
    }
}

fn rewrite_outermost(rules: &[Arc<RewriteRule>], term: &ArcTerm) -> Option<ArcTerm> {
    for rule in rules {
        let mut subst = Subst::new();
        if match_pattern(&rule.context, &rule.lhs, term, &mut subst) && binds_rhs(rule, &subst) {
            trace!("rewriting with {}", rule.name);
            return Some(subst.apply(&rule.rhs));
        }
    }

    match term.as_ref() {
        Term::Universe | Term::LocalVar(_) | Term::Global(_) => None,
        Term::FunType(var, param_type, body_type) => {
            if let Some(param_type) = rewrite_outermost(rules, param_type) {
                return Some(Arc::new(Term::FunType(*var, param_type, body_type.clone())));
            }
            let body_type = rewrite_outermost(rules, body_type)?;
            Some(Arc::new(Term::FunType(*var, param_type.clone(), body_type)))
        }
        Term::FunLit(var, param_type, body) => {
            if let Some(param_type) = rewrite_outermost(rules, param_type) {
                return Some(Arc::new(Term::FunLit(*var, param_type, body.clone())));
            }
            let body = rewrite_outermost(rules, body)?;
            Some(Arc::new(Term::FunLit(*var, param_type.clone(), body)))
        }
        Term::FunApp(head, arg) => {
            if let Some(head) = rewrite_outermost(rules, head) {
                return Some(Term::fun_app(head, arg.clone()));
            }
            let arg = rewrite_outermost(rules, arg)?;
            Some(Term::fun_app(head.clone(), arg))
        }
        Term::Ann(expr, r#type) => {
            if let Some(expr) = rewrite_outermost(rules, expr) {
                return Some(Arc::new(Term::Ann(expr, r#type.clone())));
            }
            let r#type = rewrite_outermost(rules, r#type)?;
            Some(Arc::new(Term::Ann(expr.clone(), r#type)))
        }
        Term::Case(scrut, branches) => {
            if let Some(scrut) = rewrite_outermost(rules, scrut) {
                return Some(Arc::new(Term::Case(scrut, branches.clone())));
            }
            for (index, branch) in branches.iter().enumerate() {
                if let Some(body) = rewrite_outermost(rules, &branch.body) {
                    let mut branches = branches.clone();
                    branches[index] = Branch {
                        ctor: branch.ctor,
                        fields: branch.fields.clone(),
                        body,
                    };
                    return Some(Arc::new(Term::Case(scrut.clone(), branches)));
                }
            }
            None
        }
        Term::Absurd(scrut) => Some(Arc::new(Term::Absurd(rewrite_outermost(rules, scrut)?))),
    }
}

/// First-order matching, where the variables of `pattern_vars` stand for
/// arbitrary terms.
fn match_pattern(pattern_vars: &Telescope, pattern: &ArcTerm, term: &ArcTerm, subst: &mut Subst) -> bool {
    match (pattern.as_ref(), term.as_ref()) {
        (Term::LocalVar(var), _) if pattern_vars.contains(*var) => match subst.get(*var) {
            Some(bound) => alpha_eq(bound, term),
            None => {
                subst.insert(*var, term.clone());
                true
            }
        },
        (Term::FunApp(pattern_head, pattern_arg), Term::FunApp(head, arg)) => {
            match_pattern(pattern_vars, pattern_head, head, subst)
                && match_pattern(pattern_vars, pattern_arg, arg, subst)
        }
        (_, _) => alpha_eq(pattern, term),
    }
}

/// Rules whose right-hand side mentions variables that the left-hand side
/// does not bind cannot be applied.
fn binds_rhs(rule: &RewriteRule, subst: &Subst) -> bool {
    let mut free_vars = FxHashSet::default();
    rule.rhs.free_vars(&mut free_vars);
    (free_vars.into_iter())
        .filter(|var| rule.context.contains(*var))
        .all(|var| subst.contains(var))
}

#[derive(Debug, Clone)]
pub enum TacticError {
    /// The term is not an application of a compiled function to all of its
    /// arguments, or the function has no registered elimination principle.
    NoEliminationPrinciple { target: ArcTerm, function: Option<Symbol> },
}

impl TacticError {
    pub fn to_diagnostic(&self) -> Diagnostic<FileId> {
        match self {
            TacticError::NoEliminationPrinciple { target, function } => {
                let target = pretty::Context::new().render(target);
                Diagnostic::error()
                    .with_message(format!("cannot split on `{target}`"))
                    .with_notes(match function {
                        Some(function) => vec![format!("`{function}` has no elimination principle")],
                        None => vec!["expected a compiled definition applied to all of its arguments".to_owned()],
                    })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subgoal {
    /// The hypotheses of the case, followed by its induction hypotheses.
    pub goal: Goal,
    pub num_ihs: usize,
    /// Cases of absurd nodes, which hold for any motive.
    pub absurd: bool,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub struct CaseSplit {
    pub eliminator: Symbol,
    /// The goal, abstracted over the arguments of the split application.
    pub motive: ArcTerm,
    /// One subgoal for each case of the function, in order.
    pub subgoals: Vec<Subgoal>,
}

/// Split a goal by the case structure of the function applied in `target`.
pub fn case_split(
    db: &RewriteDatabase,
    signature: &Signature,
    goal: &Goal,
    target: &ArcTerm,
) -> Result<CaseSplit, TacticError> {
    let no_elimination = |function| TacticError::NoEliminationPrinciple {
        target: target.clone(),
        function,
    };

    let (function, args) = Term::global_spine(target).ok_or_else(|| no_elimination(None))?;
    let eliminator = (db.eliminator(function)).ok_or_else(|| no_elimination(Some(function)))?;
    let elim_type = (signature.r#type(eliminator.name)).ok_or_else(|| no_elimination(Some(function)))?;
    if args.len() != eliminator.arity {
        return Err(no_elimination(None));
    }

    let motive_type = match elim_type.as_ref() {
        Term::FunType(_, motive_type, _) => motive_type,
        _ => return Err(no_elimination(Some(function))),
    };
    let (params, _) = Telescope::from_fun_type(motive_type);
    let params = freshen(&params, &mut Subst::new());
    if params.len() != args.len() {
        return Err(no_elimination(Some(function)));
    }

    let (context, motive_body) = generalise(goal, &args, &params);
    let motive = Term::fun_lits(&params, motive_body);
    debug!("splitting on {} with motive {}", function, pretty::Context::new().render(&motive));

    let env = Env::new(signature);
    let mut r#type = (env.instantiate(elim_type, &[motive.clone()])).ok_or_else(|| no_elimination(Some(function)))?;

    let mut subgoals = Vec::with_capacity(eliminator.hypotheses.len());
    for hypothesis in &eliminator.hypotheses {
        let (hypothesis_type, rest) = match r#type.as_ref() {
            Term::FunType(_, hypothesis_type, rest) => (hypothesis_type.clone(), rest.clone()),
            _ => return Err(no_elimination(Some(function))),
        };
        r#type = rest;

        let mut subst = Subst::new();
        let mut case_context = context.clone();
        let mut conclusion = hypothesis_type;
        for _ in 0..(hypothesis.num_params + hypothesis.num_ihs) {
            let next = match conclusion.as_ref() {
                Term::FunType(var, param_type, body_type) => {
                    let fresh = var.refresh();
                    case_context.push(fresh, env.normalise(&subst.apply(param_type)));
                    subst.insert(*var, Term::var(fresh));
                    body_type.clone()
                }
                _ => return Err(no_elimination(Some(function))),
            };
            conclusion = next;
        }

        let goal = Goal::new(case_context, subst.apply(&conclusion));
        let simplified = simplify(db, signature, &goal, &[function]);
        subgoals.push(Subgoal {
            goal: simplified.goal,
            num_ihs: hypothesis.num_ihs,
            absurd: hypothesis.absurd,
            closed: simplified.closed,
        });
    }

    Ok(CaseSplit {
        eliminator: eliminator.name,
        motive,
        subgoals,
    })
}

/// A copy of a telescope with fresh variables, recording the renaming.
fn freshen(telescope: &Telescope, subst: &mut Subst) -> Telescope {
    let mut fresh = Telescope::new();
    for (var, r#type) in telescope.iter() {
        let new_var = var.refresh();
        fresh.push(new_var, subst.apply(r#type));
        subst.insert(*var, Term::var(new_var));
    }
    fresh
}

/// Abstract the goal over the arguments of an application, replacing each
/// argument with the corresponding motive parameter.
///
/// Hypotheses that depend on an abstracted variable are moved into the goal.
/// Returns the remaining hypotheses and the body of the motive.
fn generalise(goal: &Goal, args: &[ArcTerm], params: &Telescope) -> (Telescope, ArcTerm) {
    let abstracted: FxHashSet<Var> = (args.iter())
        .filter_map(|arg| arg.as_var())
        .filter(|var| goal.context.contains(*var))
        .collect();

    let mut context = Telescope::new();
    let mut reverted = Telescope::new();
    let mut dependencies: Vec<Var> = abstracted.iter().copied().collect();
    for (var, r#type) in goal.context.iter() {
        if abstracted.contains(var) {
            continue;
        }
        match dependencies.iter().any(|dependency| r#type.occurs(*dependency)) {
            true => {
                reverted.push(*var, r#type.clone());
                dependencies.push(*var);
            }
            false => context.push(*var, r#type.clone()),
        }
    }

    let mut body = Term::fun_types(&reverted, goal.r#type.clone());
    let mut subst = Subst::new();
    for (arg, param) in Iterator::zip(args.iter(), params.vars()) {
        match arg.as_var() {
            Some(var) if abstracted.contains(&var) => {
                if !subst.contains(var) {
                    subst.insert(var, Term::var(param));
                }
            }
            _ => body = abstract_term(&body, arg, &Term::var(param)),
        }
    }

    (context, subst.apply(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::CompileOptions;
    use crate::source::FileId;
    use crate::surface::elaboration::{elaborate_module, Elaboration};
    use crate::surface::elaboration::Scope;
    use crate::surface::{self, Module};

    const SOURCE: &str = "
        inductive Nat : Type { zero : Nat, succ : Nat -> Nat }
        inductive Bool : Type { true : Bool, false : Bool }
        inductive List (A : Type) : Type { nil : List A, cons : A -> List A -> List A }

        inductive Le : Nat -> Nat -> Type {
          le_zero : (n : Nat) -> Le zero n,
          le_succ : (m : Nat) -> (n : Nat) -> Le m n -> Le (succ m) (succ n),
        }

        def length (A : Type) (l : List A) : Nat {
          | A, nil => zero
          | A, cons a l => succ (length A l)
        }

        def filter (A : Type) (p : A -> Bool) (l : List A) : List A {
          | A, p, nil => nil A
          | A, p, cons a l with p a {
            | true => cons A a (filter A p l)
            | false => filter A p l
          }
        }
    ";

    fn elaborate(db: &RewriteDatabase) -> Elaboration {
        let file_id = FileId::try_from(1).unwrap();
        let (module, messages) = Module::parse(file_id, SOURCE);
        assert!(messages.is_empty(), "{messages:?}");
        let elaboration = elaborate_module(db, &module, &CompileOptions::default());
        assert!(elaboration.messages.is_empty(), "{:?}", elaboration.messages);
        elaboration
    }

    fn term(signature: &Signature, locals: &Telescope, source: &str) -> ArcTerm {
        let file_id = FileId::try_from(2).unwrap();
        let (term, messages) = surface::Term::parse(file_id, source);
        assert!(messages.is_empty(), "{messages:?}");
        let locals = locals.iter().map(|(var, _)| (var.name(), Term::var(*var)));
        Scope::new(signature).with_locals(locals).term(&term.unwrap()).unwrap()
    }

    fn goal(signature: &Signature, source: &str) -> Goal {
        Goal::from_type(&term(signature, &Telescope::new(), source))
    }

    #[test]
    fn simplify_closes_computations() {
        let db = RewriteDatabase::new();
        let elaboration = elaborate(&db);
        let signature = &elaboration.signature;

        let goal = goal(
            signature,
            "(A : Type) -> (a : A) -> Eq Nat (length A (cons A a (nil A))) (succ zero)",
        );
        let simplified = simplify(&db, signature, &goal, &[Symbol::intern("length")]);
        assert!(simplified.closed);

        // Without the equations of `length` the goal is stuck
        let stuck = simplify(&db, signature, &goal, &[]);
        assert!(!stuck.closed);
    }

    #[test]
    fn simplify_is_idempotent() {
        let db = RewriteDatabase::new();
        let elaboration = elaborate(&db);
        let signature = &elaboration.signature;
        let names = [Symbol::intern("length")];

        let goal = goal(
            signature,
            "(A : Type) -> (a : A) -> (l : List A) -> Eq Nat (length A (cons A a l)) (succ (length A l))",
        );
        let once = simplify(&db, signature, &goal, &names);
        let twice = simplify(&db, signature, &once.goal, &names);
        assert!(alpha_eq(&once.goal.r#type, &twice.goal.r#type));
        assert!(once.closed);
    }

    #[test]
    fn case_split_on_length() {
        let db = RewriteDatabase::new();
        let elaboration = elaborate(&db);
        let signature = &elaboration.signature;

        let goal = goal(signature, "(A : Type) -> (l : List A) -> Le zero (length A l)");
        let target = term(signature, &goal.context, "length A l");
        let split = case_split(&db, signature, &goal, &target).unwrap();

        assert_eq!(split.eliminator, Symbol::intern("length.elim"));
        assert_eq!(split.subgoals.len(), 2);
        assert_eq!(split.subgoals[0].num_ihs, 0);
        assert_eq!(split.subgoals[1].num_ihs, 1);

        // The nil case is `Le zero zero`, after rewriting `length A nil`
        let nil_goal = &split.subgoals[0].goal.r#type;
        let expected = term(signature, &Telescope::new(), "Le zero zero");
        assert!(alpha_eq(nil_goal, &expected));
    }

    #[test]
    fn case_split_on_filter() {
        let db = RewriteDatabase::new();
        let elaboration = elaborate(&db);
        let signature = &elaboration.signature;

        let goal = goal(
            signature,
            "(A : Type) -> (p : A -> Bool) -> (l : List A) -> Le (length A (filter A p l)) (length A l)",
        );
        let target = term(signature, &goal.context, "filter A p l");
        let split = case_split(&db, signature, &goal, &target).unwrap();

        // nil, cons with `p a = true`, cons with `p a = false`
        assert_eq!(split.subgoals.len(), 3);
        assert_eq!(
            split.subgoals.iter().map(|subgoal| subgoal.num_ihs).collect::<Vec<_>>(),
            [0, 1, 1],
        );
        assert!(split.subgoals.iter().all(|subgoal| !subgoal.absurd));
    }

    #[test]
    fn reflexive_motives_close_every_premise() {
        let db = RewriteDatabase::new();
        let elaboration = elaborate(&db);
        let signature = &elaboration.signature;

        let cases = [
            (
                "(A : Type) -> (l : List A) -> Eq Nat (length A l) (length A l)",
                "length A l",
                2,
            ),
            (
                "(A : Type) -> (p : A -> Bool) -> (l : List A) -> Eq (List A) (filter A p l) (filter A p l)",
                "filter A p l",
                3,
            ),
        ];
        for (goal_source, target_source, num_subgoals) in cases {
            let goal = goal(signature, goal_source);
            let target = term(signature, &goal.context, target_source);
            let split = case_split(&db, signature, &goal, &target).unwrap();

            assert_eq!(split.subgoals.len(), num_subgoals, "{target_source}");
            for subgoal in &split.subgoals {
                assert!(subgoal.closed, "{target_source}: {:?}", subgoal.goal.r#type);
            }
        }
    }

    #[test]
    fn case_split_requires_an_eliminator() {
        let db = RewriteDatabase::new();
        let elaboration = elaborate(&db);
        let signature = &elaboration.signature;

        let goal = goal(signature, "(n : Nat) -> Le n n");
        let target = term(signature, &goal.context, "succ n");
        assert!(matches!(
            case_split(&db, signature, &goal, &target),
            Err(TacticError::NoEliminationPrinciple { .. }),
        ));
    }
}
