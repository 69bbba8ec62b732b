//! Right-hand sides of clauses, and the auxiliary functions generated for
//! `with` and `where`.
//!
//! Auxiliaries are lambda-lifted over the context of the leaf they belong
//! to, and compiled like any other function before the right-hand side of
//! the clause is elaborated.

use log::debug;

use crate::compile::matrix::{self, Clause, Rhs};
use crate::compile::split::{Definition, Leaf, LeafBody, Matched, Problem, SplitTree, WithNode};
use crate::compile::{CompileError, Compiler, FunctionProblem};
use crate::core::semantics::{abstract_term, Env};
use crate::core::signature::Function;
use crate::core::typing::TypeError;
use crate::core::{ArcTerm, Telescope, Term};
use crate::source::ByteRange;
use crate::surface::elaboration::Scope;
use crate::surface::{self, Definition as WhereDefinition};
use crate::symbol::{Symbol, Var};

impl<'a> Compiler<'a> {
    /// Names in scope on the right-hand side of a clause.
    fn scope<'s>(&'s self, env: &[(Symbol, ArcTerm)]) -> Scope<'s> {
        Scope::new(&self.signature)
            .with_auxiliaries(&self.aux_names)
            .with_locals(env.iter().cloned())
    }

    pub(super) fn leaf(
        &mut self,
        definition: &Definition<'_>,
        problem: Problem,
        clause_index: usize,
        matched: Matched,
    ) -> Result<SplitTree, CompileError> {
        let clause = &definition.clauses[clause_index];
        let Matched {
            mut env,
            inaccessible,
        } = matched;

        let body = match &clause.rhs {
            Rhs::Absurd(range) => {
                return match self.checker().find_empty(&problem.context) {
                    Some(var) => Ok(SplitTree::Absurd {
                        context: problem.context,
                        var,
                        args: problem.args,
                        goal: problem.goal,
                    }),
                    None => Err(CompileError::TypeError {
                        range: *range,
                        error: TypeError::NoEmptyVariable {
                            context: problem.context,
                        },
                    }),
                };
            }
            Rhs::Term(term) => {
                self.bind_clause(&problem.context, clause, &mut env, inaccessible)?;
                let body = self.scope(&env).term(term)?;
                (self.checker().check(&problem.context, &body, &problem.goal))
                    .map_err(|error| CompileError::TypeError {
                        range: term.range(),
                        error,
                    })?;
                LeafBody::Term(body)
            }
            Rhs::With {
                scrut,
                equation,
                clauses,
            } => {
                self.bind_clause(&problem.context, clause, &mut env, inaccessible)?;
                let node = self.with_clause(&problem, env, clause.range, scrut, *equation, clauses)?;
                LeafBody::With(Box::new(node))
            }
        };

        Ok(SplitTree::Leaf(Leaf {
            clause: clause_index,
            context: problem.context,
            args: problem.args,
            goal: problem.goal,
            body,
        }))
    }

    /// Check the inaccessible patterns of a matched clause, then bring its
    /// `where` auxiliaries into scope.
    fn bind_clause(
        &mut self,
        context: &Telescope,
        clause: &Clause,
        env: &mut Vec<(Symbol, ArcTerm)>,
        inaccessible: Vec<(ByteRange, surface::Term, ArcTerm)>,
    ) -> Result<(), CompileError> {
        for (range, term, expected) in inaccessible {
            let found = self.scope(env).term(&term)?;
            if !Env::new(&self.signature).is_convertible(&found, &expected) {
                return Err(CompileError::InaccessibleMismatch {
                    range,
                    context: context.clone(),
                    expected,
                    found,
                });
            }
        }
        self.where_block(context, &clause.wheres, env)
    }

    fn where_block(
        &mut self,
        context: &Telescope,
        definitions: &[WhereDefinition],
        env: &mut Vec<(Symbol, ArcTerm)>,
    ) -> Result<(), CompileError> {
        // Declare every auxiliary first, so that they can call each other
        let mut declared = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let (_, user_name) = definition.name;
            let name = self.where_name(user_name);
            let r#type = {
                let mut scope = self.scope(env);
                let params = scope.params(&definition.params)?;
                let body_type = scope.term(&definition.r#type)?;
                Term::fun_types(&params, body_type)
            };
            (self.checker().check_type(context, &r#type)).map_err(|error| CompileError::TypeError {
                range: definition.r#type.range(),
                error,
            })?;

            let arity = Telescope::from_fun_type(&r#type).0.len();
            let r#type = Term::fun_types(context, r#type);
            debug!("lifting `{}` to {}", user_name, name);
            self.signature.add_function(Function {
                name,
                r#type: r#type.clone(),
                body: None,
                transparent: false,
                elim: None,
            });
            env.push((user_name, Term::fun_apps(Term::global(name), context.args())));
            declared.push((name, r#type, arity, definition));
        }

        for (name, r#type, arity, definition) in declared {
            let clauses = matrix::normalise(&self.signature, arity, &definition.clauses)?;
            let compiled = self.function(FunctionProblem {
                name,
                range: definition.range,
                r#type,
                arity: context.len() + arity,
                clauses: clauses.into_iter().map(|clause| clause.pad(context.len(), 0)).collect(),
                env: env.clone(),
            })?;
            self.auxiliaries.push(compiled);
        }

        Ok(())
    }

    /// The name of a lifted `where` auxiliary. The same clause can reach
    /// several leaves, each of which gets its own copy.
    fn where_name(&mut self, name: Symbol) -> Symbol {
        let count = {
            let count = self.where_counts.entry(name).or_insert(0);
            *count += 1;
            *count
        };
        match count {
            1 => self.root.qualify(name),
            count => self.root.qualify(name).qualify(count),
        }
    }

    fn with_clause(
        &mut self,
        problem: &Problem,
        mut env: Vec<(Symbol, ArcTerm)>,
        range: ByteRange,
        scrut: &surface::Term,
        equation: Option<(ByteRange, Symbol)>,
        clauses: &[Clause],
    ) -> Result<WithNode, CompileError> {
        let context = &problem.context;
        let type_error = |error| CompileError::TypeError {
            range: scrut.range(),
            error,
        };

        let scrut_term = self.scope(&env).term(scrut)?;
        let scrut_type = self.checker().synth(context, &scrut_term).map_err(type_error)?;

        let scrut_var = Var::fresh(Symbol::intern("w"));
        let equation_var = Var::fresh(equation.map_or_else(|| Symbol::intern("h"), |(_, name)| name));
        let mut aux_context = context.clone();
        aux_context.push(scrut_var, scrut_type.clone());
        aux_context.push(
            equation_var,
            Term::eq(scrut_type.clone(), scrut_term.clone(), Term::var(scrut_var)),
        );

        // Generalise the goal over the inspected value
        let goal = abstract_term(&problem.goal, &scrut_term, &Term::var(scrut_var));
        let r#type = Term::fun_types(&aux_context, goal);
        (self.checker().check_type(&Telescope::new(), &r#type)).map_err(type_error)?;

        self.with_count += 1;
        let name = self.root.qualify(format!("with{}", self.with_count));
        debug!("generalising over the inspected value in {}", name);

        if let Some((_, equation_name)) = equation {
            env.push((equation_name, Term::var(equation_var)));
        }
        let compiled = self.function(FunctionProblem {
            name,
            range,
            r#type,
            arity: aux_context.len(),
            clauses: (clauses.iter().cloned())
                .map(|clause| clause.pad(context.len(), 1))
                .collect(),
            env,
        })?;

        let refl = Term::refl(scrut_type.clone(), scrut_term.clone());
        let call = Term::fun_apps(
            Term::global(name),
            context.args().into_iter().chain([scrut_term.clone(), refl]),
        );
        (self.checker().check(context, &call, &problem.goal)).map_err(|error| {
            CompileError::IllTypedCompilation {
                function: name,
                error,
            }
        })?;

        let tree = Box::new(compiled.tree.clone());
        self.auxiliaries.push(compiled);

        Ok(WithNode {
            function: name,
            scrut: scrut_term,
            scrut_type,
            scrut_var,
            equation_var,
            call,
            tree,
        })
    }
}
