//! Compilation of pattern-matching definitions.
//!
//! A definition is compiled in several passes:
//!
//! 1. its clauses are [normalised][matrix] into a pattern matrix,
//! 2. the [splitting engine][split] builds a splitting tree, elaborating the
//!    right-hand sides and the `with` and `where` [auxiliaries][aux] as it
//!    reaches each leaf,
//! 3. the tree is turned into a [case tree][case_tree] of the core language,
//! 4. an [equation][equations] is generated for every leaf, and
//! 5. an [elimination principle][elim] is derived from the tree.
//!
//! Every generated term is type checked before it is returned. Nothing is
//! registered in the rewrite database until the whole definition, including
//! its auxiliaries, has compiled.

use fxhash::FxHashMap;
use log::{debug, trace};

use crate::core::semantics::Env;
use crate::core::signature::{Function, Signature};
use crate::core::typing::Checker;
use crate::core::{ArcTerm, Telescope, Term};
use crate::rewrite::{RegistrationGuard, RewriteDatabase};
use crate::source::ByteRange;
use crate::surface;
use crate::symbol::Symbol;

mod aux;
pub mod case_tree;
pub mod elim;
pub mod equations;
mod error;
pub mod matrix;
pub mod split;

pub use self::elim::Elimination;
pub use self::equations::Equation;
pub use self::error::CompileError;
pub use self::split::SplitTree;

/// Library configuration for the compiler.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Report unused clauses as warnings rather than errors.
    pub allow_redundant: bool,
}

/// A definition to compile, with its declared type already elaborated.
pub struct Declaration<'a> {
    pub name: Symbol,
    pub range: ByteRange,
    pub r#type: ArcTerm,
    pub transparent: bool,
    pub clauses: &'a [surface::Clause],
}

/// Everything produced by compiling a definition.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: Symbol,
    pub r#type: ArcTerm,
    pub transparent: bool,
    /// The compiled body, as a function literal over the arguments.
    pub term: ArcTerm,
    pub tree: SplitTree,
    /// One equation per leaf of the tree, in tree order.
    pub equations: Vec<Equation>,
    pub elimination: Elimination,
    /// The `with` and `where` auxiliaries generated for the definition, in
    /// the order they were compiled.
    pub auxiliaries: Vec<CompiledFunction>,
    /// Problems that were tolerated because of the [`CompileOptions`].
    pub warnings: Vec<CompileError>,
}

impl CompiledFunction {
    /// Add the function and the definitions generated for it to a signature.
    pub fn commit(&self, signature: &mut Signature) {
        for auxiliary in &self.auxiliaries {
            auxiliary.commit(signature);
        }

        signature.add_function(Function {
            name: self.name,
            r#type: self.r#type.clone(),
            body: Some(self.term.clone()),
            transparent: self.transparent,
            elim: Some(self.elimination.name),
        });
        for equation in &self.equations {
            signature.add_function(Function {
                name: equation.name,
                r#type: equation.r#type.clone(),
                body: Some(equation.proof.clone()),
                transparent: false,
                elim: None,
            });
        }
        signature.add_function(Function {
            name: self.elimination.name,
            r#type: self.elimination.r#type.clone(),
            body: Some(self.elimination.term.clone()),
            transparent: false,
            elim: None,
        });
    }
}

/// Compile a definition against a signature that already contains its
/// declared type.
///
/// On success the equations and elimination principles of the definition
/// and of its auxiliaries are registered in `db`. On failure nothing is.
pub fn compile(
    db: &RewriteDatabase,
    signature: &Signature,
    declaration: &Declaration<'_>,
    options: &CompileOptions,
) -> Result<CompiledFunction, CompileError> {
    let guard = db.claim(declaration.name).map_err(|_| CompileError::AlreadyCompiling {
        range: declaration.range,
        name: declaration.name,
    })?;

    let aux_names = matrix::where_names(declaration.clauses)?;
    let arity = Telescope::from_fun_type(&declaration.r#type).0.len();
    let clauses = matrix::normalise(signature, arity, declaration.clauses)?;

    let mut compiler = Compiler {
        db,
        options,
        root: declaration.name,
        transparent: declaration.transparent,
        signature: signature.clone(),
        aux_names,
        where_counts: FxHashMap::default(),
        with_count: 0,
        auxiliaries: Vec::new(),
        guards: vec![guard],
        warnings: Vec::new(),
    };

    let mut compiled = compiler.function(FunctionProblem {
        name: declaration.name,
        range: declaration.range,
        r#type: declaration.r#type.clone(),
        arity,
        clauses,
        env: Vec::new(),
    })?;
    compiled.auxiliaries = std::mem::take(&mut compiler.auxiliaries);
    compiled.warnings = std::mem::take(&mut compiler.warnings);

    compiler.register(&compiled);
    Ok(compiled)
}

/// A function to compile: either the definition itself, or one of its
/// auxiliaries.
struct FunctionProblem {
    name: Symbol,
    range: ByteRange,
    r#type: ArcTerm,
    /// The number of arguments matched by the clauses.
    arity: usize,
    clauses: Vec<matrix::Clause>,
    /// Names bound by enclosing clauses.
    env: Vec<(Symbol, ArcTerm)>,
}

struct Compiler<'a> {
    db: &'a RewriteDatabase,
    options: &'a CompileOptions,
    /// The definition that is being compiled.
    root: Symbol,
    transparent: bool,
    /// A working copy of the signature, extended with the auxiliaries and
    /// their generated definitions as they are compiled.
    signature: Signature,
    /// Every `where` auxiliary of the definition, for reporting names that
    /// are used out of scope.
    aux_names: Vec<Symbol>,
    where_counts: FxHashMap<Symbol, usize>,
    with_count: usize,
    auxiliaries: Vec<CompiledFunction>,
    guards: Vec<RegistrationGuard<'a>>,
    warnings: Vec<CompileError>,
}

impl<'a> Compiler<'a> {
    fn checker(&self) -> Checker<'_> {
        Checker::new(Env::new(&self.signature))
    }

    fn function(&mut self, problem: FunctionProblem) -> Result<CompiledFunction, CompileError> {
        let FunctionProblem {
            name,
            range,
            r#type,
            arity,
            clauses,
            env,
        } = problem;
        debug!("compiling {} with {} clauses", name, clauses.len());

        if name != self.root {
            let guard = (self.db.claim(name))
                .map_err(|_| CompileError::AlreadyCompiling { range, name })?;
            self.guards.push(guard);
        }

        // Recursive calls are checked against the declared type
        self.signature.add_function(Function {
            name,
            r#type: r#type.clone(),
            body: None,
            transparent: false,
            elim: None,
        });

        let (context, goal) = split_fun_type(&r#type, arity);
        let definition = split::Definition {
            name,
            range,
            clauses: &clauses,
        };
        let mut used = vec![false; clauses.len()];
        let tree = self.split(
            &definition,
            split::Problem {
                args: context.args(),
                context: context.clone(),
                goal,
                env,
                rows: (0..clauses.len()).collect(),
            },
            &mut used,
        )?;

        for (clause, used) in Iterator::zip(clauses.iter(), used) {
            if !used {
                let error = CompileError::RedundantClause {
                    range: clause.range,
                };
                match self.options.allow_redundant {
                    true => self.warnings.push(error),
                    false => return Err(error),
                }
            }
        }

        let term = Term::fun_lits(&context, case_tree::synthesize(&tree));
        trace!("checking the case tree of {}", name);
        (self.checker().check(&Telescope::new(), &term, &r#type))
            .map_err(|error| CompileError::IllTypedCompilation {
                function: name,
                error,
            })?;
        self.signature.add_function(Function {
            name,
            r#type: r#type.clone(),
            body: Some(term.clone()),
            transparent: self.transparent,
            elim: None,
        });

        let equations = equations::generate(&self.signature, name, &tree)?;
        let elimination = elim::synthesize(&mut self.signature, name, &context, &tree)?;

        self.signature.add_function(Function {
            name,
            r#type: r#type.clone(),
            body: Some(term.clone()),
            transparent: self.transparent,
            elim: Some(elimination.name),
        });

        Ok(CompiledFunction {
            name,
            r#type,
            transparent: self.transparent,
            term,
            tree,
            equations,
            elimination,
            auxiliaries: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Register the equations and eliminators of a compiled definition and
    /// its auxiliaries, through the claims taken while compiling them.
    fn register(&self, compiled: &CompiledFunction) {
        for function in std::iter::once(compiled).chain(&compiled.auxiliaries) {
            let guard = self.guards.iter().find(|guard| guard.name() == function.name);
            if let Some(guard) = guard {
                guard.register(function.equations.iter().map(|eq| eq.rule.clone()).collect());
                guard.register_eliminator(function.elimination.eliminator(function.name));
            }
        }
    }
}

/// Split the first `arity` function types off a type, without reducing it.
fn split_fun_type(r#type: &ArcTerm, arity: usize) -> (Telescope, ArcTerm) {
    let mut telescope = Telescope::new();
    let mut r#type = r#type.clone();
    while telescope.len() < arity {
        let next = match r#type.as_ref() {
            Term::FunType(var, param_type, body_type) => {
                telescope.push(*var, param_type.clone());
                body_type.clone()
            }
            _ => break,
        };
        r#type = next;
    }
    (telescope, r#type)
}
