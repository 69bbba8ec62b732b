//! Elaboration of surface modules into the core language.
//!
//! Inductive families, axioms, rewrite rules and the declared types of
//! definitions are elaborated in the order they appear. The clauses of
//! definitions are then compiled in dependency order, with each level of the
//! dependency graph compiled in parallel against a snapshot of the signature.

use fxhash::FxHashMap;
use log::{debug, info};
use rayon::prelude::*;

use crate::compile::{self, CompileOptions, CompiledFunction, Declaration};
use crate::core::semantics::Env;
use crate::core::signature::{Constructor, Function, Inductive, Signature};
use crate::core::typing::Checker;
use crate::core::{ArcTerm, Telescope, Term};
use crate::rewrite::{RewriteDatabase, RewriteRule};
use crate::source::ByteRange;
use crate::surface::{self, Definition, Item, Module, Param};
use crate::symbol::{Symbol, Var};

mod order;
pub mod reporting;

pub use self::reporting::Message;

/// Errors encountered while resolving names.
#[derive(Debug, Clone)]
pub enum ScopeError {
    UnboundName {
        range: ByteRange,
        name: Symbol,
        suggestion: Option<Symbol>,
    },
    /// The name of a `where` auxiliary was used outside of the clause that
    /// defines it.
    UnboundAuxiliary { range: ByteRange, name: Symbol },
}

/// Name resolution for surface terms.
///
/// Local names are bound to core terms rather than variables: pattern
/// variables stand for the part of a function's arguments they matched, and
/// `where` auxiliaries stand for an application of their lifted definition to
/// the enclosing context.
pub struct Scope<'a> {
    signature: &'a Signature,
    auxiliaries: &'a [Symbol],
    locals: Vec<(Symbol, ArcTerm)>,
}

impl<'a> Scope<'a> {
    pub fn new(signature: &'a Signature) -> Scope<'a> {
        Scope {
            signature,
            auxiliaries: &[],
            locals: Vec::new(),
        }
    }

    /// Names of auxiliaries that should be reported as out of scope rather
    /// than as unknown.
    pub fn with_auxiliaries(mut self, auxiliaries: &'a [Symbol]) -> Scope<'a> {
        self.auxiliaries = auxiliaries;
        self
    }

    pub fn with_locals(mut self, locals: impl IntoIterator<Item = (Symbol, ArcTerm)>) -> Scope<'a> {
        self.locals.extend(locals);
        self
    }

    pub fn push_local(&mut self, name: Symbol, term: ArcTerm) {
        self.locals.push((name, term));
    }

    pub fn into_locals(self) -> Vec<(Symbol, ArcTerm)> {
        self.locals
    }

    fn lookup(&self, name: Symbol) -> Option<ArcTerm> {
        let local = self.locals.iter().rev().find(|(local, _)| *local == name);
        match local {
            Some((_, term)) => Some(term.clone()),
            None if self.signature.contains(name) => Some(Term::global(name)),
            None => None,
        }
    }

    fn suggest(&self, name: Symbol) -> Option<Symbol> {
        let name = name.resolve();
        let max_distance = usize::max(2, name.len() / 3);
        (self.locals.iter().map(|(local, _)| *local))
            .chain(self.signature.names())
            .filter(|candidate| !candidate.resolve().contains('.'))
            .map(|candidate| (levenshtein::levenshtein(name, candidate.resolve()), candidate))
            .filter(|(distance, _)| *distance <= max_distance)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate)
    }

    /// Elaborate a group of parameters, binding their names in the scope.
    pub fn params(&mut self, params: &[Param]) -> Result<Telescope, ScopeError> {
        let mut telescope = Telescope::new();
        for param in params {
            let r#type = self.term(&param.r#type)?;
            for (_, name) in &param.names {
                let var = Var::fresh(*name);
                telescope.push(var, r#type.clone());
                self.push_local(*name, Term::var(var));
            }
        }
        Ok(telescope)
    }

    pub fn term(&mut self, term: &surface::Term) -> Result<ArcTerm, ScopeError> {
        match term {
            surface::Term::Name(range, name) => match self.lookup(*name) {
                Some(term) => Ok(term),
                None if self.auxiliaries.contains(name) => Err(ScopeError::UnboundAuxiliary {
                    range: *range,
                    name: *name,
                }),
                None => Err(ScopeError::UnboundName {
                    range: *range,
                    name: *name,
                    suggestion: self.suggest(*name),
                }),
            },
            surface::Term::Universe(_) => Ok(Term::universe()),
            surface::Term::Ann(_, term, r#type) => {
                let term = self.term(term)?;
                let r#type = self.term(r#type)?;
                Ok(std::sync::Arc::new(Term::Ann(term, r#type)))
            }
            surface::Term::Arrow(_, param_type, body_type) => {
                let param_type = self.term(param_type)?;
                let body_type = self.term(body_type)?;
                Ok(Term::arrow(param_type, body_type))
            }
            surface::Term::FunType(_, params, body_type) => {
                let initial_len = self.locals.len();
                let telescope = self.params(params);
                let body_type = telescope.and_then(|telescope| {
                    let body_type = self.term(body_type)?;
                    Ok(Term::fun_types(&telescope, body_type))
                });
                self.locals.truncate(initial_len);
                body_type
            }
            surface::Term::FunLiteral(_, params, body) => {
                let initial_len = self.locals.len();
                let telescope = self.params(params);
                let body = telescope.and_then(|telescope| {
                    let body = self.term(body)?;
                    Ok(Term::fun_lits(&telescope, body))
                });
                self.locals.truncate(initial_len);
                body
            }
            surface::Term::FunElim(_, head, arg) => {
                let head = self.term(head)?;
                let arg = self.term(arg)?;
                Ok(Term::fun_app(head, arg))
            }
        }
    }
}

/// The result of elaborating a module.
pub struct Elaboration {
    pub signature: Signature,
    /// Successfully compiled definitions, in the order they were compiled.
    pub functions: Vec<CompiledFunction>,
    pub messages: Vec<Message>,
}

/// Elaborate a module, registering the equations and elimination principles
/// of its definitions in `db`.
///
/// Definitions that fail to compile are reported and remain in the signature
/// as opaque constants, so that the rest of the module can still be checked.
pub fn elaborate_module(db: &RewriteDatabase, module: &Module, options: &CompileOptions) -> Elaboration {
    let mut context = Context::new(db, options);
    let mut declarations = Vec::new();

    for item in &module.items {
        let result = match item {
            Item::Inductive(inductive) => context.inductive(inductive),
            Item::Axiom { name, r#type, .. } => context.axiom(*name, r#type),
            Item::Rewrite { range, name, r#type } => context.rewrite(*range, *name, r#type),
            Item::ListNotation { range, nil, cons } => context.list_notation(*range, *nil, *cons),
            Item::Definition(definition) => context
                .declare(definition)
                .map(|r#type| declarations.push((definition, r#type))),
        };
        if let Err(message) = result {
            context.messages.push(message);
        }
    }

    let functions = context.compile_definitions(&declarations);

    Elaboration {
        signature: context.signature,
        functions,
        messages: context.messages,
    }
}

struct Context<'a> {
    db: &'a RewriteDatabase,
    options: &'a CompileOptions,
    signature: Signature,
    item_ranges: FxHashMap<Symbol, ByteRange>,
    messages: Vec<Message>,
}

impl<'a> Context<'a> {
    fn new(db: &'a RewriteDatabase, options: &'a CompileOptions) -> Context<'a> {
        Context {
            db,
            options,
            signature: Signature::prelude(),
            item_ranges: FxHashMap::default(),
            messages: Vec::new(),
        }
    }

    fn checker(&self) -> Checker<'_> {
        Checker::new(Env::new(&self.signature))
    }

    fn check_type(&self, range: ByteRange, r#type: &ArcTerm) -> Result<(), Message> {
        (self.checker().check_type(&Telescope::new(), r#type))
            .map_err(|error| Message::TypeError { range, error })
    }

    /// Claim a global name for a new item.
    fn define(&mut self, (range, name): (ByteRange, Symbol)) -> Result<(), Message> {
        if self.signature.contains(name) || self.item_ranges.contains_key(&name) {
            return Err(Message::DuplicateDefinition {
                range,
                name,
                previous: self.item_ranges.get(&name).copied(),
            });
        }
        self.item_ranges.insert(name, range);
        Ok(())
    }

    fn inductive(&mut self, item: &surface::Inductive) -> Result<(), Message> {
        let (params, r#type, locals) = {
            let mut scope = Scope::new(&self.signature);
            let params = scope.params(&item.params)?;
            let r#type = scope.term(&item.r#type)?;
            (params, r#type, scope.into_locals())
        };

        let full_type = Term::fun_types(&params, r#type.clone());
        self.check_type(item.r#type.range(), &full_type)?;
        let (indices, sort) = Env::new(&self.signature).fun_type_telescope(&r#type);
        if !matches!(sort.as_ref(), Term::Universe) {
            return Err(Message::InvalidInductiveType {
                range: item.r#type.range(),
                name: item.name.1,
            });
        }

        let name = item.name.1;
        self.define(item.name)?;
        let mut inductive = Inductive {
            name,
            params: params.clone(),
            r#type: full_type,
            ctors: Vec::new(),
        };
        // Constructors may refer to the family they belong to
        self.signature.add_inductive(inductive.clone(), Vec::new());

        let mut ctors = Vec::new();
        for (ctor_name, ctor_type) in &item.ctors {
            let result = self.constructor(&inductive, indices.len(), &locals, *ctor_name, ctor_type);
            match result {
                Ok(ctor) => ctors.push(ctor),
                Err(message) => self.messages.push(message),
            }
        }

        inductive.ctors = ctors.iter().map(|ctor| ctor.name).collect();
        debug!("inductive {} with {} constructors", name, ctors.len());
        self.signature.add_inductive(inductive, ctors);
        Ok(())
    }

    fn constructor(
        &mut self,
        inductive: &Inductive,
        num_indices: usize,
        locals: &[(Symbol, ArcTerm)],
        ctor_name: (ByteRange, Symbol),
        ctor_type: &surface::Term,
    ) -> Result<Constructor, Message> {
        let r#type = Scope::new(&self.signature)
            .with_locals(locals.iter().cloned())
            .term(ctor_type)?;
        let full_type = Term::fun_types(&inductive.params, r#type.clone());
        self.check_type(ctor_type.range(), &full_type)?;

        let env = Env::new(&self.signature);
        let (fields, target) = env.fun_type_telescope(&r#type);
        let is_valid = match Term::global_spine(&target) {
            Some((head, args)) => {
                head == inductive.name
                    && args.len() == inductive.params.len() + num_indices
                    && Iterator::zip(args.iter(), inductive.params.vars())
                        .all(|(arg, param)| arg.as_var() == Some(param))
            }
            None => false,
        };
        if !is_valid {
            return Err(Message::InvalidConstructorType {
                range: ctor_type.range(),
                ctor: ctor_name.1,
                inductive: inductive.name,
            });
        }

        self.define(ctor_name)?;
        Ok(Constructor {
            name: ctor_name.1,
            inductive: inductive.name,
            num_params: inductive.params.len(),
            num_fields: fields.len(),
            r#type: full_type,
        })
    }

    fn axiom(&mut self, name: (ByteRange, Symbol), r#type: &surface::Term) -> Result<(), Message> {
        let core_type = Scope::new(&self.signature).term(r#type)?;
        self.check_type(r#type.range(), &core_type)?;
        self.define(name)?;
        self.signature.add_axiom(name.1, core_type);
        Ok(())
    }

    /// Trusted rewrite rules of the form `Π Δ. Eq A (f ps) rhs`.
    fn rewrite(
        &mut self,
        range: ByteRange,
        name: (ByteRange, Symbol),
        r#type: &surface::Term,
    ) -> Result<(), Message> {
        let core_type = Scope::new(&self.signature).term(r#type)?;
        self.check_type(r#type.range(), &core_type)?;

        let (context, body) = Telescope::from_fun_type(&core_type);
        let rule = match Term::global_spine(&body) {
            Some((head, args)) if head == crate::core::signature::eq_name() && args.len() == 3 => {
                match Term::global_spine(&args[1]) {
                    Some((function, _)) if self.signature.function(function).is_some() => Some((
                        function,
                        RewriteRule {
                            name: name.1,
                            context,
                            r#type: args[0].clone(),
                            lhs: args[1].clone(),
                            rhs: args[2].clone(),
                        },
                    )),
                    _ => None,
                }
            }
            _ => None,
        };
        let (function, rule) = rule.ok_or(Message::InvalidRewriteRule { range, name: name.1 })?;

        self.define(name)?;
        self.signature.add_axiom(name.1, core_type);
        info!("trusted rewrite rule {} for {}", name.1, function);
        self.db.extend(function, rule);
        Ok(())
    }

    fn list_notation(
        &mut self,
        range: ByteRange,
        (_, nil): (ByteRange, Symbol),
        (_, cons): (ByteRange, Symbol),
    ) -> Result<(), Message> {
        let is_valid = match (self.signature.constructor(nil), self.signature.constructor(cons)) {
            (Some(nil), Some(cons)) => {
                nil.inductive == cons.inductive && nil.num_fields == 0 && cons.num_fields == 2
            }
            (_, _) => false,
        };
        match is_valid {
            true => {
                self.signature.set_list_notation(nil, cons);
                Ok(())
            }
            false => Err(Message::InvalidListNotation { range }),
        }
    }

    /// Elaborate the declared type of a definition, adding it to the
    /// signature without a body.
    fn declare(&mut self, definition: &Definition) -> Result<ArcTerm, Message> {
        let r#type = {
            let mut scope = Scope::new(&self.signature);
            let params = scope.params(&definition.params)?;
            let body_type = scope.term(&definition.r#type)?;
            Term::fun_types(&params, body_type)
        };
        self.check_type(definition.r#type.range(), &r#type)?;
        self.define(definition.name)?;
        self.signature.add_function(Function {
            name: definition.name.1,
            r#type: r#type.clone(),
            body: None,
            transparent: definition.transparent,
            elim: None,
        });
        Ok(r#type)
    }

    fn compile_definitions(&mut self, declarations: &[(&Definition, ArcTerm)]) -> Vec<CompiledFunction> {
        let definitions: Vec<_> = declarations.iter().map(|(definition, _)| *definition).collect();
        let levels = order::compilation_levels(&definitions);

        let db = self.db;
        let options = self.options;
        let mut functions = Vec::new();

        for (depth, level) in levels.iter().enumerate() {
            debug!(
                "compiling level {depth}: {}",
                itertools::Itertools::format(level.iter().map(|index| definitions[*index].name.1), ", "),
            );

            let snapshot = self.signature.clone();
            let results: Vec<_> = (level.par_iter())
                .map(|index| {
                    let (definition, r#type) = &declarations[*index];
                    let declaration = Declaration {
                        name: definition.name.1,
                        range: definition.range,
                        r#type: r#type.clone(),
                        transparent: definition.transparent,
                        clauses: &definition.clauses,
                    };
                    compile::compile(db, &snapshot, &declaration, options)
                })
                .collect();

            for result in results {
                match result {
                    Ok(compiled) => {
                        info!(
                            "compiled {} ({} equations, {} auxiliaries)",
                            compiled.name,
                            compiled.equations.len(),
                            compiled.auxiliaries.len(),
                        );
                        compiled.commit(&mut self.signature);
                        (self.messages)
                            .extend(compiled.warnings.iter().cloned().map(Message::CompileWarning));
                        functions.push(compiled);
                    }
                    Err(error) => self.messages.push(Message::Compile(error)),
                }
            }
        }

        functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;

    fn elaborate(source: &str) -> Elaboration {
        let file_id = FileId::try_from(1).unwrap();
        let (module, messages) = Module::parse(file_id, source);
        assert!(messages.is_empty(), "{messages:?}");
        elaborate_module(&RewriteDatabase::new(), &module, &CompileOptions::default())
    }

    #[test]
    fn inductive_families() {
        let elaboration = elaborate(
            "
            inductive Nat : Type { zero : Nat, succ : Nat -> Nat }
            inductive Vec (A : Type) : Nat -> Type {
              vnil : Vec A zero,
              vcons : (n : Nat) -> A -> Vec A n -> Vec A (succ n),
            }
            ",
        );
        assert!(elaboration.messages.is_empty(), "{:?}", elaboration.messages);
        let vcons = elaboration.signature.constructor(Symbol::intern("vcons")).unwrap();
        assert_eq!(vcons.num_params, 1);
        assert_eq!(vcons.num_fields, 3);
    }

    #[test]
    fn constructors_must_target_their_family() {
        let elaboration = elaborate(
            "
            inductive Nat : Type { zero : Nat }
            inductive Bad : Type { oops : Nat }
            ",
        );
        assert!(matches!(
            elaboration.messages[..],
            [Message::InvalidConstructorType { .. }]
        ));
    }

    #[test]
    fn unbound_names_have_suggestions() {
        let elaboration = elaborate(
            "
            inductive Nat : Type { zero : Nat }
            axiom one : Nta;
            ",
        );
        match &elaboration.messages[..] {
            [Message::UnboundName { suggestion, .. }] => {
                assert_eq!(*suggestion, Some(Symbol::intern("Nat")));
            }
            messages => panic!("unexpected messages: {messages:?}"),
        }
    }

    #[test]
    fn duplicate_definitions() {
        let elaboration = elaborate(
            "
            axiom A : Type;
            axiom A : Type;
            ",
        );
        assert!(matches!(
            elaboration.messages[..],
            [Message::DuplicateDefinition { previous: Some(_), .. }]
        ));
    }

    #[test]
    fn mutually_recursive_definitions() {
        let elaboration = elaborate(
            "
            inductive Nat : Type { zero : Nat, succ : Nat -> Nat }
            inductive Bool : Type { true : Bool, false : Bool }

            def even (n : Nat) : Bool {
              | zero => true
              | succ n => odd n
            }

            def odd (n : Nat) : Bool {
              | zero => false
              | succ n => even n
            }
            ",
        );
        assert!(elaboration.messages.is_empty(), "{:?}", elaboration.messages);
        assert_eq!(elaboration.functions.len(), 2);
        assert!(elaboration.signature.function(Symbol::intern("even.elim")).is_some());
    }
}
