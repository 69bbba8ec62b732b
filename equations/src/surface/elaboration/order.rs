//! Determination of compilation order.
//!
//! Definitions may refer to each other in any order, and may be mutually
//! recursive. Their declared types are all added to the signature before any
//! clauses are compiled, so the only constraint is that a definition should
//! be compiled after the definitions it refers to, so that their equations
//! are available. Mutually recursive definitions are compiled together.
//!
//! The algorithm is as follows:
//!
//! 1. Traverse the terms within each definition and note references to other
//!    definitions.
//!    *  Names in scope are tracked so that when a local name shadows a
//!       definition we know not to add a dependency on it.
//! 2. Group the definitions into strongly connected components with a
//!    depth-first traversal, which produces every component after the
//!    components it depends on.
//! 3. Assign each component a level one greater than the highest level of
//!    the components it depends on. Definitions on the same level do not
//!    depend on each other, except within a cycle.

use fxhash::FxHashMap;
use log::debug;

use crate::surface::{Clause, Definition, Param, Pattern, Rhs, Term};
use crate::symbol::Symbol;

/// Group the definitions into levels, where each definition only depends on
/// definitions in earlier levels or on its own level through a cycle.
pub fn compilation_levels(definitions: &[&Definition]) -> Vec<Vec<usize>> {
    let names: FxHashMap<Symbol, usize> = (definitions.iter().enumerate())
        .map(|(index, definition)| (definition.name.1, index))
        .collect();
    let dependencies: Vec<Vec<usize>> = (definitions.iter())
        .map(|definition| definition_dependencies(definition, &names))
        .collect();

    let mut context = OrderContext::new(&dependencies);
    for index in 0..definitions.len() {
        if context.indices[index].is_none() {
            context.visit(index);
        }
    }

    let mut component_levels = Vec::with_capacity(context.components.len());
    let mut levels: Vec<Vec<usize>> = Vec::new();
    for (component_index, component) in context.components.iter().enumerate() {
        let level = (component.iter())
            .flat_map(|index| &dependencies[*index])
            .map(|dep| context.component_of[*dep])
            .filter(|dep_component| *dep_component != component_index)
            .map(|dep_component| component_levels[dep_component] + 1)
            .max()
            .unwrap_or(0);
        component_levels.push(level);

        if component.len() > 1 {
            debug!(
                "mutually recursive: {}",
                itertools::Itertools::format(
                    component.iter().map(|index| definitions[*index].name.1),
                    ", "
                ),
            );
        }

        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].extend(component.iter().copied());
    }

    for level in &mut levels {
        level.sort_unstable();
    }
    levels
}

struct OrderContext<'a> {
    dependencies: &'a [Vec<usize>],
    next_index: usize,
    indices: Vec<Option<usize>>,
    low_links: Vec<usize>,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
    components: Vec<Vec<usize>>,
    component_of: Vec<usize>,
}

impl<'a> OrderContext<'a> {
    fn new(dependencies: &'a [Vec<usize>]) -> OrderContext<'a> {
        let len = dependencies.len();
        OrderContext {
            dependencies,
            next_index: 0,
            indices: vec![None; len],
            low_links: vec![0; len],
            stack: Vec::new(),
            on_stack: vec![false; len],
            components: Vec::new(),
            component_of: vec![0; len],
        }
    }

    fn visit(&mut self, index: usize) {
        self.indices[index] = Some(self.next_index);
        self.low_links[index] = self.next_index;
        self.next_index += 1;
        self.stack.push(index);
        self.on_stack[index] = true;

        for dep in self.dependencies[index].iter().copied() {
            match self.indices[dep] {
                None => {
                    self.visit(dep);
                    self.low_links[index] = self.low_links[index].min(self.low_links[dep]);
                }
                Some(dep_index) if self.on_stack[dep] => {
                    self.low_links[index] = self.low_links[index].min(dep_index);
                }
                Some(_) => {}
            }
        }

        if Some(self.low_links[index]) == self.indices[index] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                self.component_of[member] = self.components.len();
                component.push(member);
                if member == index {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

fn definition_dependencies(definition: &Definition, names: &FxHashMap<Symbol, usize>) -> Vec<usize> {
    let mut deps = Vec::new();
    let mut local_names = Vec::new();
    push_definition_deps(definition, names, &mut local_names, &mut deps);
    deps.sort_unstable();
    deps.dedup();
    deps
}

fn push_definition_deps(
    definition: &Definition,
    names: &FxHashMap<Symbol, usize>,
    local_names: &mut Vec<Symbol>,
    deps: &mut Vec<usize>,
) {
    let initial_local_names_len = local_names.len();
    push_param_deps(&definition.params, names, local_names, deps);
    term_deps(&definition.r#type, names, local_names, deps);
    local_names.truncate(initial_local_names_len);
    clause_deps(&definition.clauses, names, local_names, deps);
}

fn clause_deps(
    clauses: &[Clause],
    names: &FxHashMap<Symbol, usize>,
    local_names: &mut Vec<Symbol>,
    deps: &mut Vec<usize>,
) {
    for clause in clauses {
        let initial_local_names_len = local_names.len();
        for pattern in &clause.patterns {
            push_pattern(pattern, names, local_names, deps);
        }
        // Auxiliaries are in scope in the whole clause, including each other
        (local_names).extend(clause.where_block.iter().map(|definition| definition.name.1));
        for definition in &clause.where_block {
            push_definition_deps(definition, names, local_names, deps);
        }
        match &clause.rhs {
            Rhs::Term(term) => term_deps(term, names, local_names, deps),
            Rhs::With {
                scrut,
                equation,
                clauses,
            } => {
                term_deps(scrut, names, local_names, deps);
                local_names.extend(equation.iter().map(|(_, name)| *name));
                clause_deps(clauses, names, local_names, deps);
            }
            Rhs::Absurd(_) => {}
        }
        local_names.truncate(initial_local_names_len);
    }
}

fn term_deps(
    term: &Term,
    names: &FxHashMap<Symbol, usize>,
    local_names: &mut Vec<Symbol>,
    deps: &mut Vec<usize>,
) {
    match term {
        Term::Name(_, name) => {
            if local_names.iter().rev().any(|local| name == local) {
                // local binding, do nothing
            } else if let Some(index) = names.get(name) {
                deps.push(*index);
            }
        }
        Term::Universe(_) => {}
        Term::Ann(_, term, r#type) => {
            term_deps(term, names, local_names, deps);
            term_deps(r#type, names, local_names, deps);
        }
        Term::Arrow(_, param_type, body_type) => {
            term_deps(param_type, names, local_names, deps);
            term_deps(body_type, names, local_names, deps);
        }
        Term::FunType(_, params, body) | Term::FunLiteral(_, params, body) => {
            let initial_local_names_len = local_names.len();
            push_param_deps(params, names, local_names, deps);
            term_deps(body, names, local_names, deps);
            local_names.truncate(initial_local_names_len);
        }
        Term::FunElim(_, head, arg) => {
            term_deps(head, names, local_names, deps);
            term_deps(arg, names, local_names, deps);
        }
    }
}

fn push_param_deps(
    params: &[Param],
    names: &FxHashMap<Symbol, usize>,
    local_names: &mut Vec<Symbol>,
    deps: &mut Vec<usize>,
) {
    for param in params {
        term_deps(&param.r#type, names, local_names, deps);
        local_names.extend(param.names.iter().map(|(_, name)| *name));
    }
}

fn push_pattern(
    pattern: &Pattern,
    names: &FxHashMap<Symbol, usize>,
    local_names: &mut Vec<Symbol>,
    deps: &mut Vec<usize>,
) {
    match pattern {
        Pattern::Name(_, name) => local_names.push(*name),
        Pattern::Placeholder(_) => {}
        Pattern::Ctor(_, _, patterns) | Pattern::List(_, patterns) => {
            for pattern in patterns {
                push_pattern(pattern, names, local_names, deps);
            }
        }
        Pattern::Inaccessible(_, term) => term_deps(term, names, local_names, deps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;
    use crate::surface::{Item, Module};

    fn levels(source: &str) -> Vec<Vec<Symbol>> {
        let (module, messages) = Module::parse(FileId::try_from(1).unwrap(), source);
        assert!(messages.is_empty(), "{messages:?}");
        let definitions: Vec<_> = (module.items.iter())
            .filter_map(|item| match item {
                Item::Definition(definition) => Some(definition),
                _ => None,
            })
            .collect();
        (compilation_levels(&definitions).into_iter())
            .map(|level| level.into_iter().map(|index| definitions[index].name.1).collect())
            .collect()
    }

    #[test]
    fn dependencies_come_first() {
        let levels = levels(
            "
            def b (n : Nat) : Nat { | n => a n }
            def a (n : Nat) : Nat { | n => n }
            def c (n : Nat) : Nat { | n => b (a n) }
            ",
        );
        let name = Symbol::intern;
        assert_eq!(levels, vec![vec![name("a")], vec![name("b")], vec![name("c")]]);
    }

    #[test]
    fn cycles_share_a_level() {
        let levels = levels(
            "
            def even (n : Nat) : Bool { | zero => true | succ n => odd n }
            def odd (n : Nat) : Bool { | zero => false | succ n => even n }
            def id (n : Nat) : Nat { | n => n }
            ",
        );
        let name = Symbol::intern;
        assert_eq!(levels, vec![vec![name("even"), name("odd"), name("id")]]);
    }

    #[test]
    fn locals_shadow_definitions() {
        let levels = levels(
            "
            def a (n : Nat) : Nat { | n => n }
            def b (a : Nat) : Nat { | a => a }
            ",
        );
        assert_eq!(levels.len(), 1);
    }
}
