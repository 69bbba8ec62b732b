use std::cell::RefCell;

use fxhash::{FxHashMap, FxHashSet};
use pretty::RcDoc;

use crate::core::{ArcTerm, Branch, Telescope, Term};
use crate::symbol::{Symbol, Var};

/// Term precedences
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    Top = 0,
    Fun,
    App,
    Atomic,
}

const INDENT: isize = 4;
const WIDTH: usize = 80;

/// Pretty printer for core terms.
///
/// Local variables are compared by identity, so distinct variables can share
/// a name. The printer gives each variable it encounters a display name that
/// is unique within this context, adding a numeric suffix when needed.
pub struct Context {
    names: RefCell<FxHashMap<Var, String>>,
    used: RefCell<FxHashSet<String>>,
}

impl Context {
    pub fn new() -> Context {
        Context {
            names: RefCell::new(FxHashMap::default()),
            used: RefCell::new(FxHashSet::default()),
        }
    }

    /// Assign display names to the entries of a telescope, in order.
    pub fn bind_telescope(&self, telescope: &Telescope) {
        for var in telescope.vars() {
            self.var_name(var);
        }
    }

    fn var_name(&self, var: Var) -> String {
        if let Some(name) = self.names.borrow().get(&var) {
            return name.clone();
        }

        let symbol = var.name();
        let base = match symbol.is_underscore() {
            true => "x",
            false => symbol.resolve(),
        };
        let mut used = self.used.borrow_mut();
        let mut name = base.to_owned();
        let mut suffix = 1;
        while used.contains(&name) {
            suffix += 1;
            name = format!("{base}_{suffix}");
        }
        used.insert(name.clone());
        self.names.borrow_mut().insert(var, name.clone());
        name
    }

    fn symbol(&self, name: Symbol) -> RcDoc<'static> {
        RcDoc::text(name.resolve().to_owned())
    }

    fn var(&self, var: Var) -> RcDoc<'static> {
        RcDoc::text(self.var_name(var))
    }

    /// Render a term to a string, wrapped at the default width.
    pub fn render(&self, term: &ArcTerm) -> String {
        self.term(term).pretty(WIDTH).to_string()
    }

    /// Render each entry of a telescope as `x : A`.
    pub fn render_telescope(&self, telescope: &Telescope) -> Vec<String> {
        (telescope.iter())
            .map(|(var, r#type)| {
                let doc = RcDoc::concat([
                    self.var(*var),
                    RcDoc::space(),
                    RcDoc::text(":"),
                    RcDoc::space(),
                    self.term(r#type),
                ]);
                doc.pretty(WIDTH).to_string()
            })
            .collect()
    }

    pub fn term(&self, term: &ArcTerm) -> RcDoc<'static> {
        self.term_prec(Prec::Top, term)
    }

    pub fn term_prec(&self, prec: Prec, term: &ArcTerm) -> RcDoc<'static> {
        match term.as_ref() {
            Term::Universe => RcDoc::text("Type"),
            Term::LocalVar(var) => self.var(*var),
            Term::Global(name) => self.symbol(*name),
            Term::FunType(var, param_type, body_type) if !body_type.occurs(*var) => self.paren(
                prec > Prec::Fun,
                RcDoc::concat([
                    self.term_prec(Prec::App, param_type),
                    RcDoc::softline(),
                    RcDoc::text("->"),
                    RcDoc::softline(),
                    self.term_prec(Prec::Fun, body_type),
                ]),
            ),
            Term::FunType(var, param_type, body_type) => self.paren(
                prec > Prec::Fun,
                RcDoc::concat([
                    RcDoc::concat([self.param(*var, param_type), RcDoc::space(), RcDoc::text("->")])
                        .group(),
                    RcDoc::softline(),
                    self.term_prec(Prec::Fun, body_type),
                ]),
            ),
            Term::FunLit(var, param_type, body) => self.paren(
                prec > Prec::Fun,
                RcDoc::concat([
                    RcDoc::concat([
                        RcDoc::text("fun"),
                        RcDoc::space(),
                        self.param(*var, param_type),
                        RcDoc::space(),
                        RcDoc::text("=>"),
                    ])
                    .group(),
                    RcDoc::line().nest(INDENT),
                    self.term_prec(Prec::Fun, body).nest(INDENT),
                ])
                .group(),
            ),
            Term::FunApp(head, arg) => self.paren(
                prec > Prec::App,
                RcDoc::concat([
                    self.term_prec(Prec::App, head),
                    RcDoc::line().nest(INDENT),
                    self.term_prec(Prec::Atomic, arg).nest(INDENT),
                ])
                .group(),
            ),
            Term::Ann(term, r#type) => RcDoc::concat([
                RcDoc::text("("),
                self.term_prec(Prec::Fun, term),
                RcDoc::space(),
                RcDoc::text(":"),
                RcDoc::softline(),
                self.term_prec(Prec::Top, r#type),
                RcDoc::text(")"),
            ]),
            Term::Case(scrut, branches) => self.sequence(
                RcDoc::concat([
                    RcDoc::text("case"),
                    RcDoc::space(),
                    self.term_prec(Prec::Atomic, scrut),
                    RcDoc::space(),
                    RcDoc::text("{"),
                ]),
                branches.iter().map(|branch| self.branch(branch)).collect(),
                RcDoc::text(","),
                RcDoc::text("}"),
            ),
            Term::Absurd(scrut) => self.paren(
                prec > Prec::App,
                RcDoc::concat([
                    RcDoc::text("absurd"),
                    RcDoc::space(),
                    self.term_prec(Prec::Atomic, scrut),
                ]),
            ),
        }
    }

    fn param(&self, var: Var, r#type: &ArcTerm) -> RcDoc<'static> {
        RcDoc::concat([
            RcDoc::text("("),
            self.var(var),
            RcDoc::space(),
            RcDoc::text(":"),
            RcDoc::space(),
            self.term_prec(Prec::Top, r#type),
            RcDoc::text(")"),
        ])
    }

    fn branch(&self, branch: &Branch) -> RcDoc<'static> {
        let pattern = std::iter::once(self.symbol(branch.ctor))
            .chain(branch.fields.iter().map(|field| self.var(*field)));
        RcDoc::concat([
            RcDoc::intersperse(pattern, RcDoc::space()),
            RcDoc::space(),
            RcDoc::text("=>"),
            RcDoc::line().nest(INDENT),
            self.term_prec(Prec::Top, &branch.body).nest(INDENT),
        ])
        .group()
    }

    /// Wrap a document in parens.
    fn paren(&self, wrap: bool, doc: RcDoc<'static>) -> RcDoc<'static> {
        match wrap {
            true => RcDoc::concat([RcDoc::text("("), doc, RcDoc::text(")")]),
            false => doc,
        }
    }

    /// Pretty prints a delimited sequence of documents with a trailing
    /// separator if it is formatted over multiple lines.
    fn sequence(
        &self,
        start_delim: RcDoc<'static>,
        docs: Vec<RcDoc<'static>>,
        separator: RcDoc<'static>,
        end_delim: RcDoc<'static>,
    ) -> RcDoc<'static> {
        if docs.is_empty() {
            return RcDoc::concat([start_delim, RcDoc::space(), end_delim]);
        }
        RcDoc::concat([
            start_delim,
            RcDoc::concat(
                (docs.into_iter())
                    .map(|doc| RcDoc::concat([RcDoc::hardline(), doc, separator.clone()])),
            )
            .nest(INDENT),
            RcDoc::hardline(),
            end_delim,
        ])
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn arrows_and_dependent_functions() {
        let a = Var::fresh(Symbol::intern("A"));
        let r#type = Arc::new(Term::FunType(
            a,
            Term::universe(),
            Term::arrow(Term::var(a), Term::var(a)),
        ));
        assert_eq!(Context::new().render(&r#type), "(A : Type) -> A -> A");
    }

    #[test]
    fn applications_are_parenthesised() {
        let succ = Term::global(Symbol::intern("succ"));
        let term = Term::fun_app(succ.clone(), Term::fun_app(succ, Term::global(Symbol::intern("zero"))));
        assert_eq!(Context::new().render(&term), "succ (succ zero)");
    }

    #[test]
    fn shadowed_names_are_distinguished() {
        let x0 = Var::fresh(Symbol::intern("x"));
        let x1 = x0.refresh();
        let pp = Context::new();
        let term = Term::fun_apps(Term::global(Symbol::intern("f")), [Term::var(x0), Term::var(x1)]);
        assert_eq!(pp.render(&term), "f x x_2");
    }
}
