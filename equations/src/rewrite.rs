//! The rewrite collection.
//!
//! Every compiled function registers its equations here, under its own name,
//! along with the elimination principle derived from its clauses. Tactics
//! look them up by name. The database is shared between threads: functions
//! compiled in parallel claim their name first, so that two compilations of
//! the same function can never register conflicting rules.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use fxhash::{FxHashMap, FxHashSet};
use log::{debug, info};
use once_cell::sync::Lazy;

use crate::compile::elim::Hypothesis;
use crate::core::{ArcTerm, Telescope};
use crate::symbol::Symbol;

/// An oriented equation `lhs = rhs : r#type`, where `lhs` and `rhs` may
/// refer to the variables of `context`.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    /// The global that proves the equation.
    pub name: Symbol,
    pub context: Telescope,
    pub r#type: ArcTerm,
    pub lhs: ArcTerm,
    pub rhs: ArcTerm,
}

/// What tactics need to know about an elimination principle.
#[derive(Debug, Clone)]
pub struct Eliminator {
    /// The global that proves the principle.
    pub name: Symbol,
    /// The function the principle was derived from.
    pub function: Symbol,
    pub arity: usize,
    /// The hypotheses, in the order they are taken.
    pub hypotheses: Vec<Hypothesis>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    AlreadyClaimed(Symbol),
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::AlreadyClaimed(name) => write!(f, "`{name}` is already being registered"),
        }
    }
}

impl std::error::Error for ClaimError {}

#[derive(Default)]
pub struct RewriteDatabase {
    rules: RwLock<FxHashMap<Symbol, Vec<Arc<RewriteRule>>>>,
    eliminators: RwLock<FxHashMap<Symbol, Arc<Eliminator>>>,
    claims: Mutex<FxHashSet<Symbol>>,
}

static GLOBAL: Lazy<RewriteDatabase> = Lazy::new(RewriteDatabase::new);

impl RewriteDatabase {
    pub fn new() -> RewriteDatabase {
        RewriteDatabase::default()
    }

    /// The process-wide database.
    pub fn global() -> &'static RewriteDatabase {
        &GLOBAL
    }

    /// Take exclusive ownership of `name` for registration. The claim is
    /// released when the guard is dropped.
    pub fn claim(&self, name: Symbol) -> Result<RegistrationGuard<'_>, ClaimError> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        match claims.insert(name) {
            true => Ok(RegistrationGuard { db: self, name }),
            false => Err(ClaimError::AlreadyClaimed(name)),
        }
    }

    /// Append a trusted rule to the collection of `name`, without claiming
    /// it.
    pub fn extend(&self, name: Symbol, rule: RewriteRule) {
        debug!("extending {} with {}", name, rule.name);
        self.push_rules(name, std::iter::once(rule));
    }

    fn push_rules(&self, name: Symbol, rules: impl IntoIterator<Item = RewriteRule>) {
        let mut collections = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        (collections.entry(name).or_default()).extend(rules.into_iter().map(Arc::new));
    }

    /// A snapshot of the rules registered under any of `names`, in
    /// registration order.
    pub fn rules(&self, names: &[Symbol]) -> Vec<Arc<RewriteRule>> {
        let collections = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        (names.iter())
            .filter_map(|name| collections.get(name))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn eliminator(&self, function: Symbol) -> Option<Arc<Eliminator>> {
        let eliminators = self.eliminators.read().unwrap_or_else(PoisonError::into_inner);
        eliminators.get(&function).cloned()
    }
}

/// Exclusive permission to register rules for one name.
pub struct RegistrationGuard<'db> {
    db: &'db RewriteDatabase,
    name: Symbol,
}

impl<'db> RegistrationGuard<'db> {
    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn register(&self, rules: Vec<RewriteRule>) {
        info!("registering {} equations for {}", rules.len(), self.name);
        self.db.push_rules(self.name, rules);
    }

    pub fn register_eliminator(&self, eliminator: Eliminator) {
        debug!("registering eliminator {} for {}", eliminator.name, self.name);
        let mut eliminators = self.db.eliminators.write().unwrap_or_else(PoisonError::into_inner);
        eliminators.insert(self.name, Arc::new(eliminator));
    }
}

impl<'db> Drop for RegistrationGuard<'db> {
    fn drop(&mut self) {
        let mut claims = self.db.claims.lock().unwrap_or_else(PoisonError::into_inner);
        claims.remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Term;

    fn rule(name: &str) -> RewriteRule {
        RewriteRule {
            name: Symbol::intern(name),
            context: Telescope::new(),
            r#type: Term::universe(),
            lhs: Term::universe(),
            rhs: Term::universe(),
        }
    }

    #[test]
    fn claims_are_exclusive() {
        let db = RewriteDatabase::new();
        let name = Symbol::intern("f");
        let guard = db.claim(name).unwrap();
        assert_eq!(db.claim(name).err(), Some(ClaimError::AlreadyClaimed(name)));
        drop(guard);
        assert!(db.claim(name).is_ok());
    }

    #[test]
    fn registration_appends() {
        let db = RewriteDatabase::new();
        let name = Symbol::intern("f");
        {
            let guard = db.claim(name).unwrap();
            guard.register(vec![rule("f.equation_1")]);
        }
        db.extend(name, rule("f_extra"));
        let rules = db.rules(&[name]);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, Symbol::intern("f.equation_1"));
        assert_eq!(rules[1].name, Symbol::intern("f_extra"));
        assert!(db.rules(&[Symbol::intern("g")]).is_empty());
    }

    #[test]
    fn concurrent_claims() {
        let db = RewriteDatabase::new();
        let name = Symbol::intern("shared");
        let claimed = std::sync::atomic::AtomicUsize::new(0);
        let guard = db.claim(name).unwrap();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    if db.claim(name).is_ok() {
                        claimed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });
        drop(guard);
        assert_eq!(claimed.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
