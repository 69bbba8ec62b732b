use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use once_cell::sync::Lazy;

struct StringInterner {
    strings: lasso::ThreadedRodeo,
    alphabetic_names: Vec<Symbol>,
}

static INTERNER: Lazy<RwLock<StringInterner>> = Lazy::new(|| {
    RwLock::new(StringInterner {
        strings: lasso::ThreadedRodeo::new(),
        alphabetic_names: Vec::new(),
    })
});

impl StringInterner {
    /// Allocate and intern all alphabetic names up-to and including `max_index`
    /// if they are not already present.
    fn reserve_alphabetic_names(&mut self, max_index: usize) {
        let strings = &self.strings;
        let names = &mut self.alphabetic_names;
        names.extend(
            (names.len()..=max_index).map(|index| Symbol(strings.get_or_intern(alphabetic_name(index)))),
        );
    }

    fn get_alphabetic_name(&mut self, index: usize) -> Symbol {
        self.reserve_alphabetic_names(index);
        self.alphabetic_names[index]
    }
}

fn alphabetic_name(index: usize) -> String {
    let base = index / 26;
    let letter = index % 26;
    let letter = (letter as u8 + b'a') as char;
    if base == 0 {
        format!("{letter}")
    } else {
        format!("{letter}{base}")
    }
}

/// Interned strings, shared between threads.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(lasso::Spur);

impl Symbol {
    pub fn intern(sym: impl AsRef<str>) -> Self {
        let interner = INTERNER.read().unwrap_or_else(|error| error.into_inner());
        Self(interner.strings.get_or_intern(sym))
    }

    pub fn intern_static(sym: &'static str) -> Self {
        let interner = INTERNER.read().unwrap_or_else(|error| error.into_inner());
        Self(interner.strings.get_or_intern_static(sym))
    }

    pub fn resolve<'a>(&'a self) -> &'a str {
        let interner = INTERNER.read().unwrap_or_else(|error| error.into_inner());
        let symbol = interner.strings.resolve(&self.0);

        // SAFETY: The lifetime is a bit of a lie: it is really tied to the lifetime of
        // `INTERNER`. But `INTERNER` is never dropped (since it is static), and
        // `ThreadedRodeo` never moves the strings it has allocated, so it is safe
        // to truncate the lifetime to the shorter lifetime of `'a`.
        unsafe { std::mem::transmute::<&str, &'a str>(symbol) }
    }

    /// Retrieve an alphabetic name based on a numeric count. This is useful for
    /// producing human-readable names for unnamed binders.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use equations::symbol::Symbol;
    ///
    /// assert_eq!(Symbol::get_alphabetic_name(0), Symbol::intern("a"));
    /// assert_eq!(Symbol::get_alphabetic_name(25), Symbol::intern("z"));
    /// assert_eq!(Symbol::get_alphabetic_name(26), Symbol::intern("a1"));
    /// ```
    pub fn get_alphabetic_name(index: usize) -> Symbol {
        let mut interner = INTERNER.write().unwrap_or_else(|error| error.into_inner());
        interner.get_alphabetic_name(index)
    }

    /// Append a dotted suffix, as used for the names of generated definitions
    /// such as `length.equation_1` or `filter.with1`.
    pub fn qualify(self, suffix: impl fmt::Display) -> Symbol {
        Symbol::intern(format!("{}.{suffix}", self.resolve()))
    }

    /// The placeholder name given to anonymous binders.
    pub fn underscore() -> Symbol {
        Symbol::intern_static("_")
    }

    pub fn is_underscore(self) -> bool {
        self == Symbol::underscore()
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.resolve()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolve())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resolve())
    }
}

static NEXT_VAR_ID: AtomicU32 = AtomicU32::new(0);

/// Local variables.
///
/// Every binder in the core language introduces a variable with a fresh `id`,
/// so variables are compared by identity and never by name. The name is only
/// kept for printing.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    name: Symbol,
    id: u32,
}

impl Var {
    /// Create a variable that is distinct from every other variable.
    pub fn fresh(name: Symbol) -> Var {
        let id = NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed);
        Var { name, id }
    }

    /// Create a distinct variable with the same name.
    pub fn refresh(self) -> Var {
        Var::fresh(self.name)
    }

    pub fn name(self) -> Symbol {
        self.name
    }

    pub fn id(self) -> u32 {
        self.id
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let first = Symbol::intern("length");
        let second = Symbol::intern(String::from("length"));
        assert_eq!(first, second);
        assert_eq!(first.resolve(), "length");
    }

    #[test]
    fn qualified_names() {
        let name = Symbol::intern("filter").qualify("with1");
        assert_eq!(name.resolve(), "filter.with1");
    }

    #[test]
    fn fresh_vars_are_distinct() {
        let name = Symbol::intern("x");
        let x0 = Var::fresh(name);
        let x1 = x0.refresh();
        assert_ne!(x0, x1);
        assert_eq!(x0.name(), x1.name());
    }
}
