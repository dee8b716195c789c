//! # Universe levels.
//!
//! Levels form a join-semilattice generated by zero, successor, binary
//! join (`max`) and named variables. They are refcounted and immutable;
//! the smart constructors perform the cheap simplifications that keep
//! syntactically distinct but trivially equal levels from accumulating.

use super::{Name, Ref};
use std::fmt;

/// A universe level.
#[derive(Clone)]
pub struct Level(Ref<LevelView>);

#[derive(Eq, PartialEq, Hash)]
pub enum LevelView {
    LZero,
    LSucc(Level),
    LMax(Level, Level),
    LParam(Name),
}

pub use LevelView::*;

impl Level {
    pub fn zero() -> Self {
        Level(Ref::new(LZero))
    }

    pub fn succ(&self) -> Self {
        Level(Ref::new(LSucc(self.clone())))
    }

    pub fn param(n: Name) -> Self {
        Level(Ref::new(LParam(n)))
    }

    /// Join of two levels. `max l 0 = l`, `max l l = l`.
    pub fn max(a: &Level, b: &Level) -> Self {
        if a.is_zero() {
            b.clone()
        } else if b.is_zero() || a == b {
            a.clone()
        } else {
            Level(Ref::new(LMax(a.clone(), b.clone())))
        }
    }

    #[inline]
    pub fn view(&self) -> &LevelView {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        matches!(*self.0, LZero)
    }

    /// Does the variable `n` occur in this level?
    pub fn occurs(&self, n: &Name) -> bool {
        match &*self.0 {
            LZero => false,
            LSucc(l) => l.occurs(n),
            LMax(a, b) => a.occurs(n) || b.occurs(n),
            LParam(p) => p == n,
        }
    }

    /// Does this level mention any variable at all?
    pub fn has_params(&self) -> bool {
        match &*self.0 {
            LZero => false,
            LSucc(l) => l.has_params(),
            LMax(a, b) => a.has_params() || b.has_params(),
            LParam(..) => true,
        }
    }

    /// Substitute level variables, rebuilding through the smart
    /// constructors.
    pub fn instantiate_params<F>(&self, f: &F) -> Level
    where
        F: Fn(&Name) -> Option<Level>,
    {
        match &*self.0 {
            LZero => self.clone(),
            LSucc(l) => l.instantiate_params(f).succ(),
            LMax(a, b) => Level::max(&a.instantiate_params(f), &b.instantiate_params(f)),
            LParam(p) => f(p).unwrap_or_else(|| self.clone()),
        }
    }
}

mod impls {
    use super::*;

    impl Eq for Level {}
    impl PartialEq for Level {
        fn eq(&self, other: &Self) -> bool {
            Ref::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
        }
    }

    impl std::hash::Hash for Level {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.0.hash(state)
        }
    }

    impl fmt::Debug for Level {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            match &*self.0 {
                LZero => write!(out, "0"),
                LSucc(l) => write!(out, "(succ {:?})", l),
                LMax(a, b) => write!(out, "(max {:?} {:?})", a, b),
                LParam(n) => write!(out, "{}", n),
            }
        }
    }

    impl Default for Level {
        fn default() -> Self {
            Level::zero()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_max_simplifies() {
        let z = Level::zero();
        let u = Level::param(Name::from_str("u"));
        assert_eq!(Level::max(&z, &u), u);
        assert_eq!(Level::max(&u, &z), u);
        assert_eq!(Level::max(&u, &u), u);
        let v = Level::param(Name::from_str("v"));
        assert!(matches!(Level::max(&u, &v).view(), LMax(..)));
    }

    #[test]
    fn test_occurs_and_instantiate() {
        let u = Name::from_str("u");
        let l = Level::max(&Level::param(u.clone()).succ(), &Level::param(Name::from_str("v")));
        assert!(l.occurs(&u));
        assert!(!l.occurs(&Name::from_str("w")));
        let l2 = l.instantiate_params(&|n: &Name| {
            if n == &u {
                Some(Level::zero())
            } else {
                None
            }
        });
        // max (succ 0) v does not simplify away, but u is gone
        assert!(!l2.occurs(&u));
        assert!(l2.occurs(&Name::from_str("v")));
    }
}
