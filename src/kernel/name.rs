//! # Hierarchical names.
//!
//! A name is a sequence of segments, each a string or a numeral,
//! extending the anonymous root. Names are refcounted chains, so
//! extending a prefix is O(1) and clones are cheap.

use super::Ref;
use std::{cmp::Ordering, fmt};

/// A qualified, hierarchical name.
#[derive(Clone)]
pub struct Name(Ref<NameNode>);

#[derive(Eq, PartialEq, Hash)]
enum NameNode {
    Anon,
    Str(Name, String),
    Num(Name, u64),
}

use NameNode::*;

impl Name {
    /// The anonymous root.
    pub fn anonymous() -> Self {
        Name(Ref::new(Anon))
    }

    /// Atomic name with a single string segment.
    pub fn from_str(s: &str) -> Self {
        Self::anonymous().append_str(s)
    }

    /// Extend `self` with a string segment.
    pub fn append_str(&self, s: &str) -> Self {
        Name(Ref::new(Str(self.clone(), s.to_string())))
    }

    /// Extend `self` with a numeral segment.
    pub fn append_num(&self, n: u64) -> Self {
        Name(Ref::new(Num(self.clone(), n)))
    }

    #[inline]
    pub fn is_anonymous(&self) -> bool {
        matches!(*self.0, Anon)
    }

    /// A name is atomic when it has exactly one segment.
    pub fn is_atomic(&self) -> bool {
        match &*self.0 {
            Anon => false,
            Str(p, _) | Num(p, _) => p.is_anonymous(),
        }
    }

    /// Does the last segment hold a numeral?
    pub fn is_numeral(&self) -> bool {
        matches!(*self.0, Num(..))
    }

    /// The name without its last segment. The anonymous root is its own
    /// prefix.
    pub fn prefix(&self) -> Name {
        match &*self.0 {
            Anon => self.clone(),
            Str(p, _) | Num(p, _) => p.clone(),
        }
    }

    /// The last segment, if it is a string.
    pub fn last_str(&self) -> Option<&str> {
        match &*self.0 {
            Str(_, s) => Some(s),
            _ => None,
        }
    }

    /// The last segment, if it is a numeral.
    pub fn last_num(&self) -> Option<u64> {
        match &*self.0 {
            Num(_, n) => Some(*n),
            _ => None,
        }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        match &*self.0 {
            Anon => 0,
            Str(p, _) | Num(p, _) => 1 + p.len(),
        }
    }
}

mod impls {
    use super::*;

    impl Eq for Name {}
    impl PartialEq for Name {
        fn eq(&self, other: &Self) -> bool {
            Ref::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
        }
    }

    impl std::hash::Hash for Name {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.0.hash(state)
        }
    }

    impl Ord for Name {
        fn cmp(&self, other: &Self) -> Ordering {
            match (&*self.0, &*other.0) {
                (Anon, Anon) => Ordering::Equal,
                (Anon, _) => Ordering::Less,
                (_, Anon) => Ordering::Greater,
                (Str(p1, s1), Str(p2, s2)) => p1.cmp(p2).then_with(|| s1.cmp(s2)),
                (Num(p1, n1), Num(p2, n2)) => p1.cmp(p2).then_with(|| n1.cmp(n2)),
                // string segments sort before numerals with equal prefixes
                (Str(p1, _), Num(p2, _)) => p1.cmp(p2).then(Ordering::Less),
                (Num(p1, _), Str(p2, _)) => p1.cmp(p2).then(Ordering::Greater),
            }
        }
    }

    impl PartialOrd for Name {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Name {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            match &*self.0 {
                Anon => write!(out, "[anonymous]"),
                Str(p, s) => {
                    if !p.is_anonymous() {
                        write!(out, "{}::", p)?;
                    }
                    write!(out, "{}", s)
                }
                Num(p, n) => {
                    if !p.is_anonymous() {
                        write!(out, "{}::", p)?;
                    }
                    write!(out, "{}", n)
                }
            }
        }
    }

    impl fmt::Debug for Name {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            write!(out, "{}", self)
        }
    }

    impl<'a> From<&'a str> for Name {
        fn from(s: &str) -> Self {
            Name::from_str(s)
        }
    }
}
