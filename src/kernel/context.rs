//! # Typing contexts.
//!
//! A context is an ordered list of entries (binder name, optional domain
//! type), indexed right-to-left by de Bruijn indices: index 0 is the most
//! recently pushed entry. Contexts are persistent linked lists, so
//! `extend` shares the tail with the parent.

use super::{Expr, Name, Ref};
use crate::error::{Error, Result};
use std::fmt;

/// One context entry.
#[derive(Clone, Debug)]
pub struct ContextEntry {
    pub name: Name,
    pub domain: Option<Expr>,
}

/// An ordered typing context.
#[derive(Clone, Default)]
pub struct Context(Option<Ref<ContextNode>>);

struct ContextNode {
    entry: ContextEntry,
    prev: Context,
    size: u32,
}

impl Context {
    /// The empty context.
    pub fn empty() -> Self {
        Context(None)
    }

    /// Number of entries.
    pub fn size(&self) -> u32 {
        match &self.0 {
            None => 0,
            Some(n) => n.size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Push an entry; the new entry gets de Bruijn index 0.
    pub fn extend(&self, name: Name, domain: Option<Expr>) -> Context {
        Context(Some(Ref::new(ContextNode {
            entry: ContextEntry { name, domain },
            prev: self.clone(),
            size: self.size() + 1,
        })))
    }

    /// Look up the entry for de Bruijn index `i`, together with the
    /// context that was valid at its binding site (the entry's domain
    /// may itself contain free variables, which are resolved in that
    /// smaller context).
    pub fn lookup_ext(&self, i: u32) -> Result<(&ContextEntry, &Context)> {
        let mut cur = self;
        let mut i = i;
        loop {
            match &cur.0 {
                None => return Err(Error::new("unknown free variable in context")),
                Some(n) => {
                    if i == 0 {
                        return Ok((&n.entry, &n.prev));
                    }
                    i -= 1;
                    cur = &n.prev;
                }
            }
        }
    }

    /// Look up the entry for de Bruijn index `i`.
    pub fn lookup(&self, i: u32) -> Result<&ContextEntry> {
        self.lookup_ext(i).map(|(e, _)| e)
    }
}

mod impls {
    use super::*;

    impl fmt::Debug for Context {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            write!(out, "[")?;
            let mut cur = self;
            let mut first = true;
            while let Some(n) = &cur.0 {
                if !first {
                    write!(out, ", ")?;
                }
                first = false;
                write!(out, "{}", n.entry.name)?;
                cur = &n.prev;
            }
            write!(out, "]")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::Ctx;

    #[test]
    fn test_extend_lookup() {
        let mut ctx = Ctx::new();
        let ty = ctx.mk_type();
        let c0 = Context::empty();
        let c1 = c0.extend(Name::from_str("a"), Some(ty.clone()));
        let c2 = c1.extend(Name::from_str("b"), None);
        assert_eq!(c2.size(), 2);
        // index 0 is the most recent entry
        let (e0, rest0) = c2.lookup_ext(0).unwrap();
        assert_eq!(format!("{}", e0.name), "b");
        assert_eq!(rest0.size(), 1);
        let (e1, rest1) = c2.lookup_ext(1).unwrap();
        assert_eq!(format!("{}", e1.name), "a");
        assert!(rest1.is_empty());
        assert!(c2.lookup_ext(2).is_err());
    }
}
