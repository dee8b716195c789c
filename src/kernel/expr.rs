//! # Expressions, types, metavariable occurrences.
//!
//! Expressions are refcounted and thus cheaply clonable. Every node
//! caches a structural hash and the range of its free de Bruijn
//! variables; both are computed once by the term manager's smart
//! constructors and preserved thereafter (the tree is immutable).

use super::{level::Level, name::Name, Ref, WeakRef};
use crate::fnv::FNVBuildHasher;
use smallvec::SmallVec;
use std::{fmt, hash::BuildHasher, hash::Hash, hash::Hasher, ops::Deref};

/// De Bruijn indices.
pub type DbIndex = u32;

/// An expression.
#[derive(Clone)]
pub struct Expr(pub(super) Ref<ExprImpl>);

/// Small vector of exprs.
pub type Exprs = SmallVec<[Expr; 3]>;

/// A weak reference to an expression.
///
/// This is only used in the hashconsing table, so that it is not
/// the only reference keeping a term alive.
#[derive(Clone)]
pub(super) struct WExpr(pub(super) WeakRef<ExprImpl>);

/// Types and Terms are the same, but this is helpful for documentation.
pub type Type = Expr;

/// Identifier of a metavariable in its environment.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MetaId(pub u32);

/// The public view of an expression's root.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum ExprView {
    /// Bound variable (de Bruijn index).
    EVar(DbIndex),
    /// Free constant, by qualified name.
    EConst(Name),
    /// Type universe at the given level.
    ESort(Level),
    /// Value literal.
    EValue(Value),
    /// Application: head followed by at least one argument. The head is
    /// never itself an `EApp` (the manager flattens).
    EApp(Exprs),
    /// λ-abstraction: binder name, domain type, body.
    ELambda(Name, Expr, Expr),
    /// Π-abstraction: binder name, domain type, body.
    EPi(Name, Expr, Expr),
    /// Let binding: name, optional type annotation, value, body.
    ELet(Name, Option<Expr>, Expr, Expr),
    /// Heterogeneous equality.
    EEq(Expr, Expr),
    /// Metavariable occurrence with its delayed context operations.
    EMeta(MetaId, MetaCtx),
}

pub use ExprView::*;

/// Delayed context operations attached to a metavariable occurrence.
///
/// When a metavariable is seen under `n` extra binders, or an
/// instantiation happens around it before it is assigned, the operation
/// is recorded here instead of being applied eagerly. Operations apply
/// outermost-first once the assignment is known.
#[derive(Clone, Default, Eq, PartialEq, Hash, Debug)]
pub struct MetaCtx(pub SmallVec<[MetaEntry; 2]>);

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum MetaEntry {
    /// Lift free variables `>= s` by `n`.
    Lift { s: DbIndex, n: DbIndex },
    /// Instantiate variable `s` with `e` (and unshift the ones above).
    Inst { s: DbIndex, e: Expr },
}

/// A value literal, carrying its (closed) type.
#[derive(Clone)]
pub struct Value(Ref<ValueImpl>);

struct ValueImpl {
    name: Name,
    ty: Expr,
    lit: Lit,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Lit {
    Nat(u64),
    Int(i64),
}

/// The content of an expression.
pub(super) struct ExprImpl {
    /// Unique ID of the term manager responsible for creating this expr.
    ctx_uid: u32,
    /// The view of the expression.
    view: ExprView,
    /// Precomputed structural hash.
    hash: u64,
    /// Upper bound on free de Bruijn indices: `max index + 1`.
    /// 0 means the term is closed.
    fv_range: DbIndex,
    /// Does this contain a metavariable occurrence?
    has_meta: bool,
}

impl Value {
    /// New literal of the given (closed) type.
    pub fn new(name: Name, ty: Expr, lit: Lit) -> Self {
        debug_assert!(ty.is_closed());
        Value(Ref::new(ValueImpl { name, ty, lit }))
    }

    pub fn nat(ty: Expr, n: u64) -> Self {
        Self::new(Name::from_str("nat"), ty, Lit::Nat(n))
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.0.name
    }

    #[inline]
    pub fn ty(&self) -> &Expr {
        &self.0.ty
    }

    #[inline]
    pub fn lit(&self) -> Lit {
        self.0.lit
    }
}

#[inline]
fn pred_db_idx(n: DbIndex) -> DbIndex {
    if n == 0 {
        0
    } else {
        n - 1
    }
}

// compute the free-variable range (deepest DB index + 1)
fn compute_fv_range(e: &ExprView) -> DbIndex {
    match e {
        EVar(i) => i + 1,
        EConst(..) | ESort(..) => 0,
        EValue(v) => v.ty().fv_range(),
        EApp(args) => args.iter().map(|a| a.fv_range()).max().unwrap_or(0),
        ELambda(_, ty, body) | EPi(_, ty, body) => {
            // the body's range is decremented here
            ty.fv_range().max(pred_db_idx(body.fv_range()))
        }
        ELet(_, ty, v, body) => {
            let d = ty.as_ref().map_or(0, |t| t.fv_range());
            d.max(v.fv_range()).max(pred_db_idx(body.fv_range()))
        }
        EEq(a, b) => a.fv_range().max(b.fv_range()),
        EMeta(_, mctx) => mctx
            .0
            .iter()
            .map(|ent| match ent {
                MetaEntry::Lift { s, n } => s + n,
                MetaEntry::Inst { s, e } => (*s).max(e.fv_range()),
            })
            .max()
            .unwrap_or(0),
    }
}

fn compute_has_meta(e: &ExprView) -> bool {
    match e {
        EMeta(..) => true,
        EVar(..) | EConst(..) | ESort(..) | EValue(..) => false,
        EApp(args) => args.iter().any(|a| a.has_meta()),
        ELambda(_, ty, body) | EPi(_, ty, body) => ty.has_meta() || body.has_meta(),
        ELet(_, ty, v, body) => {
            ty.as_ref().map_or(false, |t| t.has_meta()) || v.has_meta() || body.has_meta()
        }
        EEq(a, b) => a.has_meta() || b.has_meta(),
    }
}

fn compute_hash(e: &ExprView) -> u64 {
    let mut h = FNVBuildHasher.build_hasher();
    e.hash(&mut h);
    h.finish()
}

impl ExprView {
    /// Shallow map, with a depth parameter.
    ///
    /// `k` is the current number of surrounding binders, it is passed
    /// back to the callback `f`, possibly incremented by one.
    pub fn map<F>(&self, mut f: F, k: DbIndex) -> crate::Result<Self>
    where
        F: FnMut(&Expr, DbIndex) -> crate::Result<Expr>,
    {
        let r = match self {
            EVar(..) | EConst(..) | ESort(..) | EValue(..) => self.clone(),
            EApp(args) => {
                let args = args.iter().map(|x| f(x, k)).collect::<crate::Result<Exprs>>()?;
                EApp(args)
            }
            ELambda(n, ty, body) => ELambda(n.clone(), f(ty, k)?, f(body, k + 1)?),
            EPi(n, ty, body) => EPi(n.clone(), f(ty, k)?, f(body, k + 1)?),
            ELet(n, ty, v, body) => {
                let ty = match ty {
                    None => None,
                    Some(t) => Some(f(t, k)?),
                };
                ELet(n.clone(), ty, f(v, k)?, f(body, k + 1)?)
            }
            EEq(a, b) => EEq(f(a, k)?, f(b, k)?),
            EMeta(id, mctx) => {
                let entries = mctx
                    .0
                    .iter()
                    .map(|ent| {
                        Ok(match ent {
                            MetaEntry::Lift { s, n } => MetaEntry::Lift { s: *s, n: *n },
                            MetaEntry::Inst { s, e } => MetaEntry::Inst { s: *s, e: f(e, k)? },
                        })
                    })
                    .collect::<crate::Result<_>>()?;
                EMeta(*id, MetaCtx(entries))
            }
        };
        Ok(r)
    }
}

impl Expr {
    /// View the expression's root.
    #[inline]
    pub fn view(&self) -> &ExprView {
        &self.0.view
    }

    pub(super) fn ctx_uid(&self) -> u32 {
        self.0.ctx_uid
    }

    /// Precomputed structural hash of the expression.
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.0.hash
    }

    /// Upper bound on the free de Bruijn indices occurring here
    /// (`max index + 1`; 0 means closed).
    #[inline]
    pub fn fv_range(&self) -> DbIndex {
        self.0.fv_range
    }

    /// Is this a closed term?
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.0.fv_range == 0
    }

    /// Does this contain a metavariable occurrence?
    #[inline]
    pub fn has_meta(&self) -> bool {
        self.0.has_meta
    }

    /// Does the term contain a free variable with index in `[lo, hi)`?
    pub fn has_free_var_in_range(&self, lo: DbIndex, hi: DbIndex) -> bool {
        fn walk(e: &Expr, lo: DbIndex, hi: DbIndex) -> bool {
            if e.fv_range() <= lo || lo >= hi {
                return false; // no free var reaches `lo`
            }
            match e.view() {
                EVar(i) => *i >= lo && *i < hi,
                EConst(..) | ESort(..) | EValue(..) => false,
                EApp(args) => args.iter().any(|a| walk(a, lo, hi)),
                ELambda(_, ty, body) | EPi(_, ty, body) => {
                    walk(ty, lo, hi) || walk(body, lo + 1, hi.saturating_add(1))
                }
                ELet(_, ty, v, body) => {
                    ty.as_ref().map_or(false, |t| walk(t, lo, hi))
                        || walk(v, lo, hi)
                        || walk(body, lo + 1, hi.saturating_add(1))
                }
                EEq(a, b) => walk(a, lo, hi) || walk(b, lo, hi),
                // conservative: the eventual assignment is unknown
                EMeta(..) => true,
            }
        }
        walk(self, lo, hi)
    }

    /// `e.unfold_app()` returns `(head, args)`; `args` is empty when the
    /// root is not an application.
    pub fn unfold_app(&self) -> (&Expr, &[Expr]) {
        match self.view() {
            EApp(args) => (&args[0], &args[1..]),
            _ => (self, &[]),
        }
    }

    /// `e.unfold_pi()` returns `(domains, body)` for a chain of Π.
    pub fn unfold_pi(&self) -> (SmallVec<[&Type; 3]>, &Expr) {
        let mut e = self;
        let mut v: SmallVec<[&Type; 3]> = SmallVec::new();
        while let EPi(_, ty, body) = e.view() {
            v.push(ty);
            e = body;
        }
        (v, e)
    }

    /// Arrow-arity of a type: number of leading Π binders.
    pub fn arrow_arity(&self) -> usize {
        self.unfold_pi().0.len()
    }

    /// View a bound variable's index.
    pub fn as_var(&self) -> Option<DbIndex> {
        if let EVar(i) = self.0.view {
            Some(i)
        } else {
            None
        }
    }

    /// View as constant.
    pub fn as_const(&self) -> Option<&Name> {
        if let EConst(ref n) = self.0.view {
            Some(n)
        } else {
            None
        }
    }

    /// View as application.
    pub fn as_app(&self) -> Option<&[Expr]> {
        if let EApp(ref args) = self.0.view {
            Some(&args[..])
        } else {
            None
        }
    }

    /// View as a lambda-expression.
    pub fn as_lambda(&self) -> Option<(&Name, &Type, &Expr)> {
        if let ELambda(ref n, ref ty, ref bod) = self.0.view {
            Some((n, ty, bod))
        } else {
            None
        }
    }

    /// View as a pi-expression.
    pub fn as_pi(&self) -> Option<(&Name, &Type, &Expr)> {
        if let EPi(ref n, ref ty, ref bod) = self.0.view {
            Some((n, ty, bod))
        } else {
            None
        }
    }

    /// View as a metavariable occurrence.
    pub fn as_meta(&self) -> Option<(MetaId, &MetaCtx)> {
        if let EMeta(id, ref mctx) = self.0.view {
            Some((id, mctx))
        } else {
            None
        }
    }

    /// `(a=b).unfold_eq()` returns `Some((a,b))`.
    pub fn unfold_eq(&self) -> Option<(&Expr, &Expr)> {
        if let EEq(ref a, ref b) = self.0.view {
            Some((a, b))
        } else {
            None
        }
    }

    /// Obtain a weak reference to this expression.
    #[inline]
    pub(super) fn weak(&self) -> WExpr {
        WExpr(Ref::downgrade(&self.0))
    }

    // helper for building expressions; only the manager calls this.
    pub(super) fn make_(v: ExprView, em_uid: u32) -> Self {
        let fv_range = compute_fv_range(&v);
        let has_meta = compute_has_meta(&v);
        let hash = compute_hash(&v);
        Expr(Ref::new(ExprImpl {
            view: v,
            ctx_uid: em_uid,
            hash,
            fv_range,
            has_meta,
        }))
    }

    // pretty print with de Bruijn depth `k`
    fn pp_(&self, k: DbIndex, out: &mut fmt::Formatter) -> fmt::Result {
        match self.view() {
            EVar(i) => {
                // we may want to print non closed terms, so we need isize
                write!(out, "x{}", (k as isize - *i as isize - 1))
            }
            EConst(n) => write!(out, "{}", n),
            ESort(l) if l.is_zero() => write!(out, "Type"),
            ESort(l) => write!(out, "(Type {:?})", l),
            EValue(v) => match v.lit() {
                Lit::Nat(n) => write!(out, "{}", n),
                Lit::Int(i) => write!(out, "{}", i),
            },
            EApp(args) => {
                write!(out, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(out, " ")?;
                    }
                    a.pp_(k, out)?;
                }
                write!(out, ")")
            }
            ELambda(_, ty, body) => {
                write!(out, "(\\x{} : ", k)?;
                ty.pp_(k, out)?;
                write!(out, ". ")?;
                body.pp_(k + 1, out)?;
                write!(out, ")")
            }
            EPi(_, ty, body) => {
                if body.fv_range() == 0 {
                    // non-dependent arrow
                    write!(out, "(")?;
                    ty.pp_(k, out)?;
                    write!(out, " -> ")?;
                    body.pp_(k + 1, out)?;
                    write!(out, ")")
                } else {
                    write!(out, "(pi x{} : ", k)?;
                    ty.pp_(k, out)?;
                    write!(out, ". ")?;
                    body.pp_(k + 1, out)?;
                    write!(out, ")")
                }
            }
            ELet(_, _, v, body) => {
                write!(out, "(let x{} := ", k)?;
                v.pp_(k, out)?;
                write!(out, " in ")?;
                body.pp_(k + 1, out)?;
                write!(out, ")")
            }
            EEq(a, b) => {
                write!(out, "(")?;
                a.pp_(k, out)?;
                write!(out, " = ")?;
                b.pp_(k, out)?;
                write!(out, ")")
            }
            EMeta(id, mctx) => {
                write!(out, "?m{}", id.0)?;
                if !mctx.0.is_empty() {
                    write!(out, "[{}]", mctx.0.len())?;
                }
                Ok(())
            }
        }
    }
}

mod impls {
    use super::*;

    impl fmt::Debug for Expr {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            self.pp_(0, out)
        }
    }

    impl fmt::Display for Expr {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            self.pp_(0, out)
        }
    }

    impl Eq for Expr {}
    impl PartialEq for Expr {
        fn eq(&self, other: &Self) -> bool {
            // hashconsing makes pointer equality structural equality
            std::ptr::eq(
                self.0.deref() as *const ExprImpl,
                other.0.deref() as *const _,
            )
        }
    }

    impl PartialOrd for Expr {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for Expr {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            // simple pointer comparison
            std::cmp::Ord::cmp(
                &(self.0.as_ref() as *const ExprImpl),
                &(other.0.as_ref() as *const _),
            )
        }
    }

    impl std::hash::Hash for Expr {
        fn hash<H: std::hash::Hasher>(&self, h: &mut H) {
            h.write_u64(self.0.hash)
        }
    }

    impl Eq for Value {}
    impl PartialEq for Value {
        fn eq(&self, other: &Self) -> bool {
            self.0.name == other.0.name && self.0.lit == other.0.lit && self.0.ty == other.0.ty
        }
    }

    impl std::hash::Hash for Value {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.0.name.hash(state);
            self.0.lit.hash(state);
            self.0.ty.hash(state);
        }
    }

    impl fmt::Debug for Value {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            write!(out, "{:?}", self.0.lit)
        }
    }
}

impl MetaCtx {
    pub fn empty() -> Self {
        MetaCtx(SmallVec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a lift entry (seen under `n` more binders).
    pub fn lift(&self, s: DbIndex, n: DbIndex) -> Self {
        let mut v = self.0.clone();
        v.push(MetaEntry::Lift { s, n });
        MetaCtx(v)
    }

    /// Append an instantiation entry.
    pub fn inst(&self, s: DbIndex, e: Expr) -> Self {
        let mut v = self.0.clone();
        v.push(MetaEntry::Inst { s, e });
        MetaCtx(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_sizeof_expr() {
        let sz = std::mem::size_of::<Expr>();
        assert_eq!(8, sz);
    }
}
