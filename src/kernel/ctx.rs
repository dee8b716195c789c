//! # Term manager.
//!
//! The manager is responsible for creating terms (with hashconsing, so
//! that pointer equality is structural equality), for the de Bruijn
//! plumbing (lifting, lowering, instantiation, β-reduction), and for the
//! table of declared constants.

use super::{
    expr::{DbIndex, Exprs, MetaCtx, MetaEntry, MetaId, Value, WExpr},
    level::Level,
    name::Name,
    Expr, ExprView, Ref, Type, WeakRef,
};
use crate::{
    error::{Error, Result},
    errorstr,
    fnv::{self, FnvHashMap as HM},
};
use smallvec::smallvec;
use std::{ops::Deref, sync::atomic};

use ExprView::*;

/// Manager for expressions: perfect sharing, term construction,
/// substitution, and the declaration table.
pub struct Ctx(Box<CtxImpl>);

struct CtxImpl {
    /// Hashconsing table, with weak semantics.
    tbl: HM<ExprView, WExpr>,
    /// Declared constants, by name.
    decls: HM<Name, Decl>,
    /// The `Type` universe (sort 0), lazily built at creation.
    e_type: Option<Expr>,
    /// The builtin `Bool` type constant.
    e_bool: Option<Expr>,
    next_cleanup: usize,
    uid: u32, // Unique to this ctx
}

/// A declared constant: a postulate, builtin, definition or theorem.
#[derive(Clone, Debug)]
pub struct Decl(Ref<DeclImpl>);

#[derive(Debug)]
pub struct DeclImpl {
    pub name: Name,
    /// Type of the constant.
    pub ty: Expr,
    pub kind: DeclKind,
}

#[derive(Debug)]
pub enum DeclKind {
    /// Variable or axiom: a constant with a type but no value.
    Postulate,
    /// Builtin semantic object.
    Builtin,
    /// Defined constant.
    Definition { value: Expr },
    /// Proved constant; the proof is kept for display purposes only.
    Theorem { proof: Expr },
}

impl Deref for Decl {
    type Target = DeclImpl;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl Decl {
    /// The definition body, when there is one.
    pub fn value(&self) -> Option<&Expr> {
        match &self.0.kind {
            DeclKind::Definition { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_definition(&self) -> bool {
        matches!(self.0.kind, DeclKind::Definition { .. })
    }

    /// Can implicit arguments be attached to this object?
    pub fn accepts_implicit_marks(&self) -> bool {
        matches!(
            self.0.kind,
            DeclKind::Definition { .. } | DeclKind::Postulate | DeclKind::Builtin
        )
    }
}

/// Period between 2 cleanups.
///
/// The cleanup of dead entries from the hashconsing table is done
/// every time `CLEANUP_PERIOD` new terms are added.
const CLEANUP_PERIOD: usize = 5_000;

// used to allocate unique manager IDs
static EM_ID: atomic::AtomicUsize = atomic::AtomicUsize::new(0);

// placeholder constants use this name
const PLACEHOLDER: &str = "_";

// helpers
impl Ctx {
    /// Create a new term manager with given initial capacity.
    pub fn with_capacity(n: usize) -> Self {
        let tbl = fnv::new_table_with_cap(n);
        // allocate new uid
        let uid = EM_ID.fetch_add(1, atomic::Ordering::SeqCst);
        if uid > u32::MAX as usize {
            panic!("allocated more than u32::MAX term managers, cannot allocate more");
        }
        let mut ctx = Ctx(Box::new(CtxImpl {
            tbl,
            decls: fnv::new_table_with_cap(16),
            e_type: None,
            e_bool: None,
            next_cleanup: CLEANUP_PERIOD,
            uid: uid as u32,
        }));

        let ty = ctx.hashcons_(ESort(Level::zero())).unwrap();
        ctx.0.e_type = Some(ty.clone());

        // install the builtin `Bool` type constant
        let bool_name = Name::from_str("Bool");
        let e_bool = ctx.hashcons_(EConst(bool_name.clone())).unwrap();
        ctx.0.decls.insert(
            bool_name.clone(),
            Decl(Ref::new(DeclImpl {
                name: bool_name,
                ty,
                kind: DeclKind::Builtin,
            })),
        );
        ctx.0.e_bool = Some(e_bool);

        ctx
    }

    /// New manager with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(2_048)
    }

    /// Add to the internal table, return the canonical representant.
    fn hashcons_(&mut self, ev: ExprView) -> Result<Expr> {
        let CtxImpl {
            tbl, next_cleanup, ..
        } = &mut *self.0;
        if let Some(v) = tbl.get(&ev) {
            if let Some(t) = WeakRef::upgrade(&v.0) {
                return Ok(Expr(t)); // still alive!
            }
        }

        // every n new terms, do a `cleanup`
        if *next_cleanup == 0 {
            self.cleanup();
        } else {
            *next_cleanup -= 1;
        }

        let key = ev.clone();
        let e = Expr::make_(ev, self.0.uid);

        let tbl = &mut self.0.tbl;
        tbl.insert(key, e.weak());
        Ok(e)
    }

    /// Rebuild a shallowly-mapped view through the hashconsing table.
    pub(crate) fn rebuild_view(&mut self, ev: ExprView) -> Result<Expr> {
        self.hashcons_(ev)
    }

    #[inline]
    pub(crate) fn check_uid_(&self, e: &Expr) {
        assert!(self.0.uid == e.ctx_uid()); // term should belong to this ctx
    }

    /// Cleanup terms that are only referenced by the hashconsing table.
    ///
    /// This is done regularly when new terms are created, but one can
    /// also call `cleanup` manually.
    pub fn cleanup(&mut self) {
        self.0.next_cleanup = CLEANUP_PERIOD;

        self.0.tbl.retain(|_, v| {
            // if `v` is not used anywhere else, this weak ref is dangling.
            let n = WeakRef::strong_count(&v.0);
            n > 0
        });
    }
}

// term constructors
impl Ctx {
    /// The `Type` universe (sort 0).
    #[inline]
    pub fn mk_type(&self) -> Expr {
        self.0.e_type.clone().expect("`Type` not initialized")
    }

    /// The builtin `Bool` type.
    #[inline]
    pub fn mk_bool(&self) -> Expr {
        self.0.e_bool.clone().expect("`Bool` not initialized")
    }

    /// Sort at the given universe level.
    pub fn mk_sort(&mut self, l: Level) -> Expr {
        self.hashcons_(ESort(l)).expect("mk_sort cannot fail")
    }

    /// Bound variable with the given de Bruijn index.
    pub fn mk_var(&mut self, idx: DbIndex) -> Expr {
        self.hashcons_(EVar(idx)).expect("mk_var cannot fail")
    }

    /// Free constant, by name. The name does not have to be declared;
    /// the type checker reports unknown constants.
    pub fn mk_const(&mut self, n: Name) -> Expr {
        self.hashcons_(EConst(n)).expect("mk_const cannot fail")
    }

    /// Free constant, from a string.
    pub fn mk_const_str(&mut self, s: &str) -> Expr {
        self.mk_const(Name::from_str(s))
    }

    /// Value literal.
    pub fn mk_value(&mut self, v: Value) -> Expr {
        self.check_uid_(v.ty());
        self.hashcons_(EValue(v)).expect("mk_value cannot fail")
    }

    /// Natural-number literal of the given type.
    pub fn mk_nat(&mut self, ty: Expr, n: u64) -> Expr {
        self.check_uid_(&ty);
        self.mk_value(Value::nat(ty, n))
    }

    /// Placeholder constant, replaced by a fresh metavariable before
    /// elaboration.
    pub fn mk_placeholder(&mut self) -> Expr {
        self.mk_const_str(PLACEHOLDER)
    }

    pub fn is_placeholder(e: &Expr) -> bool {
        match e.view() {
            EConst(n) => n.is_atomic() && n.last_str() == Some(PLACEHOLDER),
            _ => false,
        }
    }

    /// Apply `f` to `arg`. Nested applications are flattened, so the
    /// head of an application is never itself an application.
    pub fn mk_app(&mut self, f: Expr, arg: Expr) -> Result<Expr> {
        self.check_uid_(&f);
        self.check_uid_(&arg);
        let args: Exprs = match f.view() {
            EApp(args0) => {
                let mut v = args0.clone();
                v.push(arg);
                v
            }
            _ => smallvec![f, arg],
        };
        self.hashcons_(EApp(args))
    }

    /// Apply `f` to the given arguments.
    pub fn mk_app_l(&mut self, f: Expr, args: &[Expr]) -> Result<Expr> {
        let mut e = f;
        for x in args {
            let e2 = e.clone();
            e = self.mk_app(e2, x.clone())?;
        }
        Ok(e)
    }

    /// Make a lambda term; `body` refers to the bound variable as db 0.
    pub fn mk_lambda(&mut self, name: Name, ty: Type, body: Expr) -> Result<Expr> {
        self.check_uid_(&ty);
        self.check_uid_(&body);
        self.hashcons_(ELambda(name, ty, body))
    }

    /// Make a pi term; `body` refers to the bound variable as db 0.
    pub fn mk_pi(&mut self, name: Name, ty: Type, body: Expr) -> Result<Expr> {
        self.check_uid_(&ty);
        self.check_uid_(&body);
        self.hashcons_(EPi(name, ty, body))
    }

    /// Make a non-dependent arrow `a -> b`.
    pub fn mk_arrow(&mut self, a: Type, b: Type) -> Result<Expr> {
        // shift `b` by 1 to skip the unused binder
        let b = self.lift_free_vars(&b, 0, 1)?;
        self.mk_pi(Name::anonymous(), a, b)
    }

    /// Make a let binding; `body` refers to the bound variable as db 0.
    pub fn mk_let(
        &mut self,
        name: Name,
        ty: Option<Type>,
        value: Expr,
        body: Expr,
    ) -> Result<Expr> {
        if let Some(ty) = &ty {
            self.check_uid_(ty);
        }
        self.check_uid_(&value);
        self.check_uid_(&body);
        self.hashcons_(ELet(name, ty, value, body))
    }

    /// Heterogeneous equality `a = b`.
    pub fn mk_eq(&mut self, a: Expr, b: Expr) -> Result<Expr> {
        self.check_uid_(&a);
        self.check_uid_(&b);
        self.hashcons_(EEq(a, b))
    }

    /// Metavariable occurrence.
    pub fn mk_meta(&mut self, id: MetaId, mctx: MetaCtx) -> Expr {
        self.hashcons_(EMeta(id, mctx)).expect("mk_meta cannot fail")
    }
}

// de Bruijn plumbing
impl Ctx {
    /// Shift free DB vars `>= s` by `n`.
    ///
    /// On a metavariable occurrence the shift is recorded as a delayed
    /// operation instead of being applied (the assignment is not known
    /// yet).
    pub fn lift_free_vars(&mut self, t: &Expr, s: DbIndex, n: DbIndex) -> Result<Expr> {
        if n == 0 || (!t.has_meta() && t.fv_range() <= s) {
            return Ok(t.clone()); // shortcut for identity
        }

        let ev = t.view();
        Ok(match ev {
            EVar(i) if *i >= s => self.mk_var(*i + n),
            EVar(..) => t.clone(),
            EMeta(id, mctx) => {
                let (id, mctx) = (*id, mctx.lift(s, n));
                self.mk_meta(id, mctx)
            }
            _ => {
                let ev2 = ev.map(|u, k| self.lift_free_vars(u, s + k, n), 0)?;
                self.hashcons_(ev2)?
            }
        })
    }

    /// Unshift free DB vars `>= s` by `n`.
    ///
    /// Fails if the term mentions a variable in `[s-n, s)`, which would
    /// escape below zero.
    pub fn lower_free_vars(&mut self, t: &Expr, s: DbIndex, n: DbIndex) -> Result<Expr> {
        if n == 0 || (!t.has_meta() && t.fv_range() <= s.saturating_sub(n)) {
            return Ok(t.clone());
        }

        let ev = t.view();
        Ok(match ev {
            EVar(i) if *i >= s => self.mk_var(*i - n),
            EVar(i) if *i >= s.saturating_sub(n) => {
                return Err(errorstr!(
                    "lower_free_vars: variable {} escapes below the cut",
                    i
                ))
            }
            EVar(..) => t.clone(),
            EMeta(..) => {
                return Err(Error::new(
                    "lower_free_vars: cannot lower a metavariable occurrence",
                ))
            }
            _ => {
                let ev2 = ev.map(|u, k| self.lower_free_vars(u, s + k, n), 0)?;
                self.hashcons_(ev2)?
            }
        })
    }

    /// Replace `DB_i` in `t` by `args[i]`, for `i < args.len()`; free
    /// variables above the substituted range are unshifted accordingly.
    pub fn instantiate(&mut self, t: &Expr, args: &[Expr]) -> Result<Expr> {
        if args.is_empty() {
            return Ok(t.clone());
        }
        self.instantiate_(t, 0, args)
    }

    fn instantiate_(&mut self, t: &Expr, k: DbIndex, args: &[Expr]) -> Result<Expr> {
        if !t.has_meta() && t.fv_range() <= k {
            return Ok(t.clone()); // no variable reaches the cut
        }

        let n_args = args.len() as DbIndex;
        Ok(match t.view() {
            EVar(i) if *i >= k && *i < k + n_args => {
                // `i` refers to a variable in `args`; shift its image by
                // `k` to account for the binders we traversed.
                let u = &args[(*i - k) as usize];
                self.check_uid_(u);
                self.lift_free_vars(u, 0, k)?
            }
            EVar(i) if *i >= k + n_args => {
                // this variable skips over the removed binders
                self.mk_var(*i - n_args)
            }
            EVar(..) => t.clone(),
            EMeta(id, mctx) => {
                // record delayed instantiations, innermost variable last
                let id = *id;
                let mut mctx = mctx.clone();
                for (i, a) in args.iter().enumerate().rev() {
                    let a = self.lift_free_vars(a, 0, k)?;
                    mctx = mctx.inst(k + i as DbIndex, a);
                }
                self.mk_meta(id, mctx)
            }
            ev => {
                let ev2 = ev.map(|u, k2| self.instantiate_(u, k + k2, args), 0)?;
                self.hashcons_(ev2)?
            }
        })
    }

    /// β-apply `f` to `args`: contract as many leading λs as there are
    /// arguments, and re-apply the leftover arguments.
    pub fn apply_beta(&mut self, f: &Expr, args: &[Expr]) -> Result<Expr> {
        let mut e = f.clone();
        let mut i = 0;
        while i < args.len() {
            match e.view() {
                ELambda(_, _, body) => {
                    let body = body.clone();
                    e = self.instantiate(&body, &args[i..i + 1])?;
                    i += 1;
                }
                _ => break,
            }
        }
        self.mk_app_l(e, &args[i..])
    }

    /// Contract β-redexes at the root, if any.
    pub fn head_beta_reduce(&mut self, e: &Expr) -> Result<Expr> {
        let mut e = e.clone();
        loop {
            let (hd, args) = e.unfold_app();
            if args.is_empty() || !matches!(hd.view(), ELambda(..)) {
                return Ok(e);
            }
            let hd = hd.clone();
            let args: Exprs = args.iter().cloned().collect();
            e = self.apply_beta(&hd, &args)?;
        }
    }

    /// Contract every β-redex in `e`, innermost-first.
    pub fn beta_normalize(&mut self, e: &Expr) -> Result<Expr> {
        let e2 = match e.view() {
            EVar(..) | EConst(..) | ESort(..) | EValue(..) | EMeta(..) => e.clone(),
            ev => {
                let ev2 = ev.map(|u, _| self.beta_normalize(u), 0)?;
                self.hashcons_(ev2)?
            }
        };
        let r = self.head_beta_reduce(&e2)?;
        if r == e2 {
            Ok(r)
        } else {
            self.beta_normalize(&r)
        }
    }

    /// Apply the delayed operations of a metavariable occurrence to its
    /// assignment `e`, outermost-first.
    pub fn apply_meta_ctx(&mut self, mctx: &MetaCtx, e: &Expr) -> Result<Expr> {
        let mut e = e.clone();
        for ent in mctx.0.iter() {
            e = match ent {
                MetaEntry::Lift { s, n } => self.lift_free_vars(&e, *s, *n)?,
                MetaEntry::Inst { s, e: v } => {
                    // instantiate variable `s`, keeping the ones below
                    self.instantiate_(&e, *s, std::slice::from_ref(v))?
                }
            };
        }
        Ok(e)
    }
}

// declarations
impl Ctx {
    fn add_decl_(&mut self, name: Name, ty: Expr, kind: DeclKind) -> Result<Decl> {
        self.check_uid_(&ty);
        if self.0.decls.contains_key(&name) {
            return Err(errorstr!("constant `{}` is already declared", name));
        }
        let d = Decl(Ref::new(DeclImpl {
            name: name.clone(),
            ty,
            kind,
        }));
        self.0.decls.insert(name, d.clone());
        Ok(d)
    }

    /// Declare a variable (an opaque constant with a type).
    pub fn add_var(&mut self, name: impl Into<Name>, ty: Type) -> Result<Decl> {
        self.add_decl_(name.into(), ty, DeclKind::Postulate)
    }

    /// Declare an axiom. Axioms and variables are both postulates; the
    /// distinction matters only to the display layer.
    pub fn add_axiom(&mut self, name: impl Into<Name>, ty: Type) -> Result<Decl> {
        self.add_decl_(name.into(), ty, DeclKind::Postulate)
    }

    /// Declare a builtin object.
    pub fn add_builtin(&mut self, name: impl Into<Name>, ty: Type) -> Result<Decl> {
        self.add_decl_(name.into(), ty, DeclKind::Builtin)
    }

    /// Declare a defined constant.
    pub fn add_definition(&mut self, name: impl Into<Name>, ty: Type, value: Expr) -> Result<Decl> {
        self.check_uid_(&value);
        self.add_decl_(name.into(), ty, DeclKind::Definition { value })
    }

    /// Declare a theorem.
    pub fn add_theorem(&mut self, name: impl Into<Name>, ty: Type, proof: Expr) -> Result<Decl> {
        self.check_uid_(&proof);
        self.add_decl_(name.into(), ty, DeclKind::Theorem { proof })
    }

    /// Find a declaration by name.
    pub fn find_decl(&self, n: &Name) -> Option<&Decl> {
        self.0.decls.get(n)
    }

    /// Type of a declared constant.
    pub fn decl_type(&self, n: &Name) -> Result<Expr> {
        self.find_decl(n)
            .map(|d| d.ty.clone())
            .ok_or_else(|| errorstr!("unknown constant `{}`", n))
    }

    /// Iterate over all declarations.
    pub fn iter_decls(&self) -> impl Iterator<Item = (&Name, &Decl)> {
        self.0.decls.iter()
    }
}

mod impls {
    use super::*;

    impl Default for Ctx {
        fn default() -> Self {
            Ctx::new()
        }
    }

    impl std::fmt::Debug for Ctx {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "<term manager>")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hashcons() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        let t1 = ctx.mk_arrow(b.clone(), b.clone()).unwrap();
        let t2 = ctx.mk_arrow(b.clone(), b.clone()).unwrap();
        assert_eq!(t1, t2); // pointer equality via hashconsing
    }

    #[test]
    fn test_app_flattens() {
        let mut ctx = Ctx::new();
        let f = ctx.mk_const_str("f");
        let a = ctx.mk_const_str("a");
        let b = ctx.mk_const_str("b");
        let fa = ctx.mk_app(f.clone(), a.clone()).unwrap();
        let fab = ctx.mk_app(fa, b.clone()).unwrap();
        let (hd, args) = fab.unfold_app();
        assert_eq!(hd, &f);
        assert_eq!(args.len(), 2);
        let fab2 = ctx.mk_app_l(f, &[a, b]).unwrap();
        assert_eq!(fab, fab2);
    }

    #[test]
    fn test_lift_lower() {
        let mut ctx = Ctx::new();
        let v0 = ctx.mk_var(0);
        let v5 = ctx.lift_free_vars(&v0, 0, 5).unwrap();
        assert_eq!(v5.as_var(), Some(5));
        let back = ctx.lower_free_vars(&v5, 5, 5).unwrap();
        assert_eq!(back.as_var(), Some(0));
        // lowering a variable that would escape fails
        assert!(ctx.lower_free_vars(&v0, 1, 1).is_err());
    }

    #[test]
    fn test_lift_under_binder() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        // \x. x applied to free var 0 -> body mentions db0 (bound) and db1 (free)
        let v0 = ctx.mk_var(0);
        let v1 = ctx.mk_var(1);
        let body = ctx.mk_app(v1, v0).unwrap();
        let lam = ctx.mk_lambda(Name::from_str("x"), b, body).unwrap();
        assert_eq!(lam.fv_range(), 1);
        let lam2 = ctx.lift_free_vars(&lam, 0, 3).unwrap();
        assert_eq!(lam2.fv_range(), 4);
        // the bound variable did not move
        let (_, _, body2) = lam2.as_lambda().unwrap();
        let args = body2.as_app().unwrap();
        assert_eq!(args[0].as_var(), Some(4));
        assert_eq!(args[1].as_var(), Some(0));
    }

    #[test]
    fn test_beta() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        let v0 = ctx.mk_var(0);
        let v1 = ctx.mk_var(1);
        // \x y. x y
        let inner = ctx.mk_app(v1.clone(), v0.clone()).unwrap();
        let lam_y = ctx.mk_lambda(Name::from_str("y"), b.clone(), inner).unwrap();
        let lam_xy = ctx.mk_lambda(Name::from_str("x"), b.clone(), lam_y).unwrap();
        let f = ctx.mk_const_str("f");
        let a = ctx.mk_const_str("a");
        let r = ctx.apply_beta(&lam_xy, &[f.clone(), a.clone()]).unwrap();
        let expected = ctx.mk_app_l(f, &[a]).unwrap();
        assert_eq!(r, expected);
    }

    #[test]
    fn test_instantiate_unshifts() {
        let mut ctx = Ctx::new();
        let v0 = ctx.mk_var(0);
        let v1 = ctx.mk_var(1);
        let pair = ctx.mk_eq(v0, v1).unwrap();
        let a = ctx.mk_const_str("a");
        let r = ctx.instantiate(&pair, &[a.clone()]).unwrap();
        let (x, y) = r.unfold_eq().unwrap();
        assert_eq!(x, &a);
        assert_eq!(y.as_var(), Some(0)); // 1 became 0
    }

    #[test]
    fn test_decls() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        ctx.add_var("p", b.clone()).unwrap();
        assert!(ctx.add_var("p", b).is_err());
        assert!(ctx.find_decl(&Name::from_str("p")).is_some());
        assert!(ctx.find_decl(&Name::from_str("Bool")).is_some());
    }
}
