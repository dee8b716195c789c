//! # Proof-carrying rewriting.
//!
//! A rewriter maps a term to a new term together with a proof term for
//! the equality of the two, or signals a miss. Misses are values
//! (`Ok(None)`), never errors; combinators inspect and propagate them.
//!
//! Proofs are built from the ambient equality lemmas `refl`, `trans`,
//! `congr` and `congr2`, referenced by name through the term manager:
//!
//! - `refl  : ∀ A (a : A), a = a`
//! - `trans : ∀ A (a b c : A), a = b → b = c → a = c`
//! - `congr2: ∀ A B (a b : A) (f : A → B), a = b → f a = f b`
//! - `congr : ∀ A B (f g : A → B) (a b : A), f = g → a = b → f a = g b`

use crate::{
    algo::hop_match::hop_match,
    error::{Error, Result},
    errorstr,
    interrupt::Interrupt,
    kernel::{typecheck, Context, Ctx, Expr, ExprView, Name},
    logtrace,
};
use std::fmt;

use ExprView::*;

/// Result of a successful rewrite step: the new term and a proof of
/// `old = new`.
#[derive(Clone, Debug)]
pub struct Rw {
    pub expr: Expr,
    pub proof: Expr,
}

/// Result of rewriting a whole term.
pub enum Res {
    /// No rewrite step applied.
    RwSame,
    /// The term was rewritten, with proof.
    RwStep(Rw),
}

/// A term rewriter.
pub trait Rewriter: fmt::Debug {
    /// Apply one step at the root of `e`. `Ok(None)` is a miss.
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>>;

    /// Like `try_rewrite`, producing `refl` on a miss.
    fn rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Rw> {
        match self.try_rewrite(ctx, tctx, e)? {
            Some(r) => Ok(r),
            None => mk_refl(ctx, tctx, e),
        }
    }
}

fn eq_lemma(ctx: &mut Ctx, name: &str) -> Expr {
    ctx.mk_const(Name::from_str(name))
}

fn mk_refl(ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Rw> {
    let ty = typecheck::infer_type_in(ctx, tctx, e)?;
    let refl = eq_lemma(ctx, "refl");
    let proof = ctx.mk_app_l(refl, &[ty, e.clone()])?;
    Ok(Rw {
        expr: e.clone(),
        proof,
    })
}

/// `trans ty a b c p q : a = c` from `p : a = b` and `q : b = c`.
fn mk_trans(
    ctx: &mut Ctx,
    tctx: &Context,
    a: &Expr,
    b: &Expr,
    c: &Expr,
    p: Expr,
    q: Expr,
) -> Result<Expr> {
    let ty = typecheck::infer_type_in(ctx, tctx, a)?;
    let trans = eq_lemma(ctx, "trans");
    ctx.mk_app_l(trans, &[ty, a.clone(), b.clone(), c.clone(), p, q])
}

/// A rewriter built from a universally quantified equation
/// `∀ x̄. L = R` and its proof term.
pub struct TheoremRw {
    num_vars: usize,
    lhs: Expr,
    rhs: Expr,
    proof: Expr,
}

impl TheoremRw {
    /// Build from the equation's statement and its proof term.
    ///
    /// Fails if the statement is not a (possibly quantified) equation,
    /// or if the right-hand side mentions a variable the left-hand side
    /// does not bind.
    pub fn new(thm_ty: &Expr, proof: Expr) -> Result<Self> {
        let (domains, body) = thm_ty.unfold_pi();
        let num_vars = domains.len();
        let (lhs, rhs) = body
            .unfold_eq()
            .ok_or_else(|| Error::new("theorem rewriter needs an equational conclusion"))?;
        for v in 0..num_vars as u32 {
            if rhs.has_free_var_in_range(v, v + 1) && !lhs.has_free_var_in_range(v, v + 1) {
                return Err(errorstr!(
                    "variable #{} occurs in the RHS of the rule but not in the LHS",
                    v
                ));
            }
        }
        Ok(TheoremRw {
            num_vars,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            proof,
        })
    }
}

impl Rewriter for TheoremRw {
    fn try_rewrite(&self, ctx: &mut Ctx, _tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        let mut subst: Vec<Option<Expr>> = vec![None; self.num_vars];
        if !hop_match(ctx, &self.lhs, e, &mut subst)? {
            return Ok(None);
        }
        let mut bindings = Vec::with_capacity(self.num_vars);
        for s in &subst {
            match s {
                Some(b) => bindings.push(b.clone()),
                // the equation did not determine every variable
                None => return Ok(None),
            }
        }
        // subst[0] binds the outermost variable; instantiation wants the
        // innermost (de Bruijn 0) first
        let args: Vec<Expr> = bindings.iter().rev().cloned().collect();
        let expr = ctx.instantiate(&self.rhs, &args)?;
        let proof = ctx.mk_app_l(self.proof.clone(), &bindings)?;
        logtrace!("rw.theorem {:?} => {:?}", e, expr);
        Ok(Some(Rw { expr, proof }))
    }
}

impl fmt::Debug for TheoremRw {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        write!(out, "(theorem-rw {:?} => {:?})", self.lhs, self.rhs)
    }
}

/// Sequential composition: every rewriter must step; proofs are chained
/// with `trans` left-to-right.
#[derive(Debug)]
pub struct ThenRw {
    rws: Vec<Box<dyn Rewriter>>,
}

impl ThenRw {
    pub fn new(rws: Vec<Box<dyn Rewriter>>) -> Self {
        ThenRw { rws }
    }
}

impl Rewriter for ThenRw {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        let mut acc: Option<Rw> = None;
        let mut cur = e.clone();
        for rw in &self.rws {
            let step = match rw.try_rewrite(ctx, tctx, &cur)? {
                None => return Ok(None), // composition fails with its parts
                Some(s) => s,
            };
            acc = Some(match acc {
                None => step.clone(),
                Some(prev) => {
                    let proof =
                        mk_trans(ctx, tctx, e, &cur, &step.expr, prev.proof, step.proof.clone())?;
                    Rw {
                        expr: step.expr.clone(),
                        proof,
                    }
                }
            });
            cur = step.expr;
        }
        Ok(acc)
    }
}

/// Alternative: the first rewriter that steps wins.
#[derive(Debug)]
pub struct OrelseRw {
    rws: Vec<Box<dyn Rewriter>>,
}

impl OrelseRw {
    pub fn new(rws: Vec<Box<dyn Rewriter>>) -> Self {
        OrelseRw { rws }
    }
}

impl Rewriter for OrelseRw {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        for rw in &self.rws {
            if let Some(r) = rw.try_rewrite(ctx, tctx, e)? {
                return Ok(Some(r));
            }
        }
        Ok(None)
    }
}

/// The identity rewriter: `(t, refl t)`.
#[derive(Debug, Clone, Copy)]
pub struct IdRw;

impl Rewriter for IdRw {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        Ok(Some(mk_refl(ctx, tctx, e)?))
    }
}

/// The rewriter that never steps.
#[derive(Debug, Clone, Copy)]
pub struct FailRw;

impl Rewriter for FailRw {
    fn try_rewrite(&self, _ctx: &mut Ctx, _tctx: &Context, _e: &Expr) -> Result<Option<Rw>> {
        Ok(None)
    }
}

/// `try r = r | id`: never fails.
#[derive(Debug)]
pub struct TryRw(pub Box<dyn Rewriter>);

impl Rewriter for TryRw {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        match self.0.try_rewrite(ctx, tctx, e)? {
            Some(r) => Ok(Some(r)),
            None => Ok(Some(mk_refl(ctx, tctx, e)?)),
        }
    }
}

/// Fixed point of `try`: rewrite until the inner rewriter misses.
/// Termination is the caller's responsibility; the interrupt flag is
/// polled between iterations.
#[derive(Debug)]
pub struct RepeatRw {
    inner: Box<dyn Rewriter>,
    interrupt: Interrupt,
}

impl RepeatRw {
    pub fn new(inner: Box<dyn Rewriter>) -> Self {
        RepeatRw {
            inner,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(inner: Box<dyn Rewriter>, interrupt: Interrupt) -> Self {
        RepeatRw { inner, interrupt }
    }
}

impl Rewriter for RepeatRw {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        let mut acc: Option<Rw> = None;
        let mut cur = e.clone();
        loop {
            self.interrupt.check()?;
            match self.inner.try_rewrite(ctx, tctx, &cur)? {
                None => break,
                Some(step) => {
                    acc = Some(match acc {
                        None => step.clone(),
                        Some(prev) => {
                            let proof = mk_trans(
                                ctx,
                                tctx,
                                e,
                                &cur,
                                &step.expr,
                                prev.proof,
                                step.proof.clone(),
                            )?;
                            Rw {
                                expr: step.expr.clone(),
                                proof,
                            }
                        }
                    });
                    cur = step.expr;
                }
            }
        }
        match acc {
            Some(r) => Ok(Some(r)),
            // like `try`, repeat never fails
            None => Ok(Some(mk_refl(ctx, tctx, e)?)),
        }
    }
}

/// Split an application into its prefix and final argument.
fn split_app(ctx: &mut Ctx, e: &Expr) -> Result<Option<(Expr, Expr)>> {
    match e.view() {
        EApp(args) => {
            let n = args.len();
            let last = args[n - 1].clone();
            let prefix = if n == 2 {
                args[0].clone()
            } else {
                let head = args[0].clone();
                ctx.mk_app_l(head, &args[1..n - 1])?
            };
            Ok(Some((prefix, last)))
        }
        _ => Ok(None),
    }
}

/// The `A` and `B` of `f : A → B`, refusing dependent functions.
fn arrow_parts(ctx: &mut Ctx, tctx: &Context, f: &Expr) -> Result<Option<(Expr, Expr)>> {
    let fty = typecheck::infer_type_in(ctx, tctx, f)?;
    match fty.as_pi() {
        Some((_, dom, body)) if !body.has_free_var_in_range(0, 1) => {
            let b = ctx.lower_free_vars(&body.clone(), 1, 1)?;
            Ok(Some((dom.clone(), b)))
        }
        _ => Ok(None),
    }
}

/// Congruence: descend into an application, lifting sub-proofs with
/// `congr2` (argument only) or `congr` (function and argument).
#[derive(Debug)]
pub struct AppCongrRw<'a>(pub Box<dyn Rewriter + 'a>);

impl<'a> Rewriter for AppCongrRw<'a> {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        let (f, a) = match split_app(ctx, e)? {
            None => return Ok(None),
            Some(p) => p,
        };
        let rf = self.0.try_rewrite(ctx, tctx, &f)?;
        let ra = self.0.try_rewrite(ctx, tctx, &a)?;
        if rf.is_none() && ra.is_none() {
            return Ok(None);
        }
        let (ty_a, ty_b) = match arrow_parts(ctx, tctx, &f)? {
            None => return Ok(None), // dependent application: unsupported
            Some(p) => p,
        };
        Ok(Some(match (rf, ra) {
            (None, Some(ra)) => {
                // congr2 A B a a' f q : f a = f a'
                let congr2 = eq_lemma(ctx, "congr2");
                let proof = ctx.mk_app_l(
                    congr2,
                    &[ty_a, ty_b, a.clone(), ra.expr.clone(), f.clone(), ra.proof],
                )?;
                let expr = ctx.mk_app(f, ra.expr)?;
                Rw { expr, proof }
            }
            (Some(rf), ra) => {
                // congr A B f g a b p q : f a = g b
                let ra = match ra {
                    Some(r) => r,
                    None => mk_refl(ctx, tctx, &a)?,
                };
                let congr = eq_lemma(ctx, "congr");
                let proof = ctx.mk_app_l(
                    congr,
                    &[
                        ty_a,
                        ty_b,
                        f.clone(),
                        rf.expr.clone(),
                        a.clone(),
                        ra.expr.clone(),
                        rf.proof,
                        ra.proof,
                    ],
                )?;
                let expr = ctx.mk_app(rf.expr, ra.expr)?;
                Rw { expr, proof }
            }
            (None, None) => unreachable!("checked above"),
        }))
    }
}

/// Why a simplification step was abandoned; reported to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unsupported,
    TypeMismatch,
    AssumptionNotProved,
    MissingArgument,
    LoopPrevention,
    AbstractionBody,
}

/// Observer of the bottom-up simplifier. Hooks record progress without
/// affecting semantics.
pub trait SimpMonitor {
    /// The simplifier is starting to process `e`.
    fn pre_step(&mut self, _e: &Expr) {}
    /// `e` was rewritten into `new_e`.
    fn rewrite_step(&mut self, _e: &Expr, _new_e: &Expr, _proof: &Expr) {}
    /// A step on `e` was abandoned.
    fn failed_step(&mut self, _e: &Expr, _k: FailureKind) {}
}

/// Maximum recursion depth before the simplifier reports "term too
/// deep" instead of crashing.
const MAX_SIMP_DEPTH: u32 = 512;

/// Rewrite `e` bottom-up with `rw`, applying it to every application
/// subterm starting from the leaves and combining proofs with the
/// congruence laws.
pub fn rewrite_bottom_up(
    ctx: &mut Ctx,
    tctx: &Context,
    rw: &dyn Rewriter,
    e: &Expr,
    monitor: &mut dyn SimpMonitor,
) -> Result<Res> {
    rewrite_bottom_up_(ctx, tctx, rw, e, monitor, 0)
}

fn rewrite_bottom_up_(
    ctx: &mut Ctx,
    tctx: &Context,
    rw: &dyn Rewriter,
    e0: &Expr,
    monitor: &mut dyn SimpMonitor,
    depth: u32,
) -> Result<Res> {
    if depth > MAX_SIMP_DEPTH {
        return Err(Error::too_deep());
    }
    monitor.pre_step(e0);

    let mut acc: Option<Rw> = None;
    let mut cur = e0.clone();

    // subterms first (only applications are entered; binders are left
    // alone)
    if let EApp(..) = cur.view() {
        let congr = AppCongrRw(Box::new(BottomUpStep {
            rw,
            depth: depth + 1,
        }));
        match congr.try_rewrite(ctx, tctx, &cur) {
            Ok(Some(step)) => chain_step(ctx, tctx, e0, &mut acc, &mut cur, step, monitor)?,
            Ok(None) => (),
            Err(e) if e.is_too_deep() || e.is_interrupted() => return Err(e),
            Err(_) => monitor.failed_step(&cur, FailureKind::Unsupported),
        }
    } else if let ELambda(..) | EPi(..) = cur.view() {
        monitor.failed_step(&cur, FailureKind::AbstractionBody);
    }

    // then the root, to a fixpoint
    loop {
        match rw.try_rewrite(ctx, tctx, &cur)? {
            None => break,
            Some(step) => {
                if step.expr == cur {
                    monitor.failed_step(&cur, FailureKind::LoopPrevention);
                    break;
                }
                chain_step(ctx, tctx, e0, &mut acc, &mut cur, step, monitor)?;
            }
        }
    }

    Ok(match acc {
        Some(r) => Res::RwStep(r),
        None => Res::RwSame,
    })
}

/// Record a step in the accumulated rewrite, chaining proofs with
/// `trans`.
fn chain_step(
    ctx: &mut Ctx,
    tctx: &Context,
    e0: &Expr,
    acc: &mut Option<Rw>,
    cur: &mut Expr,
    step: Rw,
    monitor: &mut dyn SimpMonitor,
) -> Result<()> {
    monitor.rewrite_step(cur, &step.expr, &step.proof);
    *acc = Some(match acc.take() {
        None => step.clone(),
        Some(prev) => {
            let proof = mk_trans(ctx, tctx, e0, cur, &step.expr, prev.proof, step.proof.clone())?;
            Rw {
                expr: step.expr.clone(),
                proof,
            }
        }
    });
    *cur = step.expr;
    Ok(())
}

/// Adapter: applies the bottom-up pass as a rewriter on subterms.
struct BottomUpStep<'a> {
    rw: &'a dyn Rewriter,
    depth: u32,
}

impl<'a> fmt::Debug for BottomUpStep<'a> {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        write!(out, "(bottom-up-step depth={})", self.depth)
    }
}

impl<'a> Rewriter for BottomUpStep<'a> {
    fn try_rewrite(&self, ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Option<Rw>> {
        let mut mon = NoopMonitor;
        match rewrite_bottom_up_(ctx, tctx, self.rw, e, &mut mon, self.depth)? {
            Res::RwSame => Ok(None),
            Res::RwStep(r) => Ok(Some(r)),
        }
    }
}

/// Monitor that records nothing.
pub struct NoopMonitor;

impl SimpMonitor for NoopMonitor {}
