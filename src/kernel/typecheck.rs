//! # Type checking against the kernel.
//!
//! A thin checker: it infers a type for every term, and wherever a
//! computed type must meet an expected one with metavariables on either
//! side, it emits an `eq` constraint for the elaborator instead of
//! failing. Rigid mismatches on application arguments consult the
//! coercion table (when a frontend is supplied) and wrap the argument;
//! coercion insertion is thus a checker move, never a matcher rule.

use super::{Context, Ctx, Expr, ExprView, Level, MetavarEnv};
use crate::{
    elab::{Constraint, Justification},
    error::{Error, Result},
    errorstr,
    frontend::Frontend,
};

use ExprView::*;

/// Replace every placeholder in `e` by a fresh metavariable declared in
/// the context of its occurrence.
pub fn replace_placeholders(
    ctx: &mut Ctx,
    menv: &mut MetavarEnv,
    tctx: &Context,
    e: &Expr,
) -> Result<Expr> {
    if Ctx::is_placeholder(e) {
        return Ok(menv.mk_metavar(ctx, tctx));
    }
    Ok(match e.view() {
        EVar(..) | EConst(..) | ESort(..) | EValue(..) | EMeta(..) => e.clone(),
        EApp(args) => {
            let mut new_args = Vec::with_capacity(args.len());
            for a in args.iter() {
                new_args.push(replace_placeholders(ctx, menv, tctx, a)?);
            }
            let hd = new_args.remove(0);
            ctx.mk_app_l(hd, &new_args)?
        }
        ELambda(n, ty, body) => {
            let ty2 = replace_placeholders(ctx, menv, tctx, ty)?;
            let inner = tctx.extend(n.clone(), Some(ty2.clone()));
            let b2 = replace_placeholders(ctx, menv, &inner, body)?;
            ctx.mk_lambda(n.clone(), ty2, b2)?
        }
        EPi(n, ty, body) => {
            let ty2 = replace_placeholders(ctx, menv, tctx, ty)?;
            let inner = tctx.extend(n.clone(), Some(ty2.clone()));
            let b2 = replace_placeholders(ctx, menv, &inner, body)?;
            ctx.mk_pi(n.clone(), ty2, b2)?
        }
        ELet(n, ty, v, body) => {
            let ty2 = match ty {
                None => None,
                Some(t) => Some(replace_placeholders(ctx, menv, tctx, t)?),
            };
            let v2 = replace_placeholders(ctx, menv, tctx, v)?;
            let inner = tctx.extend(n.clone(), ty2.clone());
            let b2 = replace_placeholders(ctx, menv, &inner, body)?;
            ctx.mk_let(n.clone(), ty2, v2, b2)?
        }
        EEq(a, b) => {
            let a2 = replace_placeholders(ctx, menv, tctx, a)?;
            let b2 = replace_placeholders(ctx, menv, tctx, b)?;
            ctx.mk_eq(a2, b2)?
        }
    })
}

/// Check `e` in context `tctx`, pushing the unification constraints the
/// elaborator will have to solve. Returns the (possibly coerced)
/// elaborated term together with its type.
pub fn check(
    ctx: &mut Ctx,
    fe: Option<&Frontend>,
    menv: &mut MetavarEnv,
    tctx: &Context,
    e: &Expr,
    ucs: &mut Vec<Constraint>,
) -> Result<(Expr, Expr)> {
    let r = match e.view() {
        EVar(i) => {
            let entry = tctx.lookup(*i)?;
            let dom = entry
                .domain
                .clone()
                .ok_or_else(|| Error::new("variable without a declared type"))?;
            let ty = ctx.lift_free_vars(&dom, 0, i + 1)?;
            (e.clone(), ty)
        }
        EConst(n) => {
            let ty = ctx.decl_type(n)?;
            (e.clone(), ty)
        }
        ESort(l) => {
            let ty = ctx.mk_sort(l.succ());
            (e.clone(), ty)
        }
        EValue(v) => (e.clone(), v.ty().clone()),
        EMeta(id, mctx) => {
            let ty = menv.ensure_ty(ctx, *id)?;
            let ty = ctx.apply_meta_ctx(mctx, &ty)?;
            (e.clone(), ty)
        }
        EEq(a, b) => {
            // the equality is heterogeneous: no constraint between the
            // types of the two sides
            let (a2, _) = check(ctx, fe, menv, tctx, a, ucs)?;
            let (b2, _) = check(ctx, fe, menv, tctx, b, ucs)?;
            (ctx.mk_eq(a2, b2)?, ctx.mk_bool())
        }
        ELambda(n, ty, body) => {
            let (ty2, tyty) = check(ctx, fe, menv, tctx, ty, ucs)?;
            ensure_sort(ctx, tctx, &tyty, ucs)?;
            let inner = tctx.extend(n.clone(), Some(ty2.clone()));
            let (b2, bty) = check(ctx, fe, menv, &inner, body, ucs)?;
            let term = ctx.mk_lambda(n.clone(), ty2.clone(), b2)?;
            let ty = ctx.mk_pi(n.clone(), ty2, bty)?;
            (term, ty)
        }
        EPi(n, ty, body) => {
            let (ty2, tyty) = check(ctx, fe, menv, tctx, ty, ucs)?;
            ensure_sort(ctx, tctx, &tyty, ucs)?;
            let inner = tctx.extend(n.clone(), Some(ty2.clone()));
            let (b2, bty) = check(ctx, fe, menv, &inner, body, ucs)?;
            let term = ctx.mk_pi(n.clone(), ty2, b2)?;
            let sort = match (tyty.view(), bty.view()) {
                (ESort(l1), ESort(l2)) => ctx.mk_sort(Level::max(l1, l2)),
                _ => ctx.mk_type(),
            };
            (term, sort)
        }
        ELet(n, ty, v, body) => {
            let (v2, vt) = check(ctx, fe, menv, tctx, v, ucs)?;
            let dom = match ty {
                None => vt,
                Some(t) => {
                    let (t2, _) = check(ctx, fe, menv, tctx, t, ucs)?;
                    constrain_eq(tctx, &vt, &t2, ucs, "let annotation");
                    t2
                }
            };
            let inner = tctx.extend(n.clone(), Some(dom.clone()));
            let (b2, bt) = check(ctx, fe, menv, &inner, body, ucs)?;
            let term = ctx.mk_let(n.clone(), Some(dom), v2.clone(), b2)?;
            let ty = ctx.instantiate(&bt, std::slice::from_ref(&v2))?;
            (term, ty)
        }
        EApp(args) => {
            let (hd, mut fty) = check(ctx, fe, menv, tctx, &args[0], ucs)?;
            let mut new_args = Vec::with_capacity(args.len() - 1);
            for a in &args[1..] {
                let fty_w = whnf_ty(ctx, menv, &fty)?;
                let (dom, rng_of) = match fty_w.view() {
                    EPi(_, dom, rng) => (dom.clone(), Some(rng.clone())),
                    _ if fty_w.has_meta() => {
                        // the head's type is not refined yet: invent an
                        // arrow shape and constrain it
                        let dom = menv.mk_metavar(ctx, tctx);
                        let rng = menv.mk_metavar(ctx, tctx);
                        let arrow = ctx.mk_arrow(dom.clone(), rng.clone())?;
                        constrain_eq(tctx, &fty_w, &arrow, ucs, "function type");
                        fty = rng;
                        (dom, None)
                    }
                    _ => {
                        return Err(errorstr!(
                            "type error: expected a function, head has type {:?}",
                            fty_w
                        ))
                    }
                };
                let a2 = check_arg(ctx, fe, menv, tctx, a, &dom, ucs)?;
                if let Some(rng) = rng_of {
                    fty = ctx.instantiate(&rng, std::slice::from_ref(&a2))?;
                }
                new_args.push(a2);
            }
            (ctx.mk_app_l(hd, &new_args)?, fty)
        }
    };
    Ok(r)
}

/// Check an application argument against the expected domain type,
/// inserting a coercion when both types are rigid and a coercion is
/// registered for the pair.
fn check_arg(
    ctx: &mut Ctx,
    fe: Option<&Frontend>,
    menv: &mut MetavarEnv,
    tctx: &Context,
    arg: &Expr,
    dom: &Expr,
    ucs: &mut Vec<Constraint>,
) -> Result<Expr> {
    let (a2, at) = check(ctx, fe, menv, tctx, arg, ucs)?;
    if at == *dom {
        return Ok(a2);
    }
    if !at.has_meta() && !dom.has_meta() {
        let at_n = ctx.beta_normalize(&at)?;
        let dom_n = ctx.beta_normalize(dom)?;
        if at_n == dom_n {
            return Ok(a2);
        }
        if let Some(fe) = fe {
            if let Some(c) = fe.get_coercion(ctx, &at_n, &dom_n)? {
                return ctx.mk_app(c, a2);
            }
        }
        return Err(errorstr!(
            "type mismatch: argument has type {:?}, expected {:?}",
            at,
            dom
        ));
    }
    constrain_eq(tctx, &at, dom, ucs, "application argument");
    Ok(a2)
}

fn constrain_eq(tctx: &Context, a: &Expr, b: &Expr, ucs: &mut Vec<Constraint>, why: &'static str) {
    ucs.push(Constraint::mk_eq(
        tctx.clone(),
        a.clone(),
        b.clone(),
        Justification::new(why),
    ));
}

/// Weak head normalization of a type: substitute assignments, contract
/// head β-redexes.
fn whnf_ty(ctx: &mut Ctx, menv: &mut MetavarEnv, t: &Expr) -> Result<Expr> {
    let t = menv.instantiate_metavars(ctx, t)?;
    ctx.head_beta_reduce(&t)
}

/// The type of a binder domain must be a sort. A rigid non-sort is a
/// type error; a type still containing holes is constrained to `Type`.
fn ensure_sort(
    ctx: &mut Ctx,
    tctx: &Context,
    t: &Expr,
    ucs: &mut Vec<Constraint>,
) -> Result<()> {
    match t.view() {
        ESort(..) => Ok(()),
        _ if t.has_meta() => {
            let ty = ctx.mk_type();
            constrain_eq(tctx, t, &ty, ucs, "binder domain sort");
            Ok(())
        }
        _ => Err(errorstr!("type error: {:?} is not a sort", t)),
    }
}

/// Infer the type of a closed, metavariable-free term. Fails when the
/// term would need unification constraints to type-check.
pub fn infer_type(ctx: &mut Ctx, e: &Expr) -> Result<Expr> {
    infer_type_in(ctx, &Context::empty(), e)
}

/// Infer the type of a term in an arbitrary context, without a
/// constraint budget.
pub fn infer_type_in(ctx: &mut Ctx, tctx: &Context, e: &Expr) -> Result<Expr> {
    let mut menv = MetavarEnv::new();
    let mut ucs = Vec::new();
    let (_, ty) = check(ctx, None, &mut menv, tctx, e, &mut ucs)?;
    if !ucs.is_empty() {
        return Err(Error::new(
            "cannot infer a type without unification constraints",
        ));
    }
    Ok(ty)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::Name;

    #[test]
    fn test_infer_const_and_app() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        let b2b = ctx.mk_arrow(b.clone(), b.clone()).unwrap();
        ctx.add_var("p", b2b).unwrap();
        ctx.add_var("a", b.clone()).unwrap();
        let p = ctx.mk_const_str("p");
        let a = ctx.mk_const_str("a");
        let pa = ctx.mk_app(p, a).unwrap();
        let ty = infer_type(&mut ctx, &pa).unwrap();
        assert_eq!(ty, b);
    }

    #[test]
    fn test_infer_lambda() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        let v0 = ctx.mk_var(0);
        let id = ctx.mk_lambda(Name::from_str("x"), b.clone(), v0).unwrap();
        let ty = infer_type(&mut ctx, &id).unwrap();
        let b2b = ctx.mk_arrow(b.clone(), b).unwrap();
        assert_eq!(ty, b2b);
    }

    #[test]
    fn test_infer_dependent_app() {
        let mut ctx = Ctx::new();
        let ty = ctx.mk_type();
        // F : pi A : Type. A -> A
        let v0 = ctx.mk_var(0);
        let a2a = ctx.mk_arrow(v0.clone(), v0).unwrap();
        let fty = ctx.mk_pi(Name::from_str("A"), ty.clone(), a2a).unwrap();
        ctx.add_var("F", fty).unwrap();
        ctx.add_var("N", ty).unwrap();
        let n = ctx.mk_const_str("N");
        ctx.add_var("x", n.clone()).unwrap();
        let f = ctx.mk_const_str("F");
        let x = ctx.mk_const_str("x");
        let fnx = ctx.mk_app_l(f, &[n.clone(), x]).unwrap();
        let t = infer_type(&mut ctx, &fnx).unwrap();
        assert_eq!(t, n);
    }

    #[test]
    fn test_rigid_mismatch_is_error() {
        let mut ctx = Ctx::new();
        let ty = ctx.mk_type();
        ctx.add_var("N", ty.clone()).unwrap();
        ctx.add_var("M", ty).unwrap();
        let n = ctx.mk_const_str("N");
        let m = ctx.mk_const_str("M");
        let n2n = ctx.mk_arrow(n.clone(), n).unwrap();
        ctx.add_var("f", n2n).unwrap();
        ctx.add_var("b", m).unwrap();
        let f = ctx.mk_const_str("f");
        let b = ctx.mk_const_str("b");
        let fb = ctx.mk_app(f, b).unwrap();
        assert!(infer_type(&mut ctx, &fb).is_err());
    }

    #[test]
    fn test_placeholders_become_metavars() {
        let mut ctx = Ctx::new();
        let mut menv = MetavarEnv::new();
        let f = ctx.mk_const_str("f");
        let ph = ctx.mk_placeholder();
        let e = ctx.mk_app(f, ph).unwrap();
        let tctx = Context::empty();
        let e2 = replace_placeholders(&mut ctx, &mut menv, &tctx, &e).unwrap();
        assert_eq!(menv.len(), 1);
        let args = e2.as_app().unwrap();
        assert!(args[1].as_meta().is_some());
    }

    #[test]
    fn test_metavar_arg_emits_constraint() {
        let mut ctx = Ctx::new();
        let mut menv = MetavarEnv::new();
        let b = ctx.mk_bool();
        let b2b = ctx.mk_arrow(b.clone(), b).unwrap();
        ctx.add_var("p", b2b).unwrap();
        let p = ctx.mk_const_str("p");
        let tctx = Context::empty();
        let m = menv.mk_metavar(&mut ctx, &tctx);
        let pm = ctx.mk_app(p, m).unwrap();
        let mut ucs = Vec::new();
        let (_, ty) = check(&mut ctx, None, &mut menv, &tctx, &pm, &mut ucs).unwrap();
        assert_eq!(ty, ctx.mk_bool());
        assert!(!ucs.is_empty());
    }
}
