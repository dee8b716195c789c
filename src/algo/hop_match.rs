//! # Higher-order pattern matching.
//!
//! Matches a pattern `p` whose free variables with de Bruijn index
//! `>= ctx_size` are *logical* (to be solved) against a target `t`,
//! with β-reduction for assigned heads and projection for higher-order
//! patterns (a logical head applied to distinct locally bound
//! variables).
//!
//! The substitution is a caller-provided array; position
//! `len - vidx - 1` holds the binding for the logical variable with
//! relative index `vidx`. An out-of-range logical index is a fatal
//! error; every other mismatch is an ordinary `false`.

use crate::{
    error::{Error, Result},
    kernel::{expr::DbIndex, Context, Ctx, Expr, ExprView},
    logtrace,
};

use ExprView::*;

/// Match `p` against `t`, starting in the empty context. On success the
/// substitution has been extended; the caller saves and restores it when
/// trying several patterns.
pub fn hop_match(
    ctx: &mut Ctx,
    p: &Expr,
    t: &Expr,
    subst: &mut [Option<Expr>],
) -> Result<bool> {
    let mut m = HopMatch { ctx, subst };
    m.match_(p, t, &Context::empty(), 0)
}

struct HopMatch<'a> {
    ctx: &'a mut Ctx,
    subst: &'a mut [Option<Expr>],
}

impl<'a> HopMatch<'a> {
    fn is_free_var(&self, x: &Expr, ctx_size: DbIndex) -> bool {
        matches!(x.view(), EVar(i) if *i >= ctx_size)
    }

    fn is_locally_bound(&self, x: &Expr, ctx_size: DbIndex) -> bool {
        matches!(x.view(), EVar(i) if *i < ctx_size)
    }

    fn get_subst(&self, x: &Expr, ctx_size: DbIndex) -> Result<Option<Expr>> {
        debug_assert!(self.is_free_var(x, ctx_size));
        let idx = x.as_var().expect("free variable") - ctx_size;
        let sz = self.subst.len() as DbIndex;
        if idx >= sz {
            return Err(Error::new("ill-formed higher-order matching problem"));
        }
        Ok(self.subst[(sz - idx - 1) as usize].clone())
    }

    fn has_locally_bound_var(&self, t: &Expr, ctx_size: DbIndex) -> bool {
        t.has_free_var_in_range(0, ctx_size)
    }

    fn assign(&mut self, p: &Expr, t: &Expr, ctx_size: DbIndex) -> Result<()> {
        debug_assert!(!self.has_locally_bound_var(t, ctx_size));
        let idx = p.as_var().expect("free variable") - ctx_size;
        let sz = self.subst.len() as DbIndex;
        let lowered = self.ctx.lower_free_vars(t, ctx_size, ctx_size)?;
        self.subst[(sz - idx - 1) as usize] = Some(lowered);
        Ok(())
    }

    /// Are the arguments distinct locally bound variables? Collects
    /// their indices in order.
    fn args_are_distinct_locally_bound_vars(
        &self,
        args: &[Expr],
        ctx_size: DbIndex,
        vars: &mut Vec<DbIndex>,
    ) -> bool {
        vars.clear();
        for a in args {
            if !self.is_locally_bound(a, ctx_size) {
                return false;
            }
            let i = a.as_var().expect("locally bound variable");
            if vars.contains(&i) {
                return false;
            }
            vars.push(i);
        }
        true
    }

    fn match_(
        &mut self,
        p: &Expr,
        t: &Expr,
        tctx: &Context,
        ctx_size: DbIndex,
    ) -> Result<bool> {
        debug_assert_eq!(tctx.size(), ctx_size);

        if self.is_free_var(p, ctx_size) {
            match self.get_subst(p, ctx_size)? {
                Some(s) => {
                    let s = self.ctx.lift_free_vars(&s, 0, ctx_size)?;
                    return self.match_(&s, t, tctx, ctx_size);
                }
                None => {
                    if self.has_locally_bound_var(t, ctx_size) {
                        return Ok(false);
                    }
                    self.assign(p, t, ctx_size)?;
                    return Ok(true);
                }
            }
        } else if let EApp(pargs) = p.view() {
            if self.is_free_var(&pargs[0], ctx_size) {
                match self.get_subst(&pargs[0], ctx_size)? {
                    Some(s) => {
                        let f = self.ctx.lift_free_vars(&s, 0, ctx_size)?;
                        let new_p = self.ctx.apply_beta(&f, &pargs[1..])?;
                        return self.match_(&new_p, t, tctx, ctx_size);
                    }
                    None => {
                        // Check if p is a higher-order pattern.
                        // That is, all arguments are distinct locally bound variables
                        let mut vars = Vec::with_capacity(pargs.len() - 1);
                        if self.args_are_distinct_locally_bound_vars(
                            &pargs[1..],
                            ctx_size,
                            &mut vars,
                        ) {
                            let head = pargs[0].clone();
                            return match project_over_vars(self.ctx, t, tctx, ctx_size, &vars)? {
                                Some(new_t) => {
                                    self.assign(&head, &new_t, ctx_size)?;
                                    Ok(true)
                                }
                                None => Ok(false),
                            };
                        }
                    }
                }
            }
        }

        if p == t {
            return Ok(true);
        }

        if let (Some((a1, b1)), Some((a2, b2))) = (p.unfold_eq(), t.unfold_eq()) {
            return Ok(self.match_(a1, a2, tctx, ctx_size)? && self.match_(b1, b2, tctx, ctx_size)?);
        }

        match (p.view(), t.view()) {
            (EApp(pargs), EApp(targs)) => {
                // align arguments from the end; a leftover prefix on one
                // side matches the other side's head (matching is
                // associative in the application-list sense)
                let mut i1 = pargs.len();
                let mut i2 = targs.len();
                while i1 > 0 && i2 > 0 {
                    i1 -= 1;
                    i2 -= 1;
                    let ok = if i1 == 0 && i2 > 0 {
                        let prefix = self.mk_app_prefix(targs, i2 + 1)?;
                        self.match_(&pargs[0], &prefix, tctx, ctx_size)?
                    } else if i2 == 0 && i1 > 0 {
                        let prefix = self.mk_app_prefix(pargs, i1 + 1)?;
                        self.match_(&prefix, &targs[0], tctx, ctx_size)?
                    } else {
                        self.match_(&pargs[i1], &targs[i2], tctx, ctx_size)?
                    };
                    if !ok {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (ELambda(_, ty1, b1), ELambda(n2, ty2, b2)) | (EPi(_, ty1, b1), EPi(n2, ty2, b2)) => {
                if !self.match_(ty1, ty2, tctx, ctx_size)? {
                    return Ok(false);
                }
                let inner = tctx.extend(n2.clone(), Some(ty2.clone()));
                self.match_(b1, b2, &inner, ctx_size + 1)
            }
            (ELet(_, ty1, v1, b1), ELet(n2, ty2, v2, b2)) => {
                // the pattern must mention the same let shape; the
                // domain is compared when both sides annotate
                if let (Some(ty1), Some(ty2)) = (ty1, ty2) {
                    if !self.match_(ty1, ty2, tctx, ctx_size)? {
                        return Ok(false);
                    }
                }
                if !self.match_(v1, v2, tctx, ctx_size)? {
                    return Ok(false);
                }
                let inner = tctx.extend(n2.clone(), ty2.clone());
                self.match_(b1, b2, &inner, ctx_size + 1)
            }
            // remaining atoms would have been caught by `p == t`
            _ => Ok(false),
        }
    }

    fn mk_app_prefix(&mut self, args: &[Expr], n: usize) -> Result<Expr> {
        debug_assert!(n >= 1 && n <= args.len());
        if n == 1 {
            Ok(args[0].clone())
        } else {
            self.ctx.mk_app_l(args[0].clone(), &args[1..n])
        }
    }
}

/// Rewrite every free occurrence in `t` of a permitted locally bound
/// variable into the de Bruijn index of its position in `vars`:
///
/// ```text
///     vars[vars_size - 1] ==> #0
///     ...
///     vars[0]             ==> #vars_size - 1
/// ```
///
/// `None` when `t` mentions a locally bound variable not in
/// `vars[..vars_size]`.
fn proj_core(
    ctx: &mut Ctx,
    t: &Expr,
    offset: DbIndex,
    ctx_size: DbIndex,
    vars: &[DbIndex],
    vars_size: usize,
) -> Result<Option<Expr>> {
    let r = match t.view() {
        EVar(v) => {
            let v = *v;
            if v < offset {
                return Ok(Some(t.clone()));
            }
            let vidx = v - offset;
            if vidx < ctx_size {
                // locally bound
                for (i, w) in vars.iter().enumerate().take(vars_size) {
                    if *w == vidx {
                        return Ok(Some(
                            ctx.mk_var(offset + vars_size as DbIndex - i as DbIndex - 1),
                        ));
                    }
                }
                return Ok(None);
            } else if ctx_size != vars_size as DbIndex {
                Some(ctx.mk_var(offset + vidx - ctx_size + vars_size as DbIndex))
            } else {
                Some(t.clone())
            }
        }
        EConst(..) | ESort(..) | EValue(..) => Some(t.clone()),
        ev => {
            // shallow map, aborting on the first bad variable
            let mut failed = false;
            let ev2 = ev.map(
                |u, k| {
                    if failed {
                        return Ok(u.clone());
                    }
                    match proj_core(ctx, u, offset + k, ctx_size, vars, vars_size)? {
                        Some(u2) => Ok(u2),
                        None => {
                            failed = true;
                            Ok(u.clone())
                        }
                    }
                },
                0,
            )?;
            if failed {
                None
            } else {
                Some(ctx.rebuild_view(ev2)?)
            }
        }
    };
    Ok(r)
}

/// Compute the projection of `t` over the locally bound variables
/// `vars`: `Some(fun x1 … xn. t')` when every locally bound variable of
/// `t` occurs in `vars`, with each binder's domain taken from the
/// context entry of the corresponding variable (projected in its own
/// sub-context). `None` otherwise.
pub(crate) fn project_over_vars(
    ctx: &mut Ctx,
    t: &Expr,
    tctx: &Context,
    ctx_size: DbIndex,
    vars: &[DbIndex],
) -> Result<Option<Expr>> {
    logtrace!("hop.project {:?} over {:?}", t, vars);
    let t_prime = match proj_core(ctx, t, 0, ctx_size, vars, vars.len())? {
        None => return Ok(None),
        Some(t2) => t2,
    };
    let mut r = t_prime;
    let mut i = vars.len();
    while i > 0 {
        i -= 1;
        let vidx = vars[i];
        let (entry, entry_ctx) = tctx.lookup_ext(vidx)?;
        let d = match &entry.domain {
            None => return Ok(None),
            Some(d) => d.clone(),
        };
        let name = entry.name.clone();
        let entry_ctx_size = entry_ctx.size();
        let new_d = match proj_core(ctx, &d, 0, entry_ctx_size, vars, i)? {
            None => return Ok(None),
            Some(d2) => d2,
        };
        r = ctx.mk_lambda(name, new_d, r)?;
    }
    Ok(Some(r))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::Name;

    // pattern `?m` (logical var over empty ctx) against a constant
    #[test]
    fn test_first_order_var() {
        let mut ctx = Ctx::new();
        let p = ctx.mk_var(0); // logical: idx >= ctx_size (0)
        let t = ctx.mk_const_str("a");
        let mut subst = vec![None];
        assert!(hop_match(&mut ctx, &p, &t, &mut subst).unwrap());
        assert_eq!(subst[0].as_ref(), Some(&t));
    }

    #[test]
    fn test_out_of_range_is_fatal() {
        let mut ctx = Ctx::new();
        let p = ctx.mk_var(3);
        let t = ctx.mk_const_str("a");
        let mut subst = vec![None];
        assert!(hop_match(&mut ctx, &p, &t, &mut subst).is_err());
    }

    #[test]
    fn test_structural() {
        let mut ctx = Ctx::new();
        let f = ctx.mk_const_str("f");
        let a = ctx.mk_const_str("a");
        let v0 = ctx.mk_var(0);
        let v1 = ctx.mk_var(1);
        // pattern: f ?x ?y, target: f a (f a a)
        let p = ctx.mk_app_l(f.clone(), &[v1, v0]).unwrap();
        let faa = ctx.mk_app_l(f.clone(), &[a.clone(), a.clone()]).unwrap();
        let t = ctx.mk_app_l(f, &[a.clone(), faa.clone()]).unwrap();
        let mut subst = vec![None, None];
        assert!(hop_match(&mut ctx, &p, &t, &mut subst).unwrap());
        // subst[0] binds the var with highest index (?x = Var 1)
        assert_eq!(subst[0].as_ref(), Some(&a));
        assert_eq!(subst[1].as_ref(), Some(&faa));
    }

    #[test]
    fn test_nonlinear_mismatch() {
        let mut ctx = Ctx::new();
        let f = ctx.mk_const_str("f");
        let a = ctx.mk_const_str("a");
        let b = ctx.mk_const_str("b");
        let v0 = ctx.mk_var(0);
        // pattern: f ?x ?x, target: f a b
        let p = ctx.mk_app_l(f.clone(), &[v0.clone(), v0]).unwrap();
        let t = ctx.mk_app_l(f, &[a, b]).unwrap();
        let mut subst = vec![None];
        assert!(!hop_match(&mut ctx, &p, &t, &mut subst).unwrap());
    }

    #[test]
    fn test_app_arity_split() {
        let mut ctx = Ctx::new();
        let f = ctx.mk_const_str("f");
        let a = ctx.mk_const_str("a");
        let b = ctx.mk_const_str("b");
        let v0 = ctx.mk_var(0);
        // pattern: ?x b, target: f a b; ?x must match (f a)
        let p = ctx.mk_app(v0, b.clone()).unwrap();
        let t = ctx.mk_app_l(f.clone(), &[a.clone(), b]).unwrap();
        let mut subst = vec![None];
        assert!(hop_match(&mut ctx, &p, &t, &mut subst).unwrap());
        let fa = ctx.mk_app(f, a).unwrap();
        assert_eq!(subst[0].as_ref(), Some(&fa));
    }

    #[test]
    fn test_under_binder() {
        let mut ctx = Ctx::new();
        let b = ctx.mk_bool();
        let v0 = ctx.mk_var(0);
        let v1 = ctx.mk_var(1);
        // pattern: \x:Bool. ?y   (y cannot capture x)
        let p = ctx
            .mk_lambda(Name::from_str("x"), b.clone(), v1)
            .unwrap();
        let a = ctx.mk_const_str("a");
        let t_ok = ctx
            .mk_lambda(Name::from_str("x"), b.clone(), a.clone())
            .unwrap();
        let mut subst = vec![None];
        assert!(hop_match(&mut ctx, &p, &t_ok, &mut subst).unwrap());
        assert_eq!(subst[0].as_ref(), Some(&a));

        // identity: \x. x; the body is the bound variable, not matchable
        // by a logical variable
        let t_id = ctx.mk_lambda(Name::from_str("x"), b, v0).unwrap();
        let mut subst = vec![None];
        assert!(!hop_match(&mut ctx, &p, &t_id, &mut subst).unwrap());
    }

    #[test]
    fn test_let_componentwise() {
        let mut ctx = Ctx::new();
        let ty = ctx.mk_type();
        ctx.add_var("Nat", ty).unwrap();
        let b = ctx.mk_bool();
        let nat = ctx.mk_const_str("Nat");
        let a = ctx.mk_const_str("a");
        let v0 = ctx.mk_var(0);
        let x = Name::from_str("x");

        // pattern: let x : Bool := ?y in x; the value position is
        // outside the binder, so the logical variable there is #0
        let y_log = ctx.mk_var(0);
        let p = ctx
            .mk_let(x.clone(), Some(b.clone()), y_log.clone(), v0.clone())
            .unwrap();
        let t_ok = ctx
            .mk_let(x.clone(), Some(b.clone()), a.clone(), v0.clone())
            .unwrap();
        let mut subst = vec![None];
        assert!(hop_match(&mut ctx, &p, &t_ok, &mut subst).unwrap());
        assert_eq!(subst[0].as_ref(), Some(&a));

        // same value and body, but the annotated domains differ
        let t_nat = ctx
            .mk_let(x.clone(), Some(nat), a.clone(), v0.clone())
            .unwrap();
        let mut subst = vec![None];
        assert!(!hop_match(&mut ctx, &p, &t_nat, &mut subst).unwrap());

        // an unannotated pattern leaves the target's domain alone
        let p_bare = ctx.mk_let(x, None, y_log, v0).unwrap();
        let mut subst = vec![None];
        assert!(hop_match(&mut ctx, &p_bare, &t_nat, &mut subst).unwrap());
        assert_eq!(subst[0].as_ref(), Some(&a));
    }

    #[test]
    fn test_higher_order_projection() {
        // `?F b a` against `f b (f a b)` with a:N, b:M in scope.
        let mut ctx = Ctx::new();
        let ty = ctx.mk_type();
        let n = ctx.mk_const_str("N");
        let m = ctx.mk_const_str("M");
        ctx.add_var("N", ty.clone()).unwrap();
        ctx.add_var("M", ty).unwrap();
        let m2m = ctx.mk_arrow(m.clone(), m.clone()).unwrap();
        let f_ty = ctx.mk_arrow(n.clone(), m2m).unwrap();
        ctx.add_var("f", f_ty).unwrap();
        let f = ctx.mk_const_str("f");

        // context [a:N, b:M], b most recent: b = #0, a = #1
        let tctx = Context::empty()
            .extend(Name::from_str("a"), Some(n.clone()))
            .extend(Name::from_str("b"), Some(m.clone()));
        let ctx_size = 2;
        let b_var = ctx.mk_var(0);
        let a_var = ctx.mk_var(1);
        let f_log = ctx.mk_var(2); // logical variable ?F

        let p = ctx
            .mk_app_l(f_log, &[b_var.clone(), a_var.clone()])
            .unwrap();
        let inner = ctx
            .mk_app_l(f.clone(), &[a_var.clone(), b_var.clone()])
            .unwrap();
        let t = ctx.mk_app_l(f.clone(), &[b_var, inner]).unwrap();

        let mut subst = vec![None];
        let mut mm = HopMatch {
            ctx: &mut ctx,
            subst: &mut subst,
        };
        assert!(mm.match_(&p, &t, &tctx, ctx_size).unwrap());

        let sol = subst[0].clone().expect("?F solved");
        // applying the solution to the pattern arguments must β-reduce
        // to the target (projected back out of the local context)
        let x0 = ctx.mk_var(0);
        let x1 = ctx.mk_var(1);
        let applied = ctx.apply_beta(&sol, &[x0, x1]).unwrap();
        let applied = ctx.beta_normalize(&applied).unwrap();
        // target with b=#0 ↦ #0, a=#1 ↦ #1 : same shape
        assert_eq!(applied, t);
    }
}
