//! End-to-end elaboration scenarios: overload resolution through choice
//! constraints, placeholder inference, and coercion insertion during
//! checking.

use entail::kernel::{check, replace_placeholders, Context, Ctx, Expr, MetavarEnv, Name};
use entail::{Constraint, Elaborator, Frontend, Justification};

/// Declare `Nat`, `Int`, `Real`, the identity functions and the numeric
/// coercion functions used by the overload tests.
fn numeric_env(ctx: &mut Ctx) {
    let ty = ctx.mk_type();
    ctx.add_var("Nat", ty.clone()).unwrap();
    ctx.add_var("Int", ty.clone()).unwrap();
    ctx.add_var("Real", ty).unwrap();
    let nat = ctx.mk_const_str("Nat");
    let int = ctx.mk_const_str("Int");
    let real = ctx.mk_const_str("Real");
    let n2i = ctx.mk_arrow(nat.clone(), int.clone()).unwrap();
    let n2r = ctx.mk_arrow(nat.clone(), real.clone()).unwrap();
    let i2r = ctx.mk_arrow(int.clone(), real.clone()).unwrap();
    ctx.add_var("nat_to_int", n2i).unwrap();
    ctx.add_var("nat_to_real", n2r).unwrap();
    ctx.add_var("int_to_real", i2r).unwrap();
}

fn int_id(ctx: &mut Ctx) -> Expr {
    let int = ctx.mk_const_str("Int");
    let v0 = ctx.mk_var(0);
    ctx.mk_lambda(Name::from_str("x"), int, v0).unwrap()
}

fn nat_id(ctx: &mut Ctx) -> Expr {
    let nat = ctx.mk_const_str("Nat");
    let v0 = ctx.mk_var(0);
    ctx.mk_lambda(Name::from_str("x"), nat, v0).unwrap()
}

#[test]
fn overload_resolution_list_elements_agree() {
    // cons A1 (?m1 a) (cons A2 (?m2 n) (cons A3 (?m3 b) (nil A4)))
    // with a b : Int, n : Nat,
    //   ?m1 ∈ {id_Int, int→real}
    //   ?m2 ∈ {id_Nat, nat→int, nat→real}
    //   ?m3 ∈ {id_Int, int→real}
    let mut ctx = Ctx::new();
    numeric_env(&mut ctx);
    let ty = ctx.mk_type();

    // list : Type → Type
    let t2t = ctx.mk_arrow(ty.clone(), ty.clone()).unwrap();
    ctx.add_var("list", t2t).unwrap();
    let list = ctx.mk_const_str("list");
    // nil : pi A : Type. list A
    let v0 = ctx.mk_var(0);
    let list_a = ctx.mk_app(list.clone(), v0.clone()).unwrap();
    let nil_ty = ctx.mk_pi(Name::from_str("A"), ty.clone(), list_a.clone()).unwrap();
    ctx.add_var("nil", nil_ty).unwrap();
    // cons : pi A : Type. A → list A → list A
    let la2la = ctx.mk_arrow(list_a.clone(), list_a.clone()).unwrap();
    let a2 = ctx.mk_arrow(v0, la2la).unwrap();
    let cons_ty = ctx.mk_pi(Name::from_str("A"), ty, a2).unwrap();
    ctx.add_var("cons", cons_ty).unwrap();

    let int = ctx.mk_const_str("Int");
    let nat = ctx.mk_const_str("Nat");
    ctx.add_var("a", int.clone()).unwrap();
    ctx.add_var("b", int).unwrap();
    ctx.add_var("n", nat).unwrap();

    let mut menv = MetavarEnv::new();
    let tctx = Context::empty();
    let m1 = menv.mk_metavar(&mut ctx, &tctx);
    let m2 = menv.mk_metavar(&mut ctx, &tctx);
    let m3 = menv.mk_metavar(&mut ctx, &tctx);
    let a1 = menv.mk_metavar(&mut ctx, &tctx);
    let a2m = menv.mk_metavar(&mut ctx, &tctx);
    let a3 = menv.mk_metavar(&mut ctx, &tctx);
    let a4 = menv.mk_metavar(&mut ctx, &tctx);

    let cons = ctx.mk_const_str("cons");
    let nil = ctx.mk_const_str("nil");
    let a = ctx.mk_const_str("a");
    let b = ctx.mk_const_str("b");
    let n = ctx.mk_const_str("n");

    let m1a = ctx.mk_app(m1.clone(), a).unwrap();
    let m2n = ctx.mk_app(m2.clone(), n).unwrap();
    let m3b = ctx.mk_app(m3.clone(), b).unwrap();
    let nil4 = ctx.mk_app(nil, a4.clone()).unwrap();
    let inner3 = ctx.mk_app_l(cons.clone(), &[a3.clone(), m3b, nil4]).unwrap();
    let inner2 = ctx.mk_app_l(cons.clone(), &[a2m.clone(), m2n, inner3]).unwrap();
    let f = ctx.mk_app_l(cons, &[a1.clone(), m1a, inner2]).unwrap();

    let mut ucs = Vec::new();
    check(&mut ctx, None, &mut menv, &tctx, &f, &mut ucs).unwrap();

    let iid = int_id(&mut ctx);
    let nid = nat_id(&mut ctx);
    let n2i = ctx.mk_const_str("nat_to_int");
    let n2r = ctx.mk_const_str("nat_to_real");
    let i2r = ctx.mk_const_str("int_to_real");
    ucs.push(Constraint::mk_choice(
        tctx.clone(),
        m1,
        vec![iid.clone(), i2r.clone()],
        Justification::new("overloaded m1"),
    ));
    ucs.push(Constraint::mk_choice(
        tctx.clone(),
        m2,
        vec![nid, n2i, n2r],
        Justification::new("overloaded m2"),
    ));
    ucs.push(Constraint::mk_choice(
        tctx.clone(),
        m3,
        vec![iid, i2r],
        Justification::new("overloaded m3"),
    ));

    let mut elb = Elaborator::new(menv, ucs);
    let mut solutions = 0;
    while let Some(mut sol) = elb.next(&mut ctx).unwrap() {
        solutions += 1;
        // in every solution all list element types agree
        let t1 = sol.instantiate_metavars(&mut ctx, &a1).unwrap();
        let t2 = sol.instantiate_metavars(&mut ctx, &a2m).unwrap();
        let t3 = sol.instantiate_metavars(&mut ctx, &a3).unwrap();
        let t4 = sol.instantiate_metavars(&mut ctx, &a4).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t2, t3);
        assert_eq!(t3, t4);
        assert!(solutions < 10, "enumeration must terminate");
    }
    // id_Int/nat_to_int/id_Int (all Int) and
    // int_to_real/nat_to_real/int_to_real (all Real)
    assert_eq!(solutions, 2);
}

#[test]
fn placeholder_inference() {
    // F _ _ f  with F : ∀ A B. (A → B) → A and f : N → R
    // elaborates to F N R f.
    let mut ctx = Ctx::new();
    let ty = ctx.mk_type();
    ctx.add_var("N", ty.clone()).unwrap();
    ctx.add_var("R", ty.clone()).unwrap();
    let n = ctx.mk_const_str("N");
    let r = ctx.mk_const_str("R");

    // pi A B : Type. (A -> B) -> A
    let v0 = ctx.mk_var(0);
    let v1 = ctx.mk_var(1);
    let a2b = ctx.mk_arrow(v1.clone(), v0).unwrap();
    let inner = ctx.mk_arrow(a2b, v1).unwrap();
    let pi_b = ctx.mk_pi(Name::from_str("B"), ty.clone(), inner).unwrap();
    let f_ty = ctx.mk_pi(Name::from_str("A"), ty, pi_b).unwrap();
    ctx.add_var("F", f_ty).unwrap();

    let n2r = ctx.mk_arrow(n.clone(), r.clone()).unwrap();
    ctx.add_var("f", n2r).unwrap();

    let big_f = ctx.mk_const_str("F");
    let f = ctx.mk_const_str("f");
    let ph1 = ctx.mk_placeholder();
    let ph2 = ctx.mk_placeholder();
    let e = ctx.mk_app_l(big_f.clone(), &[ph1, ph2, f.clone()]).unwrap();

    let mut menv = MetavarEnv::new();
    let tctx = Context::empty();
    let e = replace_placeholders(&mut ctx, &mut menv, &tctx, &e).unwrap();
    let mut ucs = Vec::new();
    let (e, _ty) = check(&mut ctx, None, &mut menv, &tctx, &e, &mut ucs).unwrap();

    let mut elb = Elaborator::new(menv, ucs);
    let mut sol = elb.next(&mut ctx).unwrap().expect("one solution");
    let result = sol.instantiate_metavars(&mut ctx, &e).unwrap();
    let expected = ctx.mk_app_l(big_f, &[n, r, f]).unwrap();
    assert_eq!(result, expected);
}

#[test]
fn coercion_insertion_in_checker() {
    // real_le(a, 0) with a : Int inserts the int→real coercion:
    // real_le (int_to_real a) 0.
    let mut ctx = Ctx::new();
    numeric_env(&mut ctx);
    let real = ctx.mk_const_str("Real");
    let int = ctx.mk_const_str("Int");
    let b = ctx.mk_bool();
    let r2b = ctx.mk_arrow(real.clone(), b).unwrap();
    let r2r2b = ctx.mk_arrow(real.clone(), r2b).unwrap();
    ctx.add_var("real_le", r2r2b).unwrap();
    ctx.add_var("a", int).unwrap();

    let mut fe = Frontend::new();
    let i2r = ctx.mk_const_str("int_to_real");
    fe.add_coercion(&mut ctx, &i2r).unwrap();

    let real_le = ctx.mk_const_str("real_le");
    let a = ctx.mk_const_str("a");
    let zero = ctx.mk_nat(real.clone(), 0);
    let e = ctx.mk_app_l(real_le.clone(), &[a.clone(), zero.clone()]).unwrap();

    let mut menv = MetavarEnv::new();
    let tctx = Context::empty();
    let mut ucs = Vec::new();
    let (elaborated, ty) =
        check(&mut ctx, Some(&fe), &mut menv, &tctx, &e, &mut ucs).unwrap();
    assert!(ucs.is_empty());
    assert_eq!(ty, ctx.mk_bool());

    let coerced_a = ctx.mk_app(i2r, a).unwrap();
    let expected = ctx.mk_app_l(real_le, &[coerced_a, zero]).unwrap();
    assert_eq!(elaborated, expected);
}

#[test]
fn elaborator_dead_end_terminates_quietly() {
    // An unsatisfiable constraint set yields no solution but no error.
    let mut ctx = Ctx::new();
    let ty = ctx.mk_type();
    ctx.add_var("A", ty.clone()).unwrap();
    ctx.add_var("B", ty).unwrap();
    let a = ctx.mk_const_str("A");
    let b = ctx.mk_const_str("B");
    let tctx = Context::empty();
    let menv = MetavarEnv::new();
    let ucs = vec![Constraint::mk_eq(tctx, a, b, Justification::new("impossible"))];
    let mut elb = Elaborator::new(menv, ucs);
    assert!(elb.next(&mut ctx).unwrap().is_none());
}
