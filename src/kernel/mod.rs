//! Kernel: terms, names, universe levels, contexts, metavariables.

pub type Ref<T> = std::rc::Rc<T>;
pub type WeakRef<T> = std::rc::Weak<T>;

pub use crate::error::{Error, Result};

pub mod context;
pub mod ctx;
pub mod expr;
pub mod level;
pub mod metavar;
pub mod name;
pub mod typecheck;

pub use context::{Context, ContextEntry};
pub use ctx::{Ctx, Decl, DeclKind};
pub use expr::{DbIndex, Expr, ExprView, Exprs, Lit, MetaCtx, MetaId, Type, Value};
pub use level::{Level, LevelView};
pub use metavar::MetavarEnv;
pub use name::Name;
pub use typecheck::{check, replace_placeholders};
pub use ExprView::*;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hashcons_across_shapes() {
        let mut em = Ctx::new();
        let b = em.mk_bool();
        let t1 = em.mk_arrow(b.clone(), b.clone()).unwrap();
        let t2 = em.mk_arrow(b.clone(), b.clone()).unwrap();
        assert_eq!(t1, t2);
        let v = em.mk_var(0);
        let lam1 = em.mk_lambda(Name::from_str("x"), b.clone(), v.clone()).unwrap();
        let lam2 = em.mk_lambda(Name::from_str("x"), b, v).unwrap();
        assert_eq!(lam1, lam2);
    }

    #[test]
    fn test_fv_range_invariants() {
        let mut em = Ctx::new();
        let b = em.mk_bool();
        let v0 = em.mk_var(0);
        assert_eq!(v0.fv_range(), 1);
        assert!(!v0.is_closed());
        let lam = em.mk_lambda(Name::from_str("x"), b, v0).unwrap();
        assert!(lam.is_closed());
        assert!(!lam.has_free_var_in_range(0, 10));
    }

    #[test]
    fn test_eq_unfold() {
        let mut em = Ctx::new();
        let a = em.mk_const_str("a");
        let b = em.mk_const_str("b");
        let eq = em.mk_eq(a.clone(), b.clone()).unwrap();
        let (x, y) = eq.unfold_eq().unwrap();
        assert_eq!(x, &a);
        assert_eq!(y, &b);
    }
}
