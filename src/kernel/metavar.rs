//! # Metavariable environment.
//!
//! An arena of holes. Each hole has a unique id, an optional type
//! (itself possibly containing holes; deduced on demand), the context it
//! was declared in, an optional assignment, and a justification used
//! only for diagnostics. The environment also carries the universe-level
//! substitution built during elaboration.
//!
//! Metavariable occurrences in terms carry *delayed* context operations
//! (see [`MetaCtx`](crate::kernel::expr::MetaCtx)); they are applied to
//! the assignment when `instantiate_metavars` substitutes it in.

use super::{
    expr::{MetaCtx, MetaId},
    Context, Ctx, Expr, ExprView, Level, Name,
};
use crate::{
    elab::Justification,
    error::{Error, Result},
    errorstr,
    fnv::FnvHashMap as HM,
};

/// The arena of metavariables.
#[derive(Clone, Debug, Default)]
pub struct MetavarEnv {
    cells: Vec<MetaCell>,
    /// Universe-level substitution (solved level variables).
    level_subst: HM<Name, Level>,
}

#[derive(Clone, Debug)]
struct MetaCell {
    ty: Option<Expr>,
    ctx: Context,
    assignment: Option<Expr>,
    jst: Justification,
}

impl MetavarEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of metavariables allocated so far.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Allocate a fresh metavariable in the given declaration context.
    /// Its type is deduced on demand (see [`ensure_ty`](Self::ensure_ty)).
    pub fn mk_metavar(&mut self, ctx: &mut Ctx, tctx: &Context) -> Expr {
        let id = MetaId(self.cells.len() as u32);
        self.cells.push(MetaCell {
            ty: None,
            ctx: tctx.clone(),
            assignment: None,
            jst: Justification::none(),
        });
        ctx.mk_meta(id, MetaCtx::empty())
    }

    /// Allocate a fresh metavariable with a known type.
    pub fn mk_metavar_with_ty(&mut self, ctx: &mut Ctx, tctx: &Context, ty: Expr) -> Expr {
        let e = self.mk_metavar(ctx, tctx);
        let (id, _) = e.as_meta().expect("mk_metavar returns a metavariable");
        self.cells[id.0 as usize].ty = Some(ty);
        e
    }

    fn cell(&self, id: MetaId) -> Result<&MetaCell> {
        self.cells
            .get(id.0 as usize)
            .ok_or_else(|| errorstr!("unknown metavariable ?m{}", id.0))
    }

    /// The context the metavariable was declared in.
    pub fn decl_ctx(&self, id: MetaId) -> Result<&Context> {
        Ok(&self.cell(id)?.ctx)
    }

    /// The recorded type of the metavariable, if any.
    pub fn get_ty(&self, id: MetaId) -> Option<&Expr> {
        self.cells.get(id.0 as usize).and_then(|c| c.ty.as_ref())
    }

    /// The recorded type, allocating a fresh type metavariable on demand.
    pub fn ensure_ty(&mut self, ctx: &mut Ctx, id: MetaId) -> Result<Expr> {
        if let Some(ty) = &self.cell(id)?.ty {
            return Ok(ty.clone());
        }
        let tctx = self.cell(id)?.ctx.clone();
        let tyvar = self.mk_metavar(ctx, &tctx);
        self.cells[id.0 as usize].ty = Some(tyvar.clone());
        Ok(tyvar)
    }

    /// Current assignment, if any.
    pub fn get_assignment(&self, id: MetaId) -> Option<&Expr> {
        self.cells
            .get(id.0 as usize)
            .and_then(|c| c.assignment.as_ref())
    }

    pub fn is_assigned(&self, id: MetaId) -> bool {
        self.get_assignment(id).is_some()
    }

    /// Justification recorded with the assignment (diagnostics only).
    pub fn get_justification(&self, id: MetaId) -> Option<&Justification> {
        self.cells.get(id.0 as usize).map(|c| &c.jst)
    }

    /// Does `id` occur (transitively through assignments) in `e`?
    pub fn occurs(&self, id: MetaId, e: &Expr) -> bool {
        if !e.has_meta() {
            return false;
        }
        match e.view() {
            ExprView::EMeta(id2, mctx) => {
                if *id2 == id {
                    return true;
                }
                if let Some(a) = self.get_assignment(*id2) {
                    if self.occurs(id, a) {
                        return true;
                    }
                }
                mctx.0.iter().any(|ent| match ent {
                    super::expr::MetaEntry::Inst { e, .. } => self.occurs(id, e),
                    super::expr::MetaEntry::Lift { .. } => false,
                })
            }
            ExprView::EVar(..) | ExprView::EConst(..) | ExprView::ESort(..) => false,
            ExprView::EValue(v) => self.occurs(id, v.ty()),
            ExprView::EApp(args) => args.iter().any(|a| self.occurs(id, a)),
            ExprView::ELambda(_, ty, body) | ExprView::EPi(_, ty, body) => {
                self.occurs(id, ty) || self.occurs(id, body)
            }
            ExprView::ELet(_, ty, v, body) => {
                ty.as_ref().map_or(false, |t| self.occurs(id, t))
                    || self.occurs(id, v)
                    || self.occurs(id, body)
            }
            ExprView::EEq(a, b) => self.occurs(id, a) || self.occurs(id, b),
        }
    }

    /// Assign `e` to the metavariable. Fails on double assignment and on
    /// cyclic assignments (occurs check).
    pub fn assign(&mut self, id: MetaId, e: Expr, jst: Justification) -> Result<()> {
        if self.is_assigned(id) {
            return Err(errorstr!("metavariable ?m{} is already assigned", id.0));
        }
        if self.occurs(id, &e) {
            return Err(errorstr!(
                "cyclic assignment: ?m{} occurs in its own value",
                id.0
            ));
        }
        let cell = self
            .cells
            .get_mut(id.0 as usize)
            .ok_or_else(|| errorstr!("unknown metavariable ?m{}", id.0))?;
        cell.assignment = Some(e);
        cell.jst = jst;
        Ok(())
    }

    /// Substitute assignments in `e` to a fixed point, applying delayed
    /// context operations. Cyclic assignments are a fatal error. Fully
    /// instantiated assignments are path-compressed back into the arena.
    pub fn instantiate_metavars(&mut self, ctx: &mut Ctx, e: &Expr) -> Result<Expr> {
        let mut in_progress = Vec::new();
        self.instantiate_rec(ctx, e, &mut in_progress)
    }

    fn instantiate_rec(
        &mut self,
        ctx: &mut Ctx,
        e: &Expr,
        in_progress: &mut Vec<MetaId>,
    ) -> Result<Expr> {
        if !e.has_meta() {
            return Ok(e.clone());
        }
        Ok(match e.view() {
            ExprView::EMeta(id, mctx) => {
                let id = *id;
                let mctx = mctx.clone();
                match self.get_assignment(id).cloned() {
                    None => {
                        // refresh the delayed entries: their recorded
                        // instantiations may mention assigned holes
                        let mut entries = mctx.0.clone();
                        let mut changed = false;
                        for ent in entries.iter_mut() {
                            if let super::expr::MetaEntry::Inst { e: v, .. } = ent {
                                let v2 = self.instantiate_rec(ctx, v, in_progress)?;
                                if v2 != *v {
                                    *v = v2;
                                    changed = true;
                                }
                            }
                        }
                        if changed {
                            ctx.mk_meta(id, MetaCtx(entries))
                        } else {
                            e.clone()
                        }
                    }
                    Some(a) => {
                        if in_progress.contains(&id) {
                            return Err(Error::new("cyclic metavariable assignment"));
                        }
                        in_progress.push(id);
                        let a2 = self.instantiate_rec(ctx, &a, in_progress)?;
                        in_progress.pop();
                        if !a2.has_meta() && a2 != a {
                            // path compression
                            self.cells[id.0 as usize].assignment = Some(a2.clone());
                        }
                        ctx.apply_meta_ctx(&mctx, &a2)?
                    }
                }
            }
            ev => {
                let ev2 = ev.map(|u, _| self.instantiate_rec(ctx, u, in_progress), 0)?;
                ctx_hashcons(ctx, ev2, e)?
            }
        })
    }
}

// rebuild a mapped view through the manager, keeping `e` on identity
fn ctx_hashcons(ctx: &mut Ctx, ev: ExprView, old: &Expr) -> Result<Expr> {
    if &ev == old.view() {
        return Ok(old.clone());
    }
    match ev {
        ExprView::EVar(i) => Ok(ctx.mk_var(i)),
        ExprView::EConst(n) => Ok(ctx.mk_const(n)),
        ExprView::ESort(l) => Ok(ctx.mk_sort(l)),
        ExprView::EValue(v) => Ok(ctx.mk_value(v)),
        ExprView::EApp(args) => {
            let mut it = args.into_iter();
            let hd = it.next().expect("application has a head");
            let rest: Vec<_> = it.collect();
            ctx.mk_app_l(hd, &rest)
        }
        ExprView::ELambda(n, ty, body) => ctx.mk_lambda(n, ty, body),
        ExprView::EPi(n, ty, body) => ctx.mk_pi(n, ty, body),
        ExprView::ELet(n, ty, v, body) => ctx.mk_let(n, ty, v, body),
        ExprView::EEq(a, b) => ctx.mk_eq(a, b),
        ExprView::EMeta(id, mctx) => Ok(ctx.mk_meta(id, mctx)),
    }
}

// universe levels
impl MetavarEnv {
    /// Solved level variables.
    pub fn get_level(&self, n: &Name) -> Option<&Level> {
        self.level_subst.get(n)
    }

    /// Record a solved level variable.
    pub fn assign_level(&mut self, n: Name, l: Level) -> Result<()> {
        if self.level_subst.contains_key(&n) {
            return Err(errorstr!("level variable {} is already solved", n));
        }
        if l.occurs(&n) {
            return Err(errorstr!("cyclic level assignment for {}", n));
        }
        self.level_subst.insert(n, l);
        Ok(())
    }

    /// Substitute solved level variables in `l` to a fixed point.
    pub fn instantiate_level(&self, l: &Level) -> Level {
        let mut cur = l.clone();
        loop {
            let next = cur.instantiate_params(&|n: &Name| self.level_subst.get(n).cloned());
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }
}
