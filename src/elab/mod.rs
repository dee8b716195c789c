//! # Constraint-driven elaboration.
//!
//! The elaborator consumes the unification constraints produced by type
//! checking and enumerates the substitutions (metavariable assignments)
//! that satisfy them, by depth-first search with backtracking.
//!
//! Equalities are solved by higher-order unification restricted to the
//! fragment the matcher supports, extended with projection and imitation
//! moves for flex-rigid pairs (under a fuel budget), β-normalization on
//! demand, and universe-level unification. A `choice` constraint is a
//! branching point: candidates are tried in order, and a failure in a
//! subproblem pops the search back to the most recent choice.

use crate::{
    algo::hop_match::project_over_vars,
    error::Result,
    interrupt::Interrupt,
    kernel::{
        expr::{DbIndex, MetaCtx, MetaEntry, MetaId},
        Context, Ctx, Expr, ExprView, Level, LevelView, MetavarEnv, Name,
    },
    logtrace,
};
use std::{collections::VecDeque, fmt};

use ExprView::*;

/// Auxiliary data attached to a constraint or an assignment; used only
/// for diagnostics, never for control flow.
#[derive(Clone, Default)]
pub struct Justification(Option<crate::kernel::Ref<String>>);

impl Justification {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(msg: impl Into<String>) -> Self {
        Justification(Some(crate::kernel::Ref::new(msg.into())))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Justification {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            None => write!(out, "<no justification>"),
            Some(s) => write!(out, "{}", s),
        }
    }
}

/// A unification constraint, as produced by type checking.
#[derive(Clone, Debug)]
pub enum Constraint {
    /// `lhs ≡ rhs` in the given context.
    Eq {
        ctx: Context,
        lhs: Expr,
        rhs: Expr,
        jst: Justification,
    },
    /// The metavariable must be one of the candidates, in order.
    Choice {
        ctx: Context,
        mvar: Expr,
        candidates: Vec<Expr>,
        jst: Justification,
    },
}

impl Constraint {
    pub fn mk_eq(ctx: Context, lhs: Expr, rhs: Expr, jst: Justification) -> Self {
        Constraint::Eq { ctx, lhs, rhs, jst }
    }

    pub fn mk_choice(ctx: Context, mvar: Expr, candidates: Vec<Expr>, jst: Justification) -> Self {
        Constraint::Choice {
            ctx,
            mvar,
            candidates,
            jst,
        }
    }

    fn is_eq(&self) -> bool {
        matches!(self, Constraint::Eq { .. })
    }
}

/// Imitation/projection moves allowed along one search path before the
/// branch is abandoned.
const DEFAULT_FUEL: u32 = 64;

#[derive(Clone)]
struct State {
    menv: MetavarEnv,
    todo: VecDeque<Constraint>,
    stuck: Vec<Constraint>,
    fuel: u32,
}

struct ChoicePoint {
    /// Search state before any candidate was applied.
    state: State,
    mvar: Expr,
    candidates: Vec<Expr>,
    next: usize,
    jst: Justification,
}

/// The elaborator: an iterator over complete solutions.
pub struct Elaborator {
    init_menv: MetavarEnv,
    init_cs: Vec<Constraint>,
    stack: Vec<ChoicePoint>,
    interrupt: Interrupt,
    started: bool,
}

enum EqOutcome {
    /// Constraint discharged; the flag records whether an assignment
    /// happened (stuck constraints are then woken up).
    Solved(bool),
    /// Constraint replaced by simpler ones.
    Progress(Vec<Constraint>),
    /// Not decidable yet (flex-flex, pending delayed operations).
    Stuck(Constraint),
    /// No solution on this branch.
    Failed,
    /// Branch over candidate assignments for `mvar`, then retry.
    Branch {
        mvar: Expr,
        candidates: Vec<Expr>,
        retry: Option<Box<Constraint>>,
        jst: Justification,
    },
}

impl Elaborator {
    /// New elaborator over a metavariable environment and an ordered
    /// list of constraints.
    pub fn new(menv: MetavarEnv, cs: Vec<Constraint>) -> Self {
        Elaborator {
            init_menv: menv,
            init_cs: cs,
            stack: vec![],
            interrupt: Interrupt::new(),
            started: false,
        }
    }

    /// Install a cooperative interrupt flag, polled between search steps.
    pub fn set_interrupt(&mut self, i: Interrupt) {
        self.interrupt = i;
    }

    /// Produce the next solution, or `None` when the enumeration is
    /// exhausted. Fatal errors (cyclic assignments, ill-formed input)
    /// are returned as `Err`.
    pub fn next(&mut self, ctx: &mut Ctx) -> Result<Option<MetavarEnv>> {
        let state = if !self.started {
            self.started = true;
            Some(State {
                menv: self.init_menv.clone(),
                todo: self.init_cs.iter().cloned().collect(),
                stuck: vec![],
                fuel: DEFAULT_FUEL,
            })
        } else {
            self.backtrack(ctx)?
        };
        match state {
            None => Ok(None),
            Some(st) => self.solve(ctx, st),
        }
    }

    fn solve(&mut self, ctx: &mut Ctx, mut state: State) -> Result<Option<MetavarEnv>> {
        loop {
            self.interrupt.check()?;

            // 1. the first equality constraint is the first ready one
            if let Some(pos) = state.todo.iter().position(|c| c.is_eq()) {
                let c = state.todo.remove(pos).expect("position is valid");
                match self.process_eq(ctx, &mut state, c)? {
                    EqOutcome::Solved(assigned) => {
                        if assigned {
                            wake_stuck(&mut state);
                        }
                    }
                    EqOutcome::Progress(cs) => {
                        for c in cs.into_iter().rev() {
                            state.todo.push_front(c);
                        }
                    }
                    EqOutcome::Stuck(c) => state.stuck.push(c),
                    EqOutcome::Failed => match self.backtrack(ctx)? {
                        None => return Ok(None),
                        Some(st) => state = st,
                    },
                    EqOutcome::Branch {
                        mvar,
                        candidates,
                        retry,
                        jst,
                    } => {
                        if !self.branch(ctx, &mut state, mvar, candidates, retry, jst)? {
                            match self.backtrack(ctx)? {
                                None => return Ok(None),
                                Some(st) => state = st,
                            }
                        }
                    }
                }
                continue;
            }

            // 2. no equality is ready: branch on the first choice
            if let Some(pos) = state.todo.iter().position(|c| !c.is_eq()) {
                let c = state.todo.remove(pos).expect("position is valid");
                if let Constraint::Choice {
                    mvar,
                    candidates,
                    jst,
                    ..
                } = c
                {
                    if !self.branch(ctx, &mut state, mvar, candidates, None, jst)? {
                        match self.backtrack(ctx)? {
                            None => return Ok(None),
                            Some(st) => state = st,
                        }
                    }
                }
                continue;
            }

            // 3. only stuck constraints remain
            if state.stuck.is_empty() {
                return Ok(Some(state.menv));
            }
            if !self.resolve_stuck(ctx, &mut state)? {
                match self.backtrack(ctx)? {
                    None => return Ok(None),
                    Some(st) => state = st,
                }
            }
        }
    }

    /// Install a choice point and apply its first viable candidate.
    /// Returns `false` when every candidate fails immediately.
    fn branch(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        mvar: Expr,
        candidates: Vec<Expr>,
        retry: Option<Box<Constraint>>,
        jst: Justification,
    ) -> Result<bool> {
        logtrace!("elab.branch on {:?} ({} candidates)", mvar, candidates.len());
        let mut saved = state.clone();
        if let Some(r) = &retry {
            saved.todo.push_front((**r).clone());
        }
        self.stack.push(ChoicePoint {
            state: saved,
            mvar: mvar.clone(),
            candidates: candidates.clone(),
            next: 1,
            jst: jst.clone(),
        });
        if let Some(r) = retry {
            state.todo.push_front(*r);
        }
        let mut k = 0;
        loop {
            if k >= candidates.len() {
                // drop the exhausted choice point
                self.stack.pop();
                return Ok(false);
            }
            if self.apply_candidate(ctx, state, &mvar, &candidates[k], &jst)? {
                self.stack.last_mut().expect("just pushed").next = k + 1;
                wake_stuck(state);
                return Ok(true);
            }
            k += 1;
        }
    }

    /// Assign a candidate to the choice's metavariable. Returns `false`
    /// when the assignment is impossible (occurs check, double
    /// assignment conflict detected eagerly).
    fn apply_candidate(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        mvar: &Expr,
        cand: &Expr,
        jst: &Justification,
    ) -> Result<bool> {
        let (id, _) = match mvar.as_meta() {
            Some(m) => m,
            None => {
                return Err(crate::Error::new(
                    "choice constraint must be on a metavariable",
                ))
            }
        };
        if let Some(cur) = state.menv.get_assignment(id).cloned() {
            // already assigned: the candidate must agree
            state.todo.push_front(Constraint::mk_eq(
                Context::empty(),
                cur,
                cand.clone(),
                jst.clone(),
            ));
            return Ok(true);
        }
        if state.menv.occurs(id, cand) {
            return Ok(false);
        }
        state.menv.assign(id, cand.clone(), jst.clone())?;
        // propagate the candidate's type to the metavariable's type
        if let Some(tym) = state.menv.get_ty(id).cloned() {
            match crate::kernel::typecheck::infer_type(ctx, cand) {
                Ok(tyc) => {
                    state
                        .todo
                        .push_front(Constraint::mk_eq(Context::empty(), tym, tyc, jst.clone()));
                }
                Err(_) => (), // candidate's type involves open terms; leave it
            }
        }
        Ok(true)
    }

    /// Pop back to the most recent choice point with an untried
    /// candidate.
    fn backtrack(&mut self, ctx: &mut Ctx) -> Result<Option<State>> {
        loop {
            let (mvar, cand, jst, mut st) = {
                let top = match self.stack.last_mut() {
                    None => return Ok(None),
                    Some(t) => t,
                };
                if top.next >= top.candidates.len() {
                    self.stack.pop();
                    continue;
                }
                let k = top.next;
                top.next += 1;
                (
                    top.mvar.clone(),
                    top.candidates[k].clone(),
                    top.jst.clone(),
                    top.state.clone(),
                )
            };
            if self.apply_candidate(ctx, &mut st, &mvar, &cand, &jst)? {
                wake_stuck(&mut st);
                return Ok(Some(st));
            }
        }
    }

    /// Weak head normalization: substitute assignments, contract head
    /// β-redexes, unfold head lets.
    fn whnf(&mut self, ctx: &mut Ctx, menv: &mut MetavarEnv, e: &Expr) -> Result<Expr> {
        let mut e = menv.instantiate_metavars(ctx, e)?;
        loop {
            e = ctx.head_beta_reduce(&e)?;
            match e.view() {
                ELet(_, _, v, body) => {
                    let (v, body) = (v.clone(), body.clone());
                    e = ctx.instantiate(&body, std::slice::from_ref(&v))?;
                }
                _ => return Ok(e),
            }
        }
    }

    fn process_eq(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        c: Constraint,
    ) -> Result<EqOutcome> {
        let (cctx, lhs0, rhs0, jst) = match c {
            Constraint::Eq { ctx, lhs, rhs, jst } => (ctx, lhs, rhs, jst),
            Constraint::Choice { .. } => unreachable!("process_eq on a choice"),
        };
        let lhs = self.whnf(ctx, &mut state.menv, &lhs0)?;
        let rhs = self.whnf(ctx, &mut state.menv, &rhs0)?;
        logtrace!("elab.eq {:?} =?= {:?}", lhs, rhs);

        if lhs == rhs {
            return Ok(EqOutcome::Solved(false));
        }

        let mk = |l: &Expr, r: &Expr, c: &Context| {
            Constraint::mk_eq(c.clone(), l.clone(), r.clone(), jst.clone())
        };

        // metavariable on either side
        if let EMeta(id, mctx) = lhs.view() {
            return self.try_assign(ctx, state, *id, mctx, &rhs, &cctx, &jst);
        }
        if let EMeta(id, mctx) = rhs.view() {
            return self.try_assign(ctx, state, *id, mctx, &lhs, &cctx, &jst);
        }

        // flex applications
        let lhs_flex = flex_head(&state.menv, &lhs);
        let rhs_flex = flex_head(&state.menv, &rhs);
        match (lhs_flex, rhs_flex) {
            (Some(_), Some(_)) => {
                return Ok(EqOutcome::Stuck(Constraint::Eq {
                    ctx: cctx,
                    lhs,
                    rhs,
                    jst,
                }))
            }
            (Some(_), None) => return self.solve_flex_rigid(ctx, state, &cctx, &lhs, &rhs, &jst),
            (None, Some(_)) => return self.solve_flex_rigid(ctx, state, &cctx, &rhs, &lhs, &jst),
            (None, None) => (),
        }

        // rigid-rigid decomposition
        Ok(match (lhs.view(), rhs.view()) {
            (ESort(l1), ESort(l2)) => {
                if unify_levels(&mut state.menv, l1, l2)? {
                    EqOutcome::Solved(true)
                } else {
                    EqOutcome::Failed
                }
            }
            (EEq(a, b), EEq(c2, d)) => EqOutcome::Progress(vec![mk(a, c2, &cctx), mk(b, d, &cctx)]),
            (EApp(args1), EApp(args2)) => {
                if args1.len() != args2.len() || args1[0] != args2[0] {
                    EqOutcome::Failed
                } else {
                    EqOutcome::Progress(
                        args1
                            .iter()
                            .zip(args2.iter())
                            .skip(1)
                            .map(|(a, b)| mk(a, b, &cctx))
                            .collect(),
                    )
                }
            }
            (ELambda(n, ty1, b1), ELambda(_, ty2, b2)) | (EPi(n, ty1, b1), EPi(_, ty2, b2)) => {
                let inner = cctx.extend(n.clone(), Some(ty1.clone()));
                EqOutcome::Progress(vec![mk(ty1, ty2, &cctx), mk(b1, b2, &inner)])
            }
            (EValue(v1), EValue(v2)) => {
                if v1 == v2 {
                    EqOutcome::Solved(false)
                } else {
                    EqOutcome::Failed
                }
            }
            _ => EqOutcome::Failed,
        })
    }

    /// Try to assign `t` to the (unassigned, whnf'd) metavariable.
    #[allow(clippy::too_many_arguments)]
    fn try_assign(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        id: MetaId,
        mctx: &MetaCtx,
        t: &Expr,
        cctx: &Context,
        jst: &Justification,
    ) -> Result<EqOutcome> {
        // a closed, hole-free target is untouched by every delayed
        // operation: assign it directly
        if t.is_closed() && !t.has_meta() {
            if state.menv.occurs(id, t) {
                return Ok(EqOutcome::Failed);
            }
            state.menv.assign(id, t.clone(), jst.clone())?;
            return Ok(EqOutcome::Solved(true));
        }

        // invert trailing delayed lifts
        let mut t = t.clone();
        let mut ops = mctx.clone();
        while let Some(MetaEntry::Lift { s, n }) = ops.0.last().cloned() {
            if t.has_free_var_in_range(s, s + n) {
                return Ok(EqOutcome::Failed);
            }
            match ctx.lower_free_vars(&t, s + n, n) {
                Ok(t2) => {
                    t = t2;
                    ops.0.pop();
                }
                Err(_) => {
                    // a metavariable inside `t` blocks the inversion;
                    // park the residual problem
                    let m2 = ctx.mk_meta(id, ops);
                    return Ok(EqOutcome::Stuck(Constraint::mk_eq(
                        cctx.clone(),
                        m2,
                        t,
                        jst.clone(),
                    )));
                }
            }
        }
        if !ops.0.is_empty() {
            let m2 = ctx.mk_meta(id, ops);
            return Ok(EqOutcome::Stuck(Constraint::mk_eq(
                cctx.clone(),
                m2,
                t,
                jst.clone(),
            )));
        }
        if state.menv.occurs(id, &t) {
            return Ok(EqOutcome::Failed);
        }
        state.menv.assign(id, t, jst.clone())?;
        Ok(EqOutcome::Solved(true))
    }

    /// `m a1 … an ≡ t` with `m` unassigned and `t` rigid: the
    /// higher-order pattern case yields the unique solution directly;
    /// otherwise branch over projection and imitation candidates.
    fn solve_flex_rigid(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        cctx: &Context,
        flex: &Expr,
        rigid: &Expr,
        jst: &Justification,
    ) -> Result<EqOutcome> {
        let args = flex.as_app().expect("flex side is an application");
        let (head, args) = (&args[0], &args[1..]);
        let (id, hmctx) = head.as_meta().expect("flex head is a metavariable");
        if !hmctx.is_empty() {
            return Ok(EqOutcome::Stuck(Constraint::mk_eq(
                cctx.clone(),
                flex.clone(),
                rigid.clone(),
                jst.clone(),
            )));
        }

        // higher-order pattern: distinct locally bound variables
        let mut vars: Vec<DbIndex> = Vec::with_capacity(args.len());
        let mut is_pattern = true;
        for a in args {
            match a.as_var() {
                Some(i) if !vars.contains(&i) => vars.push(i),
                _ => {
                    is_pattern = false;
                    break;
                }
            }
        }
        if is_pattern && !rigid.has_meta() {
            return Ok(
                match project_over_vars(ctx, rigid, cctx, cctx.size(), &vars)? {
                    Some(lam) => {
                        if state.menv.occurs(id, &lam) {
                            EqOutcome::Failed
                        } else {
                            state.menv.assign(id, lam, jst.clone())?;
                            EqOutcome::Solved(true)
                        }
                    }
                    // the target uses a local the pattern cannot express
                    None => EqOutcome::Failed,
                },
            );
        }

        // projection and imitation moves, under the fuel budget
        if state.fuel == 0 {
            return Ok(EqOutcome::Failed);
        }
        state.fuel -= 1;
        let n = args.len() as DbIndex;
        let mut candidates = Vec::new();
        for i in 0..n {
            // λ x1 … xn. x_i
            candidates.push(self.mk_binder_lam(ctx, state, cctx, n, |ctx2, _| {
                Ok(ctx2.mk_var(n - 1 - i))
            })?);
        }
        if let Some(imit) = self.imitation_body(ctx, state, cctx, n, rigid)? {
            candidates.push(imit);
        }
        if candidates.is_empty() {
            return Ok(EqOutcome::Failed);
        }
        let retry = Constraint::mk_eq(cctx.clone(), flex.clone(), rigid.clone(), jst.clone());
        Ok(EqOutcome::Branch {
            mvar: head.clone(),
            candidates,
            retry: Some(Box::new(retry)),
            jst: jst.clone(),
        })
    }

    /// λ-abstraction over `n` fresh-metavariable domains, with the body
    /// produced by `f`.
    fn mk_binder_lam<F>(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        cctx: &Context,
        n: DbIndex,
        f: F,
    ) -> Result<Expr>
    where
        F: FnOnce(&mut Ctx, &mut MetavarEnv) -> Result<Expr>,
    {
        let mut body = f(ctx, &mut state.menv)?;
        for _ in 0..n {
            let dom = state.menv.mk_metavar(ctx, cctx);
            body = ctx.mk_lambda(Name::anonymous(), dom, body)?;
        }
        Ok(body)
    }

    /// Imitation candidate for a rigid target, or `None` when the
    /// target's shape does not support one.
    fn imitation_body(
        &mut self,
        ctx: &mut Ctx,
        state: &mut State,
        cctx: &Context,
        n: DbIndex,
        rigid: &Expr,
    ) -> Result<Option<Expr>> {
        let bound_vars = |ctx: &mut Ctx| -> Vec<Expr> {
            (0..n).rev().map(|i| ctx.mk_var(i)).collect()
        };
        let body = match rigid.view() {
            EConst(..) | ESort(..) | EValue(..) => Some(ctx.lift_free_vars(rigid, 0, n)?),
            EApp(args) => {
                let head = ctx.lift_free_vars(&args[0], 0, n)?;
                let xs = bound_vars(ctx);
                let mut new_args = Vec::with_capacity(args.len() - 1);
                for _ in 1..args.len() {
                    let h = state.menv.mk_metavar(ctx, cctx);
                    new_args.push(ctx.mk_app_l(h, &xs)?);
                }
                Some(ctx.mk_app_l(head, &new_args)?)
            }
            EEq(..) => {
                let xs = bound_vars(ctx);
                let h1 = state.menv.mk_metavar(ctx, cctx);
                let h2 = state.menv.mk_metavar(ctx, cctx);
                let a = ctx.mk_app_l(h1, &xs)?;
                let b = ctx.mk_app_l(h2, &xs)?;
                Some(ctx.mk_eq(a, b)?)
            }
            _ => None,
        };
        match body {
            None => Ok(None),
            Some(body) => {
                let mut lam = body;
                for _ in 0..n {
                    let dom = state.menv.mk_metavar(ctx, cctx);
                    lam = ctx.mk_lambda(Name::anonymous(), dom, lam)?;
                }
                Ok(Some(lam))
            }
        }
    }

    /// Last-resort handling of postponed constraints: assign flex-flex
    /// pairs directly when one side is a plain unassigned metavariable.
    fn resolve_stuck(&mut self, ctx: &mut Ctx, state: &mut State) -> Result<bool> {
        let stuck = std::mem::take(&mut state.stuck);
        let mut progress = false;
        for c in stuck {
            if progress || !c.is_eq() {
                state.todo.push_back(c);
                continue;
            }
            if let Constraint::Eq { ctx: cctx, lhs, rhs, jst } = c {
                let lhs2 = self.whnf(ctx, &mut state.menv, &lhs)?;
                let rhs2 = self.whnf(ctx, &mut state.menv, &rhs)?;
                if lhs2 == rhs2 {
                    progress = true;
                    continue;
                }
                let assignable = |menv: &MetavarEnv, e: &Expr| match e.view() {
                    EMeta(id, mctx) => mctx.is_empty() && !menv.is_assigned(*id),
                    _ => false,
                };
                if assignable(&state.menv, &lhs2) {
                    let (id, _) = lhs2.as_meta().expect("checked above");
                    if !state.menv.occurs(id, &rhs2) {
                        state.menv.assign(id, rhs2, jst)?;
                        progress = true;
                        continue;
                    }
                } else if assignable(&state.menv, &rhs2) {
                    let (id, _) = rhs2.as_meta().expect("checked above");
                    if !state.menv.occurs(id, &lhs2) {
                        state.menv.assign(id, lhs2, jst)?;
                        progress = true;
                        continue;
                    }
                }
                state.stuck.push(Constraint::Eq {
                    ctx: cctx,
                    lhs: lhs2,
                    rhs: rhs2,
                    jst,
                });
            }
        }
        if progress {
            wake_stuck(state);
        }
        Ok(progress)
    }
}

/// Is this an application headed by an unassigned metavariable?
fn flex_head(menv: &MetavarEnv, e: &Expr) -> Option<MetaId> {
    let (head, args) = e.unfold_app();
    if args.is_empty() {
        return None;
    }
    match head.view() {
        EMeta(id, _) if !menv.is_assigned(*id) => Some(*id),
        _ => None,
    }
}

fn wake_stuck(state: &mut State) {
    for c in state.stuck.drain(..) {
        state.todo.push_back(c);
    }
}

/// Unify two universe levels against the join semilattice, solving level
/// variables.
fn unify_levels(menv: &mut MetavarEnv, l1: &Level, l2: &Level) -> Result<bool> {
    let a = menv.instantiate_level(l1);
    let b = menv.instantiate_level(l2);
    if a == b {
        return Ok(true);
    }
    match (a.view(), b.view()) {
        (LevelView::LParam(n), _) if !b.occurs(n) => {
            menv.assign_level(n.clone(), b)?;
            Ok(true)
        }
        (_, LevelView::LParam(n)) if !a.occurs(n) => {
            menv.assign_level(n.clone(), a)?;
            Ok(true)
        }
        (LevelView::LSucc(x), LevelView::LSucc(y)) => unify_levels(menv, &x.clone(), &y.clone()),
        _ => Ok(false),
    }
}
