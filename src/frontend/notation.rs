//! # Notation environment.
//!
//! Parent-linked frontend tables: nud/led operator maps for a Pratt
//! parser, the inverse denotation map for pretty printing, implicit
//! argument information, coercions and aliases.
//!
//! Lookups walk to the parent only when the child has no entry; a child
//! may shadow but never mutate a parent. A frontend with children is
//! *frozen*: every mutating operation fails.

use super::operator::Operator;
use crate::{
    errorstr,
    error::{Error, Result},
    fnv::{FnvHashMap as HM, FnvHashSet},
    kernel::{typecheck, Ctx, Expr, ExprView, Name, Ref},
    logdebug,
};
use std::cell::Cell;

/// Line-oriented diagnostic sink; an injected collaborator, not a
/// global. The notation tables report precedence changes, incompatible
/// overloads and redefinitions here.
pub trait Diagnostics {
    fn report(&mut self, msg: String);
}

/// Discards every message.
pub struct IgnoreDiags;

impl Diagnostics for IgnoreDiags {
    fn report(&mut self, _msg: String) {}
}

impl Diagnostics for Vec<String> {
    fn report(&mut self, msg: String) {
        self.push(msg)
    }
}

/// A declaration recorded by the frontend, for serialization.
#[derive(Clone, Debug)]
pub enum FrontendDecl {
    Notation {
        op: Operator,
        denotation: Name,
        led: bool,
    },
    MarkImplicit {
        name: Name,
        flags: Vec<bool>,
    },
    Coercion {
        name: Name,
    },
    Alias {
        name: Name,
        target: Name,
    },
}

/// One frontend level.
#[derive(Default)]
pub struct Frontend {
    parent: Option<Ref<Frontend>>,
    /// Number of live children. While nonzero this level is read-only.
    children: Cell<u32>,
    /// nud table for the Pratt parser (tokens that start an expression).
    nud: HM<Name, Operator>,
    /// led table (tokens that continue an expression).
    led: HM<Name, Operator>,
    /// Precedence of non-leading parts of mixfix operators.
    other_lbp: HM<Name, u32>,
    /// Denotation -> operators, for pretty printing. An empty list is a
    /// sentinel hiding a parent entry.
    expr_to_ops: HM<Expr, Vec<Operator>>,
    /// Implicit-argument flags and the generated explicit-version name.
    implicit_table: HM<Name, (Vec<bool>, Name)>,
    /// Explicit versions of constants with implicit arguments.
    explicit_names: FnvHashSet<Name>,
    /// (from-type, to-type) -> coercion function.
    coercion_map: HM<(Expr, Expr), Expr>,
    /// from-type -> list of (to-type, function).
    type_coercions: HM<Expr, Vec<(Expr, Expr)>>,
    /// Set of coercion functions.
    coercion_set: FnvHashSet<Expr>,
    aliases: HM<Name, Expr>,
    inv_aliases: HM<Expr, Vec<Name>>,
    /// Declarations in registration order, for serialization.
    decls_log: Vec<FrontendDecl>,
}

impl Frontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// New child level. The parent becomes read-only for as long as the
    /// child is alive.
    pub fn child(parent: &Ref<Frontend>) -> Frontend {
        parent.children.set(parent.children.get() + 1);
        Frontend {
            parent: Some(parent.clone()),
            children: Cell::new(0),
            nud: HM::default(),
            led: HM::default(),
            other_lbp: HM::default(),
            expr_to_ops: HM::default(),
            implicit_table: HM::default(),
            explicit_names: FnvHashSet::default(),
            coercion_map: HM::default(),
            type_coercions: HM::default(),
            coercion_set: FnvHashSet::default(),
            aliases: HM::default(),
            inv_aliases: HM::default(),
            decls_log: Vec::default(),
        }
    }

    fn parent(&self) -> Option<&Frontend> {
        self.parent.as_deref()
    }

    pub fn has_children(&self) -> bool {
        self.children.get() > 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.has_children() {
            Err(Error::new("frontend object is read-only (it has children)"))
        } else {
            Ok(())
        }
    }

    /// Declarations registered at this level, in order.
    pub fn declarations(&self) -> &[FrontendDecl] {
        &self.decls_log
    }
}

// operator tables
impl Frontend {
    /// The nud operator for the given token.
    pub fn find_nud(&self, n: &Name) -> Option<Operator> {
        match self.nud.get(n) {
            Some(op) => Some(op.clone()),
            None => self.parent().and_then(|p| p.find_nud(n)),
        }
    }

    /// The led operator for the given token.
    pub fn find_led(&self, n: &Name) -> Option<Operator> {
        match self.led.get(n) {
            Some(op) => Some(op.clone()),
            None => self.parent().and_then(|p| p.find_led(n)),
        }
    }

    fn get_other_lbp(&self, n: &Name) -> Option<u32> {
        match self.other_lbp.get(n) {
            Some(p) => Some(*p),
            None => self.parent().and_then(|p| p.get_other_lbp(n)),
        }
    }

    /// The left binding power of a token: the precedence of its led
    /// entry if present, else its non-leading-part precedence.
    pub fn get_lbp(&self, n: &Name) -> Option<u32> {
        match self.find_led(n) {
            Some(op) => Some(op.precedence()),
            None => self.get_other_lbp(n),
        }
    }

    /// Is the operator defined at this level (parents ignored)?
    fn defined_here(&self, op: &Operator, led: bool) -> bool {
        if led {
            self.led.contains_key(op.op_name())
        } else {
            self.nud.contains_key(op.op_name())
        }
    }

    fn find_op(&self, n: &Name, led: bool) -> Option<Operator> {
        if led {
            self.find_led(n)
        } else {
            self.find_nud(n)
        }
    }

    fn insert_op(&mut self, op: Operator, led: bool) {
        let tbl = if led { &mut self.led } else { &mut self.nud };
        tbl.insert(op.op_name().clone(), op);
    }

    /// The operator used as notation for the given denotation: the
    /// first whose tokens are all ASCII, or any if `unicode` is allowed.
    /// An empty child entry hides the parent.
    pub fn find_op_for(&self, e: &Expr, unicode: bool) -> Option<Operator> {
        if let Some(list) = self.expr_to_ops.get(e) {
            if list.is_empty() {
                return None; // hide sentinel
            }
            for op in list {
                if unicode || op.is_safe_ascii() {
                    return Some(op.clone());
                }
            }
        }
        self.parent().and_then(|p| p.find_op_for(e, unicode))
    }

    /// Remove all denotation bindings associated with the operator,
    /// hiding parent entries where needed.
    fn remove_bindings(&mut self, op: &Operator) {
        let parent_has = |p: Option<&Frontend>, d: &Expr| -> bool {
            p.map_or(false, |p| p.find_op_for(d, true).is_some())
        };
        for d in op.denotations().to_vec() {
            if parent_has(self.parent(), &d) {
                // the parent has an association for d: hide it
                self.expr_to_ops.insert(d, vec![]);
            } else {
                self.expr_to_ops.remove(&d);
            }
        }
    }

    fn insert_expr_to_op_entry(&mut self, d: Expr, op: Operator) {
        self.expr_to_ops.entry(d).or_default().insert(0, op);
    }

    /// Refresh the handles stored for the operator's denotations after
    /// it grew a denotation.
    fn refresh_op_entries(&mut self, op: &Operator) {
        for d in op.denotations() {
            if let Some(list) = self.expr_to_ops.get_mut(d) {
                for slot in list.iter_mut() {
                    if slot == op {
                        *slot = op.clone();
                    }
                }
            }
        }
    }

    fn check_precedence(&self, n: &Name, prec: u32, diags: &mut dyn Diagnostics) {
        if let Some(old) = self.get_lbp(n) {
            if old != prec {
                diags.report(format!(
                    "The precedence of '{}' changed from {} to {}.",
                    n, old, prec
                ));
            }
        }
    }

    /// Register the operator in the parsing and pretty-printing tables.
    fn register_new_op(
        &mut self,
        op: Operator,
        d: Expr,
        led: bool,
        diags: &mut dyn Diagnostics,
    ) {
        let op = op.with_denotation(d.clone());
        self.insert_op(op.clone(), led);
        self.insert_expr_to_op_entry(d, op.clone());
        let parts = op.parts().to_vec();
        let prec = op.precedence();
        if led {
            self.check_precedence(&parts[0], prec, diags);
        }
        for part in &parts[1..] {
            self.check_precedence(part, prec, diags);
            self.other_lbp.insert(part.clone(), prec);
        }
    }

    /// Add an operator for the given denotation.
    ///
    /// If the new operator does not conflict with existing ones it is
    /// just registered. An *equal* operator with a compatible denotation
    /// is an overload; an equal operator with an incompatible denotation
    /// or a different operator replaces the old one, with a diagnostic.
    pub fn add_op(
        &mut self,
        new_op: Operator,
        d: Expr,
        led: bool,
        diags: &mut dyn Diagnostics,
    ) -> Result<()> {
        self.check_writable()?;
        let opn = new_op.op_name().clone();
        match self.find_op(&opn, led) {
            None => self.register_new_op(new_op.clone(), d.clone(), led, diags),
            Some(old_op) if old_op == new_op => {
                if self.compatible_denotations(&old_op, &d) {
                    // overload
                    if self.defined_here(&old_op, led) {
                        let updated = old_op.with_denotation(d.clone());
                        self.insert_op(updated.clone(), led);
                        self.refresh_op_entries(&updated);
                        self.insert_expr_to_op_entry(d.clone(), updated);
                    } else {
                        // the operator lives in a parent frontend; copy
                        // it into this level first
                        let promoted = old_op.copy();
                        self.register_new_op(promoted, d.clone(), led, diags);
                    }
                } else {
                    diags.report(format!(
                        "The denotation(s) for the existing notation:\n  {:?}\n\
                         have been replaced with the new denotation:\n  {:?}\n\
                         because they conflict on how implicit arguments are used.",
                        old_op, d
                    ));
                    self.remove_bindings(&old_op);
                    self.register_new_op(new_op.clone(), d.clone(), led, diags);
                }
            }
            Some(old_op) => {
                diags.report(format!(
                    "Notation has been redefined, the existing notation:\n  {:?}\n\
                     has been replaced with:\n  {:?}\nbecause they conflict with each other.",
                    old_op, new_op
                ));
                self.remove_bindings(&old_op);
                self.register_new_op(new_op.clone(), d.clone(), led, diags);
            }
        }
        if let Some(n) = d.as_const() {
            self.decls_log.push(FrontendDecl::Notation {
                op: new_op,
                denotation: n.clone(),
                led,
            });
        }
        Ok(())
    }
}

// denotation compatibility
impl Frontend {
    /// The implicit-argument pattern of a denotation: the flags of its
    /// leading arguments (empty for anything but a constant).
    pub fn get_implicit_arguments_of(&self, d: &Expr) -> Vec<bool> {
        match d.view() {
            ExprView::EConst(n) => self.get_implicit_arguments(n),
            _ => vec![],
        }
    }

    /// Two denotations are compatible iff, after dropping the implicit
    /// prefix and the explicit suffix, the remaining implicit/explicit
    /// pattern is identical. The parser and pretty printer only see the
    /// "middle" arguments; the rest are inferred or supplied
    /// positionally.
    pub fn compatible_denotation(&self, d1: &Expr, d2: &Expr) -> bool {
        let imp1 = self.get_implicit_arguments_of(d1);
        let imp2 = self.get_implicit_arguments_of(d2);
        // the explicit suffix was trimmed at marking time, so only the
        // implicit prefix needs skipping here
        let mut it1 = imp1.iter().skip_while(|b| **b);
        let mut it2 = imp2.iter().skip_while(|b| **b);
        loop {
            match (it1.next(), it2.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a == b => continue,
                _ => return false,
            }
        }
    }

    fn compatible_denotations(&self, op: &Operator, d: &Expr) -> bool {
        op.denotations()
            .iter()
            .all(|prev| self.compatible_denotation(prev, d))
    }
}

// implicit arguments
impl Frontend {
    /// The generated explicit-version name: `@` prefixed to the last
    /// string segment, `::explicit` appended to numerals.
    pub fn mk_explicit_name(n: &Name) -> Result<Name> {
        if n.is_anonymous() {
            return Err(Error::new("anonymous names cannot be used in definitions"));
        }
        if n.is_numeral() {
            return Ok(n.append_str("explicit"));
        }
        let last = n.last_str().expect("non-numeral, non-anonymous name");
        let new_last = format!("@{}", last);
        Ok(n.prefix().append_str(&new_last))
    }

    /// Mark the leading arguments of `n` as implicit.
    ///
    /// `n` must name a definition, postulate or builtin; the number of
    /// flags must not exceed the arrow-arity of its type; trailing
    /// explicit flags are trimmed (nothing left fails). An explicit
    /// version of the object is defined in an auxiliary section and
    /// recorded alongside the flags.
    pub fn mark_implicit_arguments(
        &mut self,
        ctx: &mut Ctx,
        n: &Name,
        implicit: &[bool],
    ) -> Result<()> {
        if self.has_children() {
            return Err(Error::new(
                "failed to mark implicit arguments, frontend object is read-only",
            ));
        }
        let decl = ctx
            .find_decl(n)
            .ok_or_else(|| errorstr!("unknown object '{}'", n))?
            .clone();
        if !decl.accepts_implicit_marks() {
            return Err(errorstr!(
                "failed to mark implicit arguments, the object '{}' is not a definition or postulate",
                n
            ));
        }
        if self.has_implicit_arguments(n) {
            return Err(errorstr!(
                "the object '{}' already has implicit argument information associated with it",
                n
            ));
        }
        let explicit_version = Self::mk_explicit_name(n)?;
        if ctx.find_decl(&explicit_version).is_some() {
            return Err(errorstr!(
                "failed to mark implicit arguments for '{}', the frontend already has an object named '{}'",
                n,
                explicit_version
            ));
        }
        let num_args = decl.ty.arrow_arity();
        if implicit.len() > num_args {
            return Err(errorstr!(
                "failed to mark implicit arguments for '{}', object has only {} arguments, but trying to mark {} arguments",
                n,
                num_args,
                implicit.len()
            ));
        }
        // remove explicit suffix
        let mut sz = implicit.len();
        while sz > 0 && !implicit[sz - 1] {
            sz -= 1;
        }
        if sz == 0 {
            return Err(errorstr!(
                "failed to mark implicit arguments for '{}', all arguments are explicit",
                n
            ));
        }
        let flags: Vec<bool> = implicit[..sz].to_vec();
        self.implicit_table
            .insert(n.clone(), (flags.clone(), explicit_version.clone()));
        self.explicit_names.insert(explicit_version.clone());
        self.decls_log.push(FrontendDecl::MarkImplicit {
            name: n.clone(),
            flags,
        });
        // auxiliary section: bind the explicit version to the object
        let body = ctx.mk_const(n.clone());
        let ty = decl.ty.clone();
        ctx.add_definition(explicit_version, ty, body)?;
        Ok(())
    }

    pub fn has_implicit_arguments(&self, n: &Name) -> bool {
        if self.implicit_table.contains_key(n) {
            true
        } else {
            self.parent().map_or(false, |p| p.has_implicit_arguments(n))
        }
    }

    /// Implicit-argument flags for a name; empty when none are marked.
    pub fn get_implicit_arguments(&self, n: &Name) -> Vec<bool> {
        match self.implicit_table.get(n) {
            Some((flags, _)) => flags.clone(),
            None => self
                .parent()
                .map_or_else(Vec::new, |p| p.get_implicit_arguments(n)),
        }
    }

    pub fn get_explicit_version(&self, n: &Name) -> Option<Name> {
        match self.implicit_table.get(n) {
            Some((_, e)) => Some(e.clone()),
            None => self.parent().and_then(|p| p.get_explicit_version(n)),
        }
    }

    pub fn is_explicit(&self, n: &Name) -> bool {
        if self.explicit_names.contains(n) {
            true
        } else {
            self.parent().map_or(false, |p| p.is_explicit(n))
        }
    }
}

// coercions
impl Frontend {
    /// It is too expensive to fully normalize a type when looking up a
    /// coercion, so we just follow a chain of definitional constants.
    /// This is intentionally incomplete: definitionally equal types that
    /// differ in arguments are treated as distinct.
    fn coercion_type_normalization(&self, ctx: &Ctx, t: &Expr) -> Expr {
        let mut t = t.clone();
        loop {
            match t.view() {
                ExprView::EConst(n) => match ctx.find_decl(n).and_then(|d| d.value().cloned()) {
                    Some(v) => t = v,
                    None => return t,
                },
                _ => return t,
            }
        }
    }

    /// Register a coercion function. Its type must be a non-dependent
    /// arrow `A -> B` with `A ≠ B` after quick normalization, and no
    /// coercion may already exist for the pair.
    pub fn add_coercion(&mut self, ctx: &mut Ctx, f: &Expr) -> Result<()> {
        self.check_writable()?;
        let ty = typecheck::infer_type(ctx, f)?;
        let (dom, body) = match ty.as_pi() {
            Some((_, dom, body)) if !body.has_free_var_in_range(0, 1) => {
                (dom.clone(), body.clone())
            }
            _ => {
                return Err(Error::new(
                    "invalid coercion declaration, a coercion must have an arrow type \
                     (i.e., a non-dependent functional type)",
                ))
            }
        };
        let to_raw = ctx.lower_free_vars(&body, 1, 1)?;
        let from = self.coercion_type_normalization(ctx, &dom);
        let to = self.coercion_type_normalization(ctx, &to_raw);
        if from == to {
            return Err(Error::new(
                "invalid coercion declaration, 'from' and 'to' types are the same",
            ));
        }
        if self.get_coercion_core(&from, &to).is_some() {
            return Err(Error::new(
                "invalid coercion declaration, frontend already has a coercion for the given types",
            ));
        }
        logdebug!("frontend.add_coercion {:?} : {:?} -> {:?}", f, from, to);
        self.coercion_map
            .insert((from.clone(), to.clone()), f.clone());
        self.coercion_set.insert(f.clone());
        let mut l = self.get_coercions_core(&from);
        l.insert(0, (to, f.clone()));
        self.type_coercions.insert(from, l);
        if let Some(n) = f.as_const() {
            self.decls_log.push(FrontendDecl::Coercion { name: n.clone() });
        }
        Ok(())
    }

    fn get_coercion_core(&self, from: &Expr, to: &Expr) -> Option<Expr> {
        match self.coercion_map.get(&(from.clone(), to.clone())) {
            Some(f) => Some(f.clone()),
            None => self.parent().and_then(|p| p.get_coercion_core(from, to)),
        }
    }

    /// The coercion for `(from, to)`, if registered. Both types are
    /// quick-normalized first.
    pub fn get_coercion(&self, ctx: &Ctx, from: &Expr, to: &Expr) -> Result<Option<Expr>> {
        let from = self.coercion_type_normalization(ctx, from);
        let to = self.coercion_type_normalization(ctx, to);
        Ok(self.get_coercion_core(&from, &to))
    }

    fn get_coercions_core(&self, from: &Expr) -> Vec<(Expr, Expr)> {
        match self.type_coercions.get(from) {
            Some(l) => l.clone(),
            None => self
                .parent()
                .map_or_else(Vec::new, |p| p.get_coercions_core(from)),
        }
    }

    /// All coercions out of `from`, as (to-type, function) pairs.
    pub fn get_coercions(&self, ctx: &Ctx, from: &Expr) -> Vec<(Expr, Expr)> {
        let from = self.coercion_type_normalization(ctx, from);
        self.get_coercions_core(&from)
    }

    pub fn is_coercion(&self, f: &Expr) -> bool {
        if self.coercion_set.contains(f) {
            true
        } else {
            self.parent().map_or(false, |p| p.is_coercion(f))
        }
    }
}

// aliases
impl Frontend {
    pub fn add_alias(&mut self, n: Name, e: Expr) -> Result<()> {
        self.check_writable()?;
        if self.get_alias(&n).is_some() {
            return Err(errorstr!("alias '{}' was already defined", n));
        }
        self.aliases.insert(n.clone(), e.clone());
        let mut l = self.get_aliased(&e).unwrap_or_default();
        l.insert(0, n.clone());
        self.inv_aliases.insert(e.clone(), l);
        if let Some(target) = e.as_const() {
            self.decls_log.push(FrontendDecl::Alias {
                name: n,
                target: target.clone(),
            });
        }
        Ok(())
    }

    pub fn get_alias(&self, n: &Name) -> Option<Expr> {
        match self.aliases.get(n) {
            Some(e) => Some(e.clone()),
            None => self.parent().and_then(|p| p.get_alias(n)),
        }
    }

    /// Names aliased to the expression, most recent first.
    pub fn get_aliased(&self, e: &Expr) -> Option<Vec<Name>> {
        match self.inv_aliases.get(e) {
            Some(l) => Some(l.clone()),
            None => self.parent().and_then(|p| p.get_aliased(e)),
        }
    }
}

impl Drop for Frontend {
    fn drop(&mut self) {
        if let Some(p) = &self.parent {
            p.children.set(p.children.get().saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frontend::operator;

    #[test]
    fn test_register_and_find() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let mut diags: Vec<String> = vec![];
        let add = ctx.mk_const_str("nat_add");
        let plus = Name::from_str("+");
        fe.add_op(operator::infixl(plus.clone(), 65), add.clone(), true, &mut diags)
            .unwrap();
        assert!(diags.is_empty());
        let op = fe.find_led(&plus).expect("op registered");
        assert_eq!(op.precedence(), 65);
        assert_eq!(op.denotations(), &[add.clone()]);
        assert_eq!(fe.get_lbp(&plus), Some(65));
        assert_eq!(fe.find_op_for(&add, false), Some(op));
        assert!(fe.find_nud(&plus).is_none());
    }

    #[test]
    fn test_redefinition_diagnostic() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let mut diags: Vec<String> = vec![];
        let nat_add = ctx.mk_const_str("nat_add");
        let int_add = ctx.mk_const_str("int_add");
        let plus = Name::from_str("+");
        fe.add_op(operator::infixl(plus.clone(), 65), nat_add.clone(), true, &mut diags)
            .unwrap();
        fe.add_op(operator::infixr(plus.clone(), 70), int_add.clone(), true, &mut diags)
            .unwrap();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].contains("redefined"));
        let op = fe.find_led(&plus).unwrap();
        assert_eq!(op.fixity(), crate::frontend::Fixity::Infixr);
        assert_eq!(op.precedence(), 70);
        assert_eq!(op.denotations(), &[int_add.clone()]);
        // the old denotation binding is gone
        assert!(fe.find_op_for(&nat_add, true).is_none());
        assert_eq!(fe.find_op_for(&int_add, true), Some(op));
    }

    #[test]
    fn test_overload_appends_denotation() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let mut diags: Vec<String> = vec![];
        let nat_add = ctx.mk_const_str("nat_add");
        let int_add = ctx.mk_const_str("int_add");
        let plus = Name::from_str("+");
        fe.add_op(operator::infixl(plus.clone(), 65), nat_add.clone(), true, &mut diags)
            .unwrap();
        fe.add_op(operator::infixl(plus.clone(), 65), int_add.clone(), true, &mut diags)
            .unwrap();
        assert!(diags.is_empty());
        let op = fe.find_led(&plus).unwrap();
        assert_eq!(op.denotations(), &[nat_add, int_add]);
    }

    #[test]
    fn test_child_shadows_parent() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let mut diags: Vec<String> = vec![];
        let nat_add = ctx.mk_const_str("nat_add");
        let plus = Name::from_str("+");
        fe.add_op(operator::infixl(plus.clone(), 65), nat_add.clone(), true, &mut diags)
            .unwrap();
        let parent = Ref::new(fe);
        let mut child = Frontend::child(&parent);
        // the parent entry is visible through the child
        assert!(child.find_led(&plus).is_some());
        // overloading in the child copies the operator down
        let int_add = ctx.mk_const_str("int_add");
        child
            .add_op(operator::infixl(plus.clone(), 65), int_add.clone(), true, &mut diags)
            .unwrap();
        let op = child.find_led(&plus).unwrap();
        assert_eq!(op.denotations().len(), 2);
        // the parent still sees only its own denotation
        assert_eq!(parent.find_led(&plus).unwrap().denotations().len(), 1);
    }

    #[test]
    fn test_frozen_while_child_exists() {
        let fe = Frontend::new();
        let parent = Ref::new(fe);
        let child = Frontend::child(&parent);
        assert!(parent.has_children());
        assert!(parent.check_writable().is_err());
        drop(child);
        assert!(!parent.has_children());
        assert!(parent.check_writable().is_ok());
    }

    #[test]
    fn test_mark_implicit_wrong_object_kind() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        // unknown object
        assert!(fe
            .mark_implicit_arguments(&mut ctx, &Name::from_str("unknown"), &[true])
            .is_err());
        // theorems do not accept implicit marks
        let b = ctx.mk_bool();
        ctx.add_var("p", b.clone()).unwrap();
        let p = ctx.mk_const_str("p");
        ctx.add_theorem("thm", b, p).unwrap();
        assert!(fe
            .mark_implicit_arguments(&mut ctx, &Name::from_str("thm"), &[true])
            .is_err());
    }

    #[test]
    fn test_mk_explicit_name() {
        let n = Name::from_str("foo");
        assert_eq!(format!("{}", Frontend::mk_explicit_name(&n).unwrap()), "@foo");
        let nested = Name::from_str("m").append_str("foo");
        assert_eq!(
            format!("{}", Frontend::mk_explicit_name(&nested).unwrap()),
            "m::@foo"
        );
        let num = Name::from_str("m").append_num(3);
        assert_eq!(
            format!("{}", Frontend::mk_explicit_name(&num).unwrap()),
            "m::3::explicit"
        );
        assert!(Frontend::mk_explicit_name(&Name::anonymous()).is_err());
    }

    #[test]
    fn test_mark_implicit() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let ty = ctx.mk_type();
        // g : pi A : Type. A -> A
        let v0 = ctx.mk_var(0);
        let a2a = ctx.mk_arrow(v0.clone(), v0).unwrap();
        let gty = ctx.mk_pi(Name::from_str("A"), ty, a2a).unwrap();
        ctx.add_var("g", gty).unwrap();
        let g = Name::from_str("g");
        fe.mark_implicit_arguments(&mut ctx, &g, &[true, false])
            .unwrap();
        // trailing explicit flag was trimmed
        assert_eq!(fe.get_implicit_arguments(&g), vec![true]);
        let at_g = fe.get_explicit_version(&g).unwrap();
        assert_eq!(format!("{}", at_g), "@g");
        assert!(fe.is_explicit(&at_g));
        // the explicit version now exists as an object
        assert!(ctx.find_decl(&at_g).is_some());
        // marking twice is rejected
        assert!(fe
            .mark_implicit_arguments(&mut ctx, &g, &[true])
            .is_err());
    }

    #[test]
    fn test_mark_implicit_all_explicit_fails() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let b = ctx.mk_bool();
        let b2b = ctx.mk_arrow(b.clone(), b).unwrap();
        ctx.add_var("f", b2b).unwrap();
        assert!(fe
            .mark_implicit_arguments(&mut ctx, &Name::from_str("f"), &[false])
            .is_err());
    }

    #[test]
    fn test_coercions() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let ty = ctx.mk_type();
        ctx.add_var("Int", ty.clone()).unwrap();
        ctx.add_var("Real", ty).unwrap();
        let int = ctx.mk_const_str("Int");
        let real = ctx.mk_const_str("Real");
        let i2r_ty = ctx.mk_arrow(int.clone(), real.clone()).unwrap();
        ctx.add_var("int_to_real", i2r_ty).unwrap();
        let i2r = ctx.mk_const_str("int_to_real");
        fe.add_coercion(&mut ctx, &i2r).unwrap();
        assert_eq!(fe.get_coercion(&ctx, &int, &real).unwrap(), Some(i2r.clone()));
        assert_eq!(fe.get_coercion(&ctx, &real, &int).unwrap(), None);
        assert!(fe.is_coercion(&i2r));
        assert_eq!(fe.get_coercions(&ctx, &int), vec![(real.clone(), i2r.clone())]);
        // duplicate rejected
        assert!(fe.add_coercion(&mut ctx, &i2r).is_err());
    }

    #[test]
    fn test_coercion_quick_normalization() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let ty = ctx.mk_type();
        ctx.add_var("Int", ty.clone()).unwrap();
        ctx.add_var("Real", ty.clone()).unwrap();
        let int = ctx.mk_const_str("Int");
        let real = ctx.mk_const_str("Real");
        // MyInt is a definitional alias of Int
        ctx.add_definition("MyInt", ty, int.clone()).unwrap();
        let myint = ctx.mk_const_str("MyInt");
        let c_ty = ctx.mk_arrow(myint.clone(), real.clone()).unwrap();
        ctx.add_var("c", c_ty).unwrap();
        let c = ctx.mk_const_str("c");
        fe.add_coercion(&mut ctx, &c).unwrap();
        // lookups under either spelling find the coercion
        assert!(fe.get_coercion(&ctx, &int, &real).unwrap().is_some());
        assert!(fe.get_coercion(&ctx, &myint, &real).unwrap().is_some());
    }

    #[test]
    fn test_coercion_must_be_arrow() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let b = ctx.mk_bool();
        ctx.add_var("x", b).unwrap();
        let x = ctx.mk_const_str("x");
        assert!(fe.add_coercion(&mut ctx, &x).is_err());
    }

    #[test]
    fn test_aliases() {
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let e = ctx.mk_const_str("c");
        fe.add_alias(Name::from_str("shortcut"), e.clone()).unwrap();
        assert_eq!(fe.get_alias(&Name::from_str("shortcut")), Some(e.clone()));
        fe.add_alias(Name::from_str("other"), e.clone()).unwrap();
        let l = fe.get_aliased(&e).unwrap();
        assert_eq!(l.len(), 2);
        assert_eq!(format!("{}", l[0]), "other"); // most recent first
        assert!(fe.add_alias(Name::from_str("shortcut"), e).is_err());
    }

    #[test]
    fn test_parent_monotonicity() {
        // child.q == child_local.q ?? parent.q for every query
        let mut ctx = Ctx::new();
        let mut fe = Frontend::new();
        let mut diags: Vec<String> = vec![];
        let d = ctx.mk_const_str("c");
        let tok = Name::from_str("!");
        fe.add_op(operator::postfix(tok.clone(), 90), d.clone(), true, &mut diags)
            .unwrap();
        fe.add_alias(Name::from_str("a1"), d.clone()).unwrap();
        let parent = Ref::new(fe);
        let child = Frontend::child(&parent);
        assert_eq!(child.find_led(&tok), parent.find_led(&tok));
        assert_eq!(child.get_lbp(&tok), parent.get_lbp(&tok));
        assert_eq!(child.get_alias(&Name::from_str("a1")), parent.get_alias(&Name::from_str("a1")));
        assert_eq!(
            child.find_op_for(&d, true).is_some(),
            parent.find_op_for(&d, true).is_some()
        );
    }
}
