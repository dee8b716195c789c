//! # Operator descriptors.
//!
//! One notation entry: fixity, precedence, token parts, the denotations
//! the tokens stand for, and internal names for overloaded display.
//! Descriptors are immutable records behind a shared handle; "mutation"
//! builds an extended copy (copy-on-write when a parent entry is
//! promoted into a child frontend).
//!
//! Two descriptors are *equal* iff fixity, precedence and token parts
//! match; denotations are not part of the identity.

use crate::kernel::{Expr, Name, Ref};
use std::fmt;

/// How a symbol behaves in the grammar.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Fixity {
    Prefix,
    Postfix,
    Infixl,
    Infixr,
    Mixfixl,
    Mixfixr,
    Mixfixc,
    Mixfixo,
}

impl Fixity {
    pub fn is_mixfix(self) -> bool {
        matches!(
            self,
            Fixity::Mixfixl | Fixity::Mixfixr | Fixity::Mixfixc | Fixity::Mixfixo
        )
    }

    /// Does this operator continue an expression (led table) rather
    /// than start one (nud table)?
    pub fn is_led(self) -> bool {
        matches!(
            self,
            Fixity::Infixl | Fixity::Infixr | Fixity::Postfix | Fixity::Mixfixr | Fixity::Mixfixo
        )
    }
}

/// An operator descriptor.
#[derive(Clone)]
pub struct Operator(Ref<OperatorImpl>);

struct OperatorImpl {
    fixity: Fixity,
    precedence: u32,
    /// Operator parts; more than one only for mixfix operators.
    parts: Vec<Name>,
    /// The terms this notation stands for; more than one when
    /// overloaded.
    denotations: Vec<Expr>,
    /// Internal names, for overloaded display.
    names: Vec<Name>,
}

fn mk_unary(op: Name, fixity: Fixity, precedence: u32) -> Operator {
    Operator(Ref::new(OperatorImpl {
        fixity,
        precedence,
        parts: vec![op],
        denotations: vec![],
        names: vec![],
    }))
}

fn mk_mixfix(parts: &[Name], fixity: Fixity, precedence: u32) -> Operator {
    assert!(parts.len() > 1, "mixfix operators need at least two parts");
    Operator(Ref::new(OperatorImpl {
        fixity,
        precedence,
        parts: parts.to_vec(),
        denotations: vec![],
        names: vec![],
    }))
}

pub fn infixl(op: Name, precedence: u32) -> Operator {
    mk_unary(op, Fixity::Infixl, precedence)
}
pub fn infixr(op: Name, precedence: u32) -> Operator {
    mk_unary(op, Fixity::Infixr, precedence)
}
pub fn prefix(op: Name, precedence: u32) -> Operator {
    mk_unary(op, Fixity::Prefix, precedence)
}
pub fn postfix(op: Name, precedence: u32) -> Operator {
    mk_unary(op, Fixity::Postfix, precedence)
}
pub fn mixfixl(parts: &[Name], precedence: u32) -> Operator {
    mk_mixfix(parts, Fixity::Mixfixl, precedence)
}
pub fn mixfixr(parts: &[Name], precedence: u32) -> Operator {
    mk_mixfix(parts, Fixity::Mixfixr, precedence)
}
pub fn mixfixc(parts: &[Name], precedence: u32) -> Operator {
    mk_mixfix(parts, Fixity::Mixfixc, precedence)
}
pub fn mixfixo(parts: &[Name], precedence: u32) -> Operator {
    mk_mixfix(parts, Fixity::Mixfixo, precedence)
}

impl Operator {
    #[inline]
    pub fn fixity(&self) -> Fixity {
        self.0.fixity
    }

    #[inline]
    pub fn precedence(&self) -> u32 {
        self.0.precedence
    }

    /// Leading token.
    pub fn op_name(&self) -> &Name {
        &self.0.parts[0]
    }

    /// All token parts.
    pub fn parts(&self) -> &[Name] {
        &self.0.parts
    }

    pub fn denotations(&self) -> &[Expr] {
        &self.0.denotations
    }

    pub fn internal_names(&self) -> &[Name] {
        &self.0.names
    }

    pub fn is_overloaded(&self) -> bool {
        self.0.names.len() > 1
    }

    /// Are all token parts plain ASCII?
    pub fn is_safe_ascii(&self) -> bool {
        self.0
            .parts
            .iter()
            .all(|p| format!("{}", p).is_ascii())
    }

    /// Extended copy with one more denotation.
    pub fn with_denotation(&self, d: Expr) -> Operator {
        let mut imp = self.copy_impl_();
        imp.denotations.push(d);
        Operator(Ref::new(imp))
    }

    /// Extended copy with one more internal name.
    pub fn with_internal_name(&self, n: Name) -> Operator {
        let mut imp = self.copy_impl_();
        imp.names.insert(0, n);
        Operator(Ref::new(imp))
    }

    /// Detached copy, for promoting a parent entry into a child
    /// frontend.
    pub fn copy(&self) -> Operator {
        Operator(Ref::new(self.copy_impl_()))
    }

    fn copy_impl_(&self) -> OperatorImpl {
        OperatorImpl {
            fixity: self.0.fixity,
            precedence: self.0.precedence,
            parts: self.0.parts.clone(),
            denotations: self.0.denotations.clone(),
            names: self.0.names.clone(),
        }
    }
}

mod impls {
    use super::*;

    impl Eq for Operator {}
    impl PartialEq for Operator {
        fn eq(&self, other: &Self) -> bool {
            self.0.fixity == other.0.fixity
                && self.0.precedence == other.0.precedence
                && self.0.parts == other.0.parts
        }
    }

    impl fmt::Debug for Operator {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            let f = match self.0.fixity {
                Fixity::Infixl => "Infixl",
                Fixity::Infixr => "Infixr",
                Fixity::Prefix => "Prefix",
                Fixity::Postfix => "Postfix",
                _ => "Mixfix",
            };
            write!(out, "{} {}", f, self.0.precedence)?;
            match self.0.fixity {
                Fixity::Mixfixl => {
                    for p in &self.0.parts {
                        write!(out, " {} _", p)?;
                    }
                }
                Fixity::Mixfixr | Fixity::Mixfixo => {
                    for p in &self.0.parts {
                        write!(out, " _ {}", p)?;
                    }
                }
                Fixity::Mixfixc => {
                    for (i, p) in self.0.parts.iter().enumerate() {
                        if i > 0 {
                            write!(out, " _")?;
                        }
                        write!(out, " {}", p)?;
                    }
                }
                _ => {
                    write!(out, " {}", self.op_name())?;
                }
            }
            if !self.0.names.is_empty() {
                write!(out, " \u{21a6}")?;
                for n in &self.0.names {
                    write!(out, " {}", n)?;
                }
            }
            Ok(())
        }
    }
}
