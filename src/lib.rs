//! # Entail core library.
//!
//! This library contains the elaboration and rewriting core of a
//! dependently-typed proof assistant:
//!
//! - the term language and its manager (hashconsing, substitution,
//!   lifting, β-reduction) in `kernel`
//! - metavariables, unification constraints and the backtracking
//!   elaborator in `elab`
//! - higher-order pattern matching and proof-carrying rewriting in `algo`
//! - notation tables (operators, overloads, implicit arguments,
//!   coercions, aliases) and their serialization in `frontend`
//!
//! Lexing, the surface parser, the command-line driver and file I/O are
//! external collaborators; they interact with this crate only through
//! the types defined here.

#![deny(unsafe_code)]

pub mod algo;
pub mod elab;
pub mod error;
mod fnv;
pub mod frontend;
pub mod interrupt;
pub mod kernel;

pub use fnv::{new_set_with_cap, new_table_with_cap, FnvHashMap, FnvHashSet};

pub use elab::{Constraint, Elaborator, Justification};
pub use error::{Error, Result};
pub use frontend::{Diagnostics, Fixity, Frontend, Operator};
pub use interrupt::Interrupt;
pub use kernel::ExprView::*;
pub use kernel::{Context, Ctx, Expr, ExprView, Level, MetavarEnv, Name, Type};

pub(crate) mod macros {
    #[allow(unused_macros)]
    #[macro_export]
    macro_rules! ignore{
        () => { () };
        ($t :expr) => {{
            #[allow(unused_value)]
            let _ = $t;
        } };
        ($t0: expr, $($t:expr),*) => {{
            #[allow(unused_value)]
            let _ = $t0;
            crate::ignore!($($t),*)
        }}
    }

    #[macro_export]
    macro_rules! logtrace{
        ($($t:expr),*) => {{
            {
                #[cfg(feature="logging")]
                log::trace!($($t),*)
            }

            {
                #[cfg(not(feature="logging"))]
                crate::ignore!($($t),*)
            }
        }}
    }

    #[macro_export]
    macro_rules! logdebug{
        ($($t:expr),*) => {{
            {
                #[cfg(feature="logging")]
                log::debug!($($t),*)
            }

            {
                #[cfg(not(feature="logging"))]
                crate::ignore!($($t),*)
            }
        }}
    }

    #[macro_export]
    macro_rules! logerr{
        ($($t:expr),*) => {{
            {
                #[cfg(feature="logging")]
                log::error!($($t),*);
            }

            {
                #[cfg(not(feature="logging"))]
                crate::ignore!($($t),*);
            }
        }}
    }

    /// Build an `Error` from a format string.
    #[macro_export]
    macro_rules! errorstr {
        ($($t:expr),*) => {
            $crate::error::Error::new_string(format!($($t),*))
        }
    }
}
