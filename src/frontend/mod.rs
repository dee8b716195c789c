//! Frontend extension: operator descriptors, notation tables,
//! implicit-argument information, coercions, aliases, and their
//! serialization.

pub mod notation;
pub mod operator;
pub mod serialize;

pub use notation::{Diagnostics, Frontend, FrontendDecl, IgnoreDiags};
pub use operator::{
    infixl, infixr, mixfixc, mixfixl, mixfixo, mixfixr, postfix, prefix, Fixity, Operator,
};
pub use serialize::{read_declaration, write_declaration, Deserializer, Serializer};

use std::sync::atomic::{AtomicU32, Ordering};

/// Stable identifier of a frontend extension kind.
///
/// The registry is the only process-wide state in the core: each
/// extension kind registers once at initialization and keeps its id for
/// the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionId(u32);

static NEXT_EXTENSION_ID: AtomicU32 = AtomicU32::new(0);

/// Allocate a fresh, stable extension id.
pub fn register_extension() -> ExtensionId {
    ExtensionId(NEXT_EXTENSION_ID.fetch_add(1, Ordering::SeqCst))
}

impl ExtensionId {
    pub fn index(self) -> u32 {
        self.0
    }
}
