//! Cooperative interruption.
//!
//! Long-running operations (elaborator enumeration, the repeat rewriter,
//! bottom-up simplification) poll an interrupt flag between steps. The
//! flag is a cheaply clonable handle; the host hands one clone to the
//! operation and keeps the other to trip it.

use crate::error::{Error, Result};
use std::{cell::Cell, rc::Rc};

/// A shared, cooperative interrupt flag.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Rc<Cell<bool>>);

impl Interrupt {
    /// New flag, initially not tripped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag. Operations polling it will stop at their next step.
    pub fn interrupt(&self) {
        self.0.set(true)
    }

    /// Reset the flag so the handle can be reused.
    pub fn reset(&self) {
        self.0.set(false)
    }

    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.0.get()
    }

    /// Fail with `Error::interrupted()` if the flag is tripped.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.0.get() {
            Err(Error::interrupted())
        } else {
            Ok(())
        }
    }
}
