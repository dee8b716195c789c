//! Algorithms on top of the kernel: higher-order pattern matching and
//! proof-carrying rewriting.

pub mod hop_match;
pub mod rw;

pub use hop_match::hop_match;
pub use rw::{
    rewrite_bottom_up, AppCongrRw, FailRw, FailureKind, IdRw, NoopMonitor, OrelseRw, RepeatRw,
    Res, Rewriter, Rw, SimpMonitor, TheoremRw, ThenRw, TryRw,
};
