//! Errors for the elaboration core.

use std::fmt;

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the kernel, the elaborator or the notation tables.
///
/// Errors are reserved for ill-formed inputs (an out-of-range logical
/// variable, a cyclic metavariable assignment, a non-arrow coercion, …).
/// A matcher mismatch, an elaboration dead end or a rewriter miss are
/// ordinary values, not errors.
#[derive(Debug, Clone)]
pub struct Error(Box<ErrorImpl>);

#[derive(Debug, Clone)]
pub struct ErrorImpl {
    pub msg: ErrorMsg,
    pub source: Option<Error>,
}

/// An error message.
#[derive(Debug, Clone)]
pub enum ErrorMsg {
    EStatic(&'static str),
    EDyn(String),
    /// Recursion-depth exhaustion during simplification; callers should
    /// report "term too deep" rather than crash.
    ETooDeep,
    /// The cooperative interrupt flag was raised.
    EInterrupted,
}

mod impls {
    use super::*;

    impl std::ops::Deref for Error {
        type Target = ErrorImpl;
        fn deref(&self) -> &Self::Target {
            &*self.0
        }
    }

    impl fmt::Display for Error {
        fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
            match &self.msg {
                ErrorMsg::EStatic(msg) => write!(out, "{}", msg),
                ErrorMsg::EDyn(s) => write!(out, "{}", &s),
                ErrorMsg::ETooDeep => write!(out, "term too deep"),
                ErrorMsg::EInterrupted => write!(out, "interrupted"),
            }
        }
    }

    impl std::error::Error for Error {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match &self.source {
                None => None,
                Some(p) => Some(&*p),
            }
        }
    }
}

impl Error {
    /// Build a new error.
    pub fn new(msg: &'static str) -> Self {
        Error(Box::new(ErrorImpl {
            msg: ErrorMsg::EStatic(msg),
            source: None,
        }))
    }

    pub fn new_string(msg: String) -> Self {
        Error(Box::new(ErrorImpl {
            msg: ErrorMsg::EDyn(msg),
            source: None,
        }))
    }

    /// The error raised when a recursive simplification exhausts its
    /// depth budget.
    pub fn too_deep() -> Self {
        Error(Box::new(ErrorImpl {
            msg: ErrorMsg::ETooDeep,
            source: None,
        }))
    }

    /// The error raised when the cooperative interrupt flag trips.
    pub fn interrupted() -> Self {
        Error(Box::new(ErrorImpl {
            msg: ErrorMsg::EInterrupted,
            source: None,
        }))
    }

    /// Did this error come from the depth guard?
    pub fn is_too_deep(&self) -> bool {
        matches!(self.msg, ErrorMsg::ETooDeep)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.msg, ErrorMsg::EInterrupted)
    }

    /// Change the source of this error.
    pub fn set_source(&mut self, src: Self) {
        // append at the end of the `source` linked list.
        if let Some(e2) = &mut self.0.source {
            e2.set_source(src)
        } else {
            self.0.source = Some(src);
        }
    }

    pub fn with_source(mut self, src: Self) -> Self {
        self.set_source(src);
        self
    }

    /// Display the error, along with its source if any.
    pub fn to_string_with_src(&self) -> String {
        use std::fmt::Write;

        let mut s = String::new();
        let mut e = self;
        loop {
            write!(&mut s, "{}", e).unwrap();
            if let Some(src) = &e.0.source {
                write!(&mut s, "\nin ").unwrap();
                e = src;
            } else {
                break;
            }
        }
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_size() {
        // errors should be relatively small (one pointer here)
        assert!(std::mem::size_of::<Error>() <= 8);
    }

    #[test]
    fn test_kinds() {
        assert!(Error::too_deep().is_too_deep());
        assert!(!Error::new("foo").is_too_deep());
        assert!(Error::interrupted().is_interrupted());
    }

    #[test]
    fn test_source_chain() {
        let e = Error::new("outer").with_source(Error::new_string("inner".into()));
        assert_eq!(e.to_string_with_src(), "outer\nin inner");
    }
}
