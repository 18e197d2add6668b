use std::fmt;

/// An error that can occur when parsing, building, sizing, preprocessing, or
/// converting data to and from element trees.
#[derive(Debug)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Error(Box::new(kind))
    }

    #[inline(never)]
    #[cold]
    pub(crate) fn eof(offset: u64) -> Error {
        Self::new(ErrorKind::Stream {
            msg: String::from("unexpected end of stream"),
            offset,
        })
    }

    #[cold]
    pub(crate) fn stream<T: Into<String>>(msg: T, offset: u64) -> Error {
        Self::new(ErrorKind::Stream {
            msg: msg.into(),
            offset,
        })
    }

    #[cold]
    pub(crate) fn format<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Format { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn constant<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Const { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn range<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Range { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn switch<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Switch { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn explicit<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Explicit { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn unknown_size<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::UnknownSize { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn context<T: Into<String>>(path: T) -> Error {
        Self::new(ErrorKind::Context { path: path.into() })
    }

    #[cold]
    pub(crate) fn xml<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Xml { msg: msg.into() })
    }

    #[cold]
    pub(crate) fn mapping<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Mapping { msg: msg.into() })
    }

    /// An error raised from user code, e.g. inside a [`lam`](crate::lam)
    /// expression or a repeat predicate
    #[cold]
    pub fn custom<T: Into<String>>(msg: T) -> Error {
        Self::new(ErrorKind::Explicit { msg: msg.into() })
    }

    /// Return the specific type of error
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Unwrap this error into its underlying type
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Whether this error is the non-fatal "size is not statically known"
    /// signal emitted by [`static_sizeof`](crate::Construct::static_sizeof)
    pub fn is_unknown_size(&self) -> bool {
        matches!(*self.0, ErrorKind::UnknownSize { .. })
    }

    /// Whether a greedy sequence treats this error as a clean end of input
    /// rather than a failure to propagate
    pub(crate) fn ends_sequence(&self) -> bool {
        matches!(
            *self.0,
            ErrorKind::Stream { .. }
                | ErrorKind::Format { .. }
                | ErrorKind::Const { .. }
                | ErrorKind::Range { .. }
        )
    }
}

/// Specific type of error
#[derive(Debug)]
pub enum ErrorKind {
    /// Stream underflow, overflow, misaligned bit-mode exit, or an invalid seek
    Stream {
        /// An error message describing the stream failure
        msg: String,
        /// The stream offset (bytes, or bits while in bit mode) of the failure
        offset: u64,
    },

    /// A value was out of representable range or had the wrong shape for a field
    Format {
        /// An error message describing the mismatch
        msg: String,
    },

    /// A constant field did not match its expected value
    Const {
        /// An error message naming the expected and actual values
        msg: String,
    },

    /// A count or size was negative or exceeded its bounds
    Range {
        /// An error message describing the violated bound
        msg: String,
    },

    /// A switch key matched no case and no default was given
    Switch {
        /// An error message naming the unmatched key
        msg: String,
    },

    /// Raised by user expressions and check fields
    Explicit {
        /// The user-supplied or check-generated message
        msg: String,
    },

    /// Static size could not be determined (non-fatal from `static_sizeof`)
    UnknownSize {
        /// Which construct could not be sized
        msg: String,
    },

    /// An expression referenced a path missing from the context
    Context {
        /// The path that failed to resolve
        path: String,
    },

    /// A missing tag or attribute, or an unparseable attribute literal
    Xml {
        /// An error message describing the element-tree failure
        msg: String,
    },

    /// An enum label had no mapping
    Mapping {
        /// An error message naming the unmapped label
        msg: String,
    },

    /// An error occurred when performing IO
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self.0 {
            ErrorKind::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            ErrorKind::Stream { ref msg, offset } => {
                write!(f, "stream error: {} (offset: {})", msg, offset)
            }
            ErrorKind::Format { ref msg } => write!(f, "format error: {}", msg),
            ErrorKind::Const { ref msg } => write!(f, "constant mismatch: {}", msg),
            ErrorKind::Range { ref msg } => write!(f, "range error: {}", msg),
            ErrorKind::Switch { ref msg } => write!(f, "switch error: {}", msg),
            ErrorKind::Explicit { ref msg } => write!(f, "{}", msg),
            ErrorKind::UnknownSize { ref msg } => {
                write!(f, "size is not statically known: {}", msg)
            }
            ErrorKind::Context { ref path } => {
                write!(f, "context lookup failed: {}", path)
            }
            ErrorKind::Xml { ref msg } => write!(f, "element error: {}", msg),
            ErrorKind::Mapping { ref msg } => write!(f, "mapping error: {}", msg),
            ErrorKind::Io(ref err) => write!(f, "io error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::new(ErrorKind::Io(error))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_size_error_struct() {
        assert!(std::mem::size_of::<Error>() <= 8);
    }

    #[test]
    fn test_unknown_size_is_non_fatal_signal() {
        let err = Error::unknown_size("greedy range");
        assert!(err.is_unknown_size());
        assert!(!Error::format("nope").is_unknown_size());
    }
}
