//! Errors shared by the decoder and the encoder.
//!
//! Every failure carries a coarse kind, the name of the routine that
//! raised it and a human readable description. Entropy-level stream
//! damage inside a restart interval is *not* reported through this
//! type; scan drivers log a warning and recover locally.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Coarse failure classes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorKind {
    /// Codestream violation: wrong marker sequence, out-of-range table
    /// index, segment length mismatch.
    MalformedStream,
    /// Premature end of input during a read.
    UnexpectedEof,
    /// A configuration produced a marker segment exceeding 64 KB.
    OverflowParameter,
    /// The codestream uses a feature outside the supported set.
    NotImplemented,
    /// Caller-side misconfiguration.
    InvalidParameter,
    /// A scan references a table that was never installed.
    ObjectDoesntExist,
}

/// An error raised by the codec.
#[allow(clippy::module_name_repetitions)]
pub struct JpgError {
    kind:        ErrorKind,
    /// The routine that constructed the error, e.g. `"parse_dht"`.
    method:      &'static str,
    description: String,
}

pub type JpgResult<T> = Result<T, JpgError>;

impl JpgError {
    pub fn new(kind: ErrorKind, method: &'static str, description: impl Into<String>) -> JpgError {
        JpgError {
            kind,
            method,
            description: description.into(),
        }
    }

    /// Shorthand for the most common kind.
    pub fn malformed(method: &'static str, description: impl Into<String>) -> JpgError {
        JpgError::new(ErrorKind::MalformedStream, method, description)
    }

    pub fn eof(method: &'static str) -> JpgError {
        JpgError::new(ErrorKind::UnexpectedEof, method, "input exhausted")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Debug for JpgError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} in {}: {}", self.kind, self.method, self.description)
    }
}

impl Display for JpgError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::MalformedStream => {
                write!(f, "Malformed stream ({}): {}", self.method, self.description)
            }
            ErrorKind::UnexpectedEof => {
                write!(f, "Unexpected end of stream ({})", self.method)
            }
            ErrorKind::OverflowParameter => {
                write!(f, "Parameter overflow ({}): {}", self.method, self.description)
            }
            ErrorKind::NotImplemented => {
                write!(f, "Not implemented ({}): {}", self.method, self.description)
            }
            ErrorKind::InvalidParameter => {
                write!(f, "Invalid parameter ({}): {}", self.method, self.description)
            }
            ErrorKind::ObjectDoesntExist => {
                write!(f, "Missing object ({}): {}", self.method, self.description)
            }
        }
    }
}

impl Error for JpgError {}
