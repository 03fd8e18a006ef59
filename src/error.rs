//! Crate-wide error type.
//!
//! Mirrors the shape of a typical parsing/writing crate's error enum: an
//! `Io` variant carrying the underlying OS error, plus a small closed set of
//! domain-specific variants. Kept as a plain enum with manual `Display`
//! impls rather than pulling in a macro-based error crate, since nothing
//! else in this crate's dependency graph needs one.

use core::fmt;
use core::result;
use std::io;

/// Maximum length, in bytes, a procedure name is allowed to reach inside a
/// `Compile` error's annotation before it is truncated with an ellipsis.
pub const MAX_NAME_LEN: usize = 50;

#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure opening, reading, writing, or closing a file.
    Io(io::Error),
    /// The public `compile` surface was called with a malformed argument
    /// list.
    BadArgs(String),
    /// The compiler frontend rejected the source, or rejected a procedure
    /// body during post-processing.
    Compile {
        message: String,
        file: Option<String>,
        line: Option<u32>,
    },
    /// The serializer encountered something it has no faithful way to
    /// represent: an unrecognized `AuxData` tag, or an exception-range type
    /// with no one-letter mapping. Always an internal invariant violation.
    Format(String),
    /// A `ByteCode` failed a structural expectation while being walked
    /// (e.g. a proc-site's instruction shape did not match push*4,
    /// invoke_stk1 4).
    Malformed(String),
}

impl Error {
    pub fn compile<S: Into<String>>(message: S) -> Error {
        Error::Compile {
            message: message.into(),
            file: None,
            line: None,
        }
    }

    /// A `compile-error` annotated with a source file name and line, in the
    /// form the writer appends to a top-level compile failure.
    pub fn compile_at_file<S: Into<String>>(message: S, file: S, line: u32) -> Error {
        Error::Compile {
            message: message.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }

    /// A `compile-error` annotated the way a procedure-body recompile
    /// failure is, with the proc name truncated to `MAX_NAME_LEN` bytes.
    pub fn compile_in_proc<S: Into<String>>(message: S, proc_name: &str, line: u32) -> Error {
        let name = truncate_name(proc_name);
        Error::Compile {
            message: format!(
                "{} (compiling body of proc \"{}\", line {})",
                message.into(),
                name,
                line
            ),
            file: None,
            line: Some(line),
        }
    }
}

/// Truncates a name to `MAX_NAME_LEN` bytes, appending an ellipsis marker
/// when truncation actually occurred.
pub fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let mut cut = MAX_NAME_LEN;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &name[..cut])
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::BadArgs(msg) => write!(f, "bad arguments: {msg}"),
            Error::Compile {
                message,
                file: Some(file),
                line: Some(line),
            } => write!(f, "{message}\n    (file \"{file}\" line {line})"),
            Error::Compile { message, .. } => write!(f, "{message}"),
            Error::Format(msg) => write!(f, "format error: {msg}"),
            Error::Malformed(msg) => write!(f, "malformed bytecode: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_untouched() {
        assert_eq!(truncate_name("shortname"), "shortname");
    }

    #[test]
    fn long_name_truncated_with_ellipsis() {
        let name = "a".repeat(80);
        let truncated = truncate_name(&name);
        assert_eq!(truncated.len(), MAX_NAME_LEN + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn compile_error_with_location_formats_like_original() {
        let err = Error::compile_at_file("syntax error", "script.tcl", 12);
        let rendered = format!("{err}");
        assert!(rendered.contains("(file \"script.tcl\" line 12)"));
    }
}
