//! String and character constants pinned by the wire format.
//!
//! These mirror the `#define`s a writer/loader pair agrees on ahead of time
//! (signature header, file extension, the loader's public command names).
//! Keeping them in one place means the serializer, the orchestrator, and
//! the CLI surface can't drift from each other.

/// First word of the signature line.
pub const SIGNATURE_HEADER: &str = "TclPro ByteCode";

/// Current on-disk format version, written as the second field of the
/// signature line.
pub const FORMAT_VERSION: u32 = 3;

/// Version of this writer, written as the third field of the signature
/// line.
pub const WRITER_VERSION: &str = "1.9";

/// Default extension applied to an output path when none is given.
pub const TC_EXTENSION: &str = ".tbc";

/// Name of the loader package `package require`d by the emitted preamble.
pub const READER_PACKAGE: &str = "tbcload";

/// Version of the loader package required by the emitted preamble.
pub const READER_PACKAGE_VERSION: &str = "1.9";

/// Name of the loader's bytecode-evaluation entry point.
pub const EVAL_COMMAND: &str = "bceval";

/// Name of the loader's replacement for the `proc` command, substituted in
/// for every literal `"proc"` push that survives post-processing.
pub const PROC_COMMAND: &str = "bcproc";

/// Marker appended to `errorInfo` so a catch-wrapped postamble can strip the
/// extra backtrace frame contributed by the eval call. Only meaningful when
/// the `catch_wrapper` feature is enabled.
pub const ERRORINFO_MARKER: &str = "----------####----------";

/// Default message substituted for the loader-error namespace variable when
/// it is absent. Embedded verbatim in the preamble so that loading the
/// output against a missing/old loader produces a readable error.
pub const DEFAULT_LOADER_ERROR_MESSAGE: &str =
    "This file was compiled for a newer version of the loader package";

/// Fully-qualified name of the loader-proc replacement literal pushed in
/// place of `"proc"` after rewriting.
pub fn qualified_proc_command() -> String {
    format!("{}::{}", READER_PACKAGE, PROC_COMMAND)
}
