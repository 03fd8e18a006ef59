//! Component J: the emission orchestrator. Ties every other component
//! together into the five-step drive §4.J describes and the three public
//! operations §6 names (`compile`, `getBytecodeExtension`, `getTclVer`).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::analyzer::analyze;
use crate::bytecode::ByteCode;
use crate::constants;
use crate::context::CompilerContext;
use crate::emit::{Emitter, SEP};
use crate::error::{Error, Result};
use crate::frontend::CompileFrontend;
use crate::literal::Literal;
use crate::procbody::compile_proc_body;
use crate::procsite::ProcSiteLocator;
use crate::rewriter::{append_loader_proc_literal, rewrite};
use crate::unshare::unshare_bodies;

/// Caller-supplied knobs for one `compile` call. Mirrors the `?-preamble
/// TEXT?` option in §6's operation table, plus the loader-error override
/// §7/§9 describe (a namespace-variable lookup in the original; modeled
/// here as a plain `Option<&str>` since this crate has no namespace of its
/// own to read from).
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub preamble: Option<String>,
    pub loader_error_override: Option<String>,
}

/// Host runtime version string, the `getTclVer` operation's return value.
pub fn host_version() -> &'static str {
    "8.4"
}

/// The `getBytecodeExtension` operation.
pub fn bytecode_extension() -> &'static str {
    constants::TC_EXTENSION
}

/// Resolves the loader-error message embedded in the preamble: the caller's
/// override if given, otherwise the pinned default. Unlike the original
/// (§9's second open question), there is no reference-counted object here
/// to leak on any branch — both arms simply produce an owned `String`.
pub fn loader_error_message(override_message: Option<&str>) -> String {
    override_message.map(str::to_string).unwrap_or_else(|| constants::DEFAULT_LOADER_ERROR_MESSAGE.to_string())
}

/// Drives §4.E through §4.I over an already-compiled top-level `ByteCode`:
/// analyze literal references, unshare bodies that need it, recompile every
/// compilable proc-site's body, and rewrite the `proc` pushes to the
/// loader's replacement.
fn post_process(frontend: &mut dyn CompileFrontend, code: &mut ByteCode, sites: &mut Vec<crate::procsite::ProcSite>) -> Result<()> {
    let mut analysis = analyze(code, sites);
    unshare_bodies(code, sites, &mut analysis);

    for site in sites.iter() {
        if !site.is_compilable() {
            continue;
        }
        let name = literal_text(code, site.name_index, "proc name")?;
        let args_text = literal_text(code, site.args_index, "proc argument list")?;
        // Read from `body_new_index`, not `body_orig_index`: for a shared
        // body, the first site's slot is the original index and gets
        // overwritten with the compiled `ProcBody` below, so a later site
        // sharing that same original index must read its own unshared copy
        // instead of the now-overwritten original (§4.G).
        let body_text = literal_text(code, site.body_new_index, "proc body")?;

        let descriptor = compile_proc_body(frontend, &name, &args_text, &body_text, 1)?;
        code.literals[site.body_new_index as usize] = Literal::ProcBody(Box::new(descriptor));
    }

    let k = append_loader_proc_literal(code);
    rewrite(code, sites, k);
    Ok(())
}

fn literal_text(code: &ByteCode, index: i64, what: &str) -> Result<String> {
    code.literals
        .get(index as usize)
        .and_then(Literal::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Malformed(format!("{what} literal is not a string")))
}

/// Writes the script preamble, signature line, bytecode image, and
/// postamble into one buffer — §4.J step 4 and §6's file-format grammar.
fn emit_object_file(code: &ByteCode, opts: &CompileOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut emitter = Emitter::new(&mut buf);

        if let Some(preamble) = &opts.preamble {
            emitter.string(preamble, SEP)?;
        }

        let loader_err = loader_error_message(opts.loader_error_override.as_deref());
        let mut script_preamble = String::new();
        script_preamble.push_str("if {[catch {package require ");
        script_preamble.push_str(constants::READER_PACKAGE);
        script_preamble.push(' ');
        script_preamble.push_str(constants::READER_PACKAGE_VERSION);
        script_preamble.push_str("} err]} {\n    return -code error \"[info script]: ");
        script_preamble.push_str(&loader_err);
        script_preamble.push_str(" -- $err\"\n}\n");
        script_preamble.push_str(constants::READER_PACKAGE);
        script_preamble.push_str("::");
        script_preamble.push_str(constants::EVAL_COMMAND);
        script_preamble.push_str(" {\n");
        emitter.sink_mut().write_all(script_preamble.as_bytes())?;

        emitter.string(constants::SIGNATURE_HEADER, b' ')?;
        emitter.int(constants::FORMAT_VERSION as i64, b' ')?;
        emitter.string(constants::WRITER_VERSION, b' ')?;
        emitter.string(host_version(), SEP)?;

        code.serialize(&mut emitter)?;

        if cfg!(feature = "catch_wrapper") {
            let postamble = format!("}} ;# strips {}\n", constants::ERRORINFO_MARKER);
            emitter.sink_mut().write_all(postamble.as_bytes())?;
        } else {
            emitter.sink_mut().write_all(b"}\n")?;
        }
        emitter.flush()?;
    }
    Ok(buf)
}

/// The core of §4.J: drives the frontend with the proc-site hook installed,
/// post-processes the result, and emits the object file as an in-memory
/// buffer. The interpreter's literal-interning state is saved before the
/// compile and restored afterward on every exit path (§5), whether the
/// compile succeeded or failed.
pub fn compile(
    frontend: &mut dyn CompileFrontend,
    context: &mut CompilerContext,
    source: &str,
    opts: &CompileOptions,
) -> Result<Vec<u8>> {
    log::debug!("compile: starting on {} bytes of source", source.len());
    let saved = context.begin_compile();

    let result = (|| {
        let mut hook = ProcSiteLocator::default();
        let mut code = frontend.compile_script(source, &mut hook)?;
        let mut sites = hook.sites;
        post_process(frontend, &mut code, &mut sites)?;
        emit_object_file(&code, opts)
    })();

    context.end_compile(saved);
    match &result {
        Ok(bytes) => log::debug!("compile: finished, {} bytes emitted", bytes.len()),
        Err(e) => log::warn!("compile: failed: {e}"),
    }
    result
}

/// Replaces `in_path`'s extension with [`bytecode_extension`] when no
/// explicit output path is given (§6: "`in_path` with extension replaced by
/// `.tbc`").
fn default_output_path(in_path: &Path) -> PathBuf {
    in_path.with_extension(constants::TC_EXTENSION.trim_start_matches('.'))
}

/// §4.J step 1 plus steps 2-5: resolves the output path, reads the input,
/// compiles it, and writes the result, preserving the input file's
/// permission bits on the output (§2 supplement 2).
pub fn compile_file(
    frontend: &mut dyn CompileFrontend,
    context: &mut CompilerContext,
    in_path: &Path,
    out_path: Option<&Path>,
    opts: &CompileOptions,
) -> Result<PathBuf> {
    let source = fs::read_to_string(in_path)?;
    let metadata = fs::metadata(in_path)?;
    let out_path = out_path.map(Path::to_path_buf).unwrap_or_else(|| default_output_path(in_path));

    let bytes = compile(frontend, context, &source, opts).map_err(|e| annotate_file(e, in_path))?;

    let mut file = fs::File::create(&out_path)?;
    file.write_all(&bytes)?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
    }

    Ok(out_path)
}

/// Annotates a bare compile error with the source file name (§7:
/// "`compile-error`: ... annotated with `(file "X" line N)` for top-level
/// sources"). Errors that already carry location info, or aren't compile
/// errors at all, pass through unchanged.
fn annotate_file(err: Error, in_path: &Path) -> Error {
    match err {
        Error::Compile { message, file: None, line } => {
            Error::Compile { message, file: Some(in_path.display().to_string()), line: line.or(Some(1)) }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ScriptFrontend;

    #[test]
    fn empty_script_emits_preamble_signature_and_zeroed_image() {
        let mut frontend = ScriptFrontend::new();
        let mut ctx = CompilerContext::new();
        let bytes = compile(&mut frontend, &mut ctx, "", &CompileOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(&format!("{}::{}", constants::READER_PACKAGE, constants::EVAL_COMMAND)));
        assert!(text.contains(constants::SIGNATURE_HEADER));
        assert!(text.contains("0 0 0 0 0 0 0 0 0\n"));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn user_preamble_is_written_before_the_script_preamble() {
        let mut frontend = ScriptFrontend::new();
        let mut ctx = CompilerContext::new();
        let opts = CompileOptions { preamble: Some("#!/usr/bin/env tclsh".to_string()), ..Default::default() };
        let bytes = compile(&mut frontend, &mut ctx, "", &opts).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("#!/usr/bin/env tclsh\n"));
    }

    #[test]
    fn proc_with_array_element_argument_fails_the_whole_compile() {
        let mut frontend = ScriptFrontend::new();
        let mut ctx = CompilerContext::new();
        let err = compile(&mut frontend, &mut ctx, "proc p {x(0)} {return 1}", &CompileOptions::default())
            .unwrap_err();
        assert!(format!("{err}").contains("illegal array element syntax"));
    }

    #[test]
    fn literal_interner_is_restored_after_a_failed_compile() {
        let mut frontend = ScriptFrontend::new();
        let mut ctx = CompilerContext::new();
        ctx.interner_mut().intern("steady-state");
        let before = ctx.interner_mut().len();
        let _ = compile(&mut frontend, &mut ctx, "proc p {x(0)} {return 1}", &CompileOptions::default());
        assert_eq!(ctx.interner_mut().len(), before);
    }

    #[test]
    fn loader_error_message_defaults_when_no_override_given() {
        assert_eq!(loader_error_message(None), constants::DEFAULT_LOADER_ERROR_MESSAGE);
        assert_eq!(loader_error_message(Some("custom")), "custom");
    }
}
