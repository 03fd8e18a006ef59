//! §3 `ProcDescriptor` / `Local`, and component H, the body compiler
//! driver.

use std::io::Write;

use crate::bytecode::ByteCode;
use crate::emit::{Emitter, SEP};
use crate::error::{Error, Result};
use crate::frontend::CompileFrontend;
use crate::literal::Literal;

/// Bit positions taken from the original `varFlagsList` table: only two of
/// its eleven slots are ever non-zero (`VAR_ARGUMENT` at 8, `VAR_TEMPORARY`
/// at 9); everything else is preserved as zero for wire compatibility with
/// loaders expecting the full eleven-bit layout.
pub mod local_flags {
    pub const ARGUMENT: u32 = 1 << 8;
    pub const TEMPORARY: u32 = 1 << 9;
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub frame_index: u32,
    pub default_value: Option<Literal>,
    pub flags: u32,
}

impl Local {
    fn mask(&self) -> u32 {
        self.flags
    }

    fn serialize<W: Write>(&self, emitter: &mut Emitter<W>) -> Result<()> {
        emitter.bytes(self.name.as_bytes())?;
        let has_default = self.default_value.is_some();
        emitter.int(self.frame_index as i64, b' ')?;
        emitter.int(has_default as i64, b' ')?;
        emitter.int(self.mask() as i64, SEP)?;
        if let Some(default) = &self.default_value {
            default.serialize(emitter)?;
        }
        Ok(())
    }
}

/// A compiled procedure body: the recompiled bytecode image plus the
/// argument/local descriptor list built by [`compile_proc_body`].
#[derive(Debug, Clone)]
pub struct ProcDescriptor {
    pub num_args: u32,
    pub locals: Vec<Local>,
    pub body: Box<ByteCode>,
}

impl ProcDescriptor {
    pub fn serialize<W: Write>(&self, emitter: &mut Emitter<W>) -> Result<()> {
        self.body.serialize(emitter)?;
        emitter.int(self.num_args as i64, b' ')?;
        emitter.int(self.locals.len() as i64, SEP)?;
        for local in &self.locals {
            local.serialize(emitter)?;
        }
        Ok(())
    }
}

/// One parsed formal argument: `name` alone, or `{name default}`.
struct ParsedArg {
    name: String,
    default: Option<String>,
}

/// Splits a Tcl-style arg-list literal (`{a} {b 1} c`) into its formal
/// arguments, rejecting array-element syntax (`x(0)`) per §4.H step 1 / S6.
fn parse_arg_list(args_text: &str, proc_name: &str) -> Result<Vec<ParsedArg>> {
    let mut out = Vec::new();
    for raw in split_tcl_list(args_text) {
        let fields = split_tcl_list(&raw);
        let parsed = match fields.len() {
            1 => ParsedArg { name: fields[0].clone(), default: None },
            2 => ParsedArg { name: fields[0].clone(), default: Some(fields[1].clone()) },
            _ => {
                return Err(Error::compile(format!(
                    "too many fields in argument specifier \"{raw}\""
                )));
            }
        };
        if parsed.name.contains('(') && parsed.name.ends_with(')') {
            return Err(Error::compile(format!(
                "procedure \"{proc_name}\" has argument with illegal array element syntax \"{}\"",
                parsed.name
            )));
        }
        out.push(parsed);
    }
    Ok(out)
}

/// Minimal brace/whitespace list splitter sufficient for the args-list
/// shapes the fixture frontend and the scenarios in §8 exercise. Not a
/// general Tcl list parser: no backslash or quoted-word handling beyond
/// what `{...}` grouping needs.
pub(crate) fn split_tcl_list(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.trim().chars().peekable();
    while chars.peek().is_some() {
        while chars.peek() == Some(&' ') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut depth = 1;
            let mut word = String::new();
            for c in chars.by_ref() {
                match c {
                    '{' => {
                        depth += 1;
                        word.push(c);
                    }
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                        word.push(c);
                    }
                    _ => word.push(c),
                }
            }
            out.push(word);
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c == ' ' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            out.push(word);
        }
    }
    out
}

/// Component H: for one proc-site whose body is still compilable, parse
/// its argument list, build a `ProcDescriptor`, and ask the frontend to
/// recompile the body in that descriptor's context.
///
/// `line` is used only to annotate a recompile failure (§7's
/// "compiling body of proc" form).
pub fn compile_proc_body(
    frontend: &mut dyn CompileFrontend,
    proc_name: &str,
    args_text: &str,
    body_text: &str,
    line: u32,
) -> Result<ProcDescriptor> {
    let parsed_args = parse_arg_list(args_text, proc_name)?;
    let mut locals = Vec::with_capacity(parsed_args.len());
    for (i, arg) in parsed_args.iter().enumerate() {
        locals.push(Local {
            name: arg.name.clone(),
            frame_index: i as u32,
            default_value: arg.default.as_ref().map(|d| Literal::string(d.clone())),
            flags: local_flags::ARGUMENT,
        });
    }

    // A transient dummy command name, unique within this compile, binds the
    // body to a command context the frontend's proc compiler requires (step
    // 3 of §4.H). The frontend fixture doesn't need the binding to persist
    // past the call, so no explicit disposal step is modeled here.
    let dummy_name = frontend.next_dummy_command_name();

    let body = frontend
        .compile_proc_body(&dummy_name, &locals, body_text)
        .map_err(|e| Error::compile_in_proc(format!("{e}"), proc_name, line))?;

    Ok(ProcDescriptor { num_args: locals.len() as u32, locals, body: Box::new(body) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_array_element_argument_syntax() {
        let err = parse_arg_list("{x(0) 1}", "p").unwrap_err();
        assert!(format!("{err}").contains("illegal array element syntax"));
    }

    #[test]
    fn splits_simple_and_defaulted_args() {
        let args = parse_arg_list("a {b 1}", "p").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "a");
        assert!(args[0].default.is_none());
        assert_eq!(args[1].name, "b");
        assert_eq!(args[1].default.as_deref(), Some("1"));
    }
}
