use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_scalar::text::{Tokenizer, parse_f64, unescape};

use crate::builtins::find_builtin;
use crate::context::RpnContext;
use crate::memory::MemoryValue;

/// One step of compiled code.
///
/// Jump targets of the conditional opcodes are offsets from the start of the block they were
/// compiled in, so a block can be placed anywhere in the UDF code arena.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Push a number.
    Number(f64),
    /// Push a string.
    Str(String),
    /// Run the built-in at this index of the sorted table.
    Builtin(usize),
    /// Call the UDF with this body number.
    Call(usize),
    /// Push the content of a memory slot.
    Recall(usize),
    /// Store the top of the numeric stack in a memory slot.
    Store(usize),
    /// Store the top of the string stack in a memory slot.
    StoreString(usize),
    /// `?`: pop a logical, continue when true, otherwise jump to `target`.
    If { target: usize },
    /// `:`: reached at the end of the true branch, jump to `target`.
    Else { target: usize },
    /// `$`: end of a conditional.
    EndIf,
    /// A name that resolved to nothing when compiled.
    Unknown(String),
}

/// A compiled top-level expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub(crate) ops: Vec<Opcode>,
}

impl Program {
    pub fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub(crate) fn looks_numeric(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '.' => true,
        Some('+' | '-') => chars.next().is_some_and(|c| c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

impl RpnContext {
    /// Compile whitespace-separated RPN text.
    ///
    /// Tokens resolve in order as a numeric literal, a quoted string, a built-in, a UDF, a
    /// memory, and otherwise stay unknown until [`RpnContext::link_udfs`] or execution time.
    /// `sto` and `ssto` take the following token as a memory name and create the memory.
    pub fn compile(&mut self, text: &str) -> SddsResult<Program> {
        let mut ops = Vec::new();
        // Positions of open `?` and `:` opcodes.
        let mut open: Vec<(usize, Option<usize>)> = Vec::new();
        let mut tokens = Tokenizer::new(text);
        while let Some(token) = tokens.next_raw() {
            if token.starts_with('"') {
                ops.push(Opcode::Str(unescape(token)));
                continue;
            }
            if looks_numeric(token) {
                if let Some(v) = parse_f64(token) {
                    ops.push(Opcode::Number(v));
                    continue;
                }
            }
            match token {
                "?" => {
                    open.push((ops.len(), None));
                    ops.push(Opcode::If { target: 0 });
                }
                ":" => {
                    let cond = open
                        .last_mut()
                        .ok_or_else(|| sdds_err!(UnknownToken: "':' without a preceding '?'"))?;
                    if cond.1.is_some() {
                        sdds_bail!(UnknownToken: "second ':' in one conditional");
                    }
                    cond.1 = Some(ops.len());
                    ops.push(Opcode::Else { target: 0 });
                }
                "$" => {
                    let (at_if, at_else) = open
                        .pop()
                        .ok_or_else(|| sdds_err!(UnknownToken: "'$' without a preceding '?'"))?;
                    let end = ops.len();
                    ops.push(Opcode::EndIf);
                    match at_else {
                        Some(at_else) => {
                            ops[at_if] = Opcode::If { target: at_else + 1 };
                            ops[at_else] = Opcode::Else { target: end };
                        }
                        None => ops[at_if] = Opcode::If { target: end },
                    }
                }
                "sto" | "ssto" => {
                    let name = tokens
                        .next_raw()
                        .ok_or_else(|| sdds_err!(UnknownToken: "{} requires a memory name", token))?;
                    let op = if token == "sto" {
                        Opcode::Store(self.create_memory(name, MemoryValue::Number(0.0))?)
                    } else {
                        Opcode::StoreString(
                            self.create_memory(name, MemoryValue::Text(String::new()))?,
                        )
                    };
                    ops.push(op);
                }
                _ => ops.push(
                    self.resolve(token)
                        .unwrap_or_else(|| Opcode::Unknown(token.to_string())),
                ),
            }
        }
        if !open.is_empty() {
            sdds_bail!(UnknownToken: "'?' without a closing '$' in \"{}\"", text.trim());
        }
        Ok(Program { ops })
    }

    /// Resolve a name as a built-in, a UDF call, or a memory recall.
    pub(crate) fn resolve(&self, name: &str) -> Option<Opcode> {
        if let Some(index) = find_builtin(name) {
            return Some(Opcode::Builtin(index));
        }
        self.resolve_late(name)
    }

    /// Resolve a name as a UDF call or a memory recall.
    pub(crate) fn resolve_late(&self, name: &str) -> Option<Opcode> {
        if let Some(number) = self.udfs.find(name) {
            return Some(Opcode::Call(number));
        }
        self.memories.find(name).map(Opcode::Recall)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[test]
    fn conditional_targets() {
        let mut ctx = RpnContext::new();
        let program = ctx.compile("1 2 > ? 10 : 20 $ 3").unwrap();
        let ops = program.ops();
        assert_eq!(ops[3], Opcode::If { target: 6 });
        assert_eq!(ops[5], Opcode::Else { target: 7 });
        assert_eq!(ops[7], Opcode::EndIf);
        assert_eq!(ops[8], Opcode::Number(3.0));
    }

    #[test]
    fn tokens_resolve_in_order() {
        let mut ctx = RpnContext::new();
        let program = ctx.compile("-1.5 \"a b\" sqrt 4 sto m m later").unwrap();
        let ops = program.ops();
        assert_eq!(ops[0], Opcode::Number(-1.5));
        assert_eq!(ops[1], Opcode::Str("a b".to_string()));
        assert!(matches!(ops[2], Opcode::Builtin(_)));
        assert!(matches!(ops[4], Opcode::Store(_)));
        assert!(matches!(ops[5], Opcode::Recall(_)));
        assert_eq!(ops[6], Opcode::Unknown("later".to_string()));
    }

    #[rstest]
    #[case("1 ? 2")]
    #[case("1 : 2 $")]
    #[case("2 $")]
    #[case("1 ? 2 : 3 : 4 $")]
    #[case("3 sto")]
    fn malformed(#[case] text: &str) {
        let mut ctx = RpnContext::new();
        assert_eq!(ctx.compile(text).unwrap_err().kind(), ErrorKind::UnknownToken);
    }
}
