use std::io::{self, BufRead, Write};

use sdds_error::{SddsError, SddsResult, sdds_bail, sdds_err};
use sdds_rpn::{RpnContext, infix_to_postfix};
use sdds_scalar::Value;
use sdds_scalar::text::format_value;

use crate::scan::match_option;

const OPTIONS: &[&str] = &["algebraic", "noDefinitions", "trace", "seed"];

#[derive(Debug, Default)]
struct Flags {
    algebraic: bool,
    definitions: bool,
    trace: bool,
    seed: Option<u64>,
    expressions: Vec<String>,
}

/// Words starting with `-` are options only when they name one, so `-1 2 +` stays an expression.
fn parse(args: &[String]) -> SddsResult<Flags> {
    let mut flags = Flags {
        definitions: true,
        ..Flags::default()
    };
    for arg in args {
        let option = arg.strip_prefix('-').and_then(|rest| {
            let (keyword, value) = match rest.split_once('=') {
                Some((keyword, value)) => (keyword, Some(value)),
                None => (rest, None),
            };
            match_option(keyword, OPTIONS).map(|i| (i, value))
        });
        match option {
            Some((0, None)) => flags.algebraic = true,
            Some((1, None)) => flags.definitions = false,
            Some((2, None)) => flags.trace = true,
            Some((3, Some(value))) => {
                flags.seed = Some(value.parse().map_err(|_| {
                    sdds_err!("invalid value \"{}\" for -seed", value)
                })?);
            }
            Some((_, _)) => sdds_bail!("invalid use of {}", arg),
            None => flags.expressions.push(arg.clone()),
        }
    }
    Ok(flags)
}

/// Run one expression and print the number left on top of the stack, if any.
fn evaluate_line(
    ctx: &mut RpnContext,
    line: &str,
    algebraic: bool,
    out: &mut impl Write,
) -> SddsResult<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let text = if algebraic {
        infix_to_postfix(line)?
    } else {
        line.to_string()
    };
    let before = ctx.numbers().count();
    ctx.execute(&text)?;
    if let Some(kind) = ctx.take_error() {
        log::warn!("{text}: raised {kind:?}");
    }
    match ctx.numbers().last() {
        Some(top) if ctx.numbers().count() >= before => {
            let text = format_value(&Value::Double(top), None)?;
            writeln!(out, "{text}").map_err(SddsError::from)
        }
        _ => Ok(()),
    }
}

/// Evaluate RPN expressions from the command line, or line by line from standard input.
///
/// Stacks and memories persist from one expression to the next, as in a calculator.
pub fn exec_rpn(args: &[String]) -> SddsResult<()> {
    let flags = parse(args)?;
    let mut ctx = match flags.seed {
        Some(seed) => RpnContext::new().with_seed(seed),
        None => RpnContext::new(),
    };
    ctx.set_trace(flags.trace);
    if flags.definitions {
        ctx.load_env_definitions()?;
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if flags.expressions.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if matches!(line.trim(), "quit" | "exit") {
                break;
            }
            // A bad line is reported and the session continues.
            if let Err(e) = evaluate_line(&mut ctx, &line, flags.algebraic, &mut out) {
                log::error!("{e}");
                ctx.clear();
            }
        }
    } else {
        for expression in &flags.expressions {
            evaluate_line(&mut ctx, expression, flags.algebraic, &mut out)?;
        }
    }
    out.flush().map_err(SddsError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(flags: &[&str], lines: &[&str]) -> String {
        let args = flags.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let flags = parse(&args).unwrap();
        let mut ctx = RpnContext::new();
        let mut out = Vec::new();
        for line in lines {
            evaluate_line(&mut ctx, line, flags.algebraic, &mut out).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn results_are_printed() {
        assert_eq!(run(&[], &["1 2 +", "3 *"]), "3\n9\n");
    }

    #[test]
    fn memories_persist() {
        assert_eq!(run(&[], &["4 sto r", "r r *"]), "4\n16\n");
    }

    #[test]
    fn algebraic_input() {
        assert_eq!(run(&["-algebraic"], &["(1+2)*4"]), "12\n");
    }

    #[test]
    fn negative_numbers_are_expressions() {
        let flags = parse(&["-1".to_string(), "-alg".to_string()]).unwrap();
        assert_eq!(flags.expressions, ["-1"]);
        assert!(flags.algebraic);
        assert!(parse(&["-seed=x".to_string()]).is_err());
    }
}
