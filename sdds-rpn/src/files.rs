//! Definitions files and nested command input.
//!
//! A definitions file is RPN text read line by line. Lines starting with `/*` are comments. A
//! line holding only `udf` defines a function: the next line is its name and the following
//! lines, up to a blank line, are its body. Every other line is executed.

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use sdds_error::{ErrorKind, SddsResult, sdds_bail, sdds_err};

use crate::context::RpnContext;

/// Environment variable naming a definitions file to load before evaluation.
pub const RPN_DEFNS: &str = "RPN_DEFNS";

/// Maximum nesting of input files.
pub const MAX_INPUT_DEPTH: usize = 10;

impl RpnContext {
    /// Execute the definitions file at `path` as a nested input frame.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> SddsResult<()> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| sdds_err!(NotFound: "cannot open {}: {}", path.display(), e))?;
        self.run_source(BufReader::new(file), &path.display().to_string())
    }

    /// Execute definitions read from `input`. `origin` names the source in error messages.
    pub fn run_source(&mut self, input: impl BufRead, origin: &str) -> SddsResult<()> {
        if self.input_depth >= MAX_INPUT_DEPTH {
            self.set_error(ErrorKind::StackOverflow);
            sdds_bail!(
                StackOverflow: "input files nested more than {} deep at {}",
                MAX_INPUT_DEPTH, origin
            );
        }
        self.input_depth += 1;
        let result = self.run_lines(input);
        self.input_depth -= 1;
        result.map_err(|e| e.with_context(format!("while reading {origin}")))
    }

    fn run_lines(&mut self, input: impl BufRead) -> SddsResult<()> {
        let mut lines = input.lines();
        while let Some(line) = lines.next() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.starts_with("/*") || trimmed.is_empty() {
                continue;
            }
            if trimmed != "udf" {
                self.execute(trimmed)?;
                continue;
            }
            let name = match lines.next() {
                Some(name) => name?.split_whitespace().collect::<String>(),
                None => sdds_bail!(UnexpectedEof: "udf without a function name"),
            };
            let mut body = Vec::new();
            for line in lines.by_ref() {
                let line = line?;
                if line.trim().is_empty() {
                    break;
                }
                body.push(line);
            }
            self.create_udf(&name, &body.join(" "))?;
        }
        self.link_udfs();
        Ok(())
    }

    /// Load the file named by `RPN_DEFNS`, if set. Returns whether a file was loaded.
    pub fn load_env_definitions(&mut self) -> SddsResult<bool> {
        match env::var_os(RPN_DEFNS) {
            Some(path) if !path.is_empty() => {
                log::debug!("loading RPN definitions from {}", path.to_string_lossy());
                self.run_file(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;

    const DEFINITIONS: &str = "\
/* constants and helpers
1 sto one
udf
double
2 *

udf
quad
double
double

3 sto three
";

    #[test]
    fn definitions_define_functions_and_memories() {
        let mut ctx = RpnContext::new();
        ctx.run_source(Cursor::new(DEFINITIONS), "test").unwrap();
        assert_eq!(ctx.udfs().len(), 2);
        assert_eq!(ctx.evaluate("three quad one +").unwrap(), 13.0);
    }

    #[test]
    fn at_operator_runs_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defs.rpn");
        std::fs::write(&path, DEFINITIONS).unwrap();
        let mut ctx = RpnContext::new();
        ctx.push_string(path.display().to_string()).unwrap();
        ctx.execute("@").unwrap();
        assert_eq!(ctx.evaluate("5 double").unwrap(), 10.0);
    }

    #[test]
    fn self_inclusion_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.rpn");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "\"{}\" @", path.display()).unwrap();
        drop(file);
        let mut ctx = RpnContext::new();
        assert_eq!(ctx.run_file(&path).unwrap_err().kind(), ErrorKind::StackOverflow);
        assert_eq!(ctx.input_depth, 0);
    }

    #[test]
    fn missing_file() {
        let mut ctx = RpnContext::new();
        assert_eq!(
            ctx.run_file("/nonexistent/defs.rpn").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
