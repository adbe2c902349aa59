//! Conversion between infix arithmetic and RPN.
//!
//! Infix supports `+ - * /`, `^` for `pow`, unary minus as `chs`, parentheses, names, and
//! function calls written `name(arg, ...)`.

use itertools::Itertools;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_scalar::text::{Tokenizer, parse_f64};

use crate::builtins::{FunctionKind, builtins, find_builtin};
use crate::compile::looks_numeric;

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(String),
    Name(String),
    Symbol(char),
}

fn lex(text: &str) -> SddsResult<Vec<Lexeme>> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j], '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            out.push(Lexeme::Number(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Lexeme::Name(chars[start..i].iter().collect()));
        } else if "+-*/^(),".contains(c) {
            out.push(Lexeme::Symbol(c));
            i += 1;
        } else {
            sdds_bail!(UnknownToken: "unexpected '{}' in \"{}\"", c, text);
        }
    }
    Ok(out)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    at: usize,
    out: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.at)
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Lexeme::Symbol(symbol)) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: char) -> SddsResult<()> {
        if !self.eat(symbol) {
            sdds_bail!(UnknownToken: "expected '{}'", symbol);
        }
        Ok(())
    }

    fn expression(&mut self) -> SddsResult<()> {
        self.term()?;
        loop {
            let op = if self.eat('+') {
                "+"
            } else if self.eat('-') {
                "-"
            } else {
                return Ok(());
            };
            self.term()?;
            self.out.push(op.to_string());
        }
    }

    fn term(&mut self) -> SddsResult<()> {
        self.unary()?;
        loop {
            let op = if self.eat('*') {
                "*"
            } else if self.eat('/') {
                "/"
            } else {
                return Ok(());
            };
            self.unary()?;
            self.out.push(op.to_string());
        }
    }

    fn unary(&mut self) -> SddsResult<()> {
        if self.eat('-') {
            self.unary()?;
            self.out.push("chs".to_string());
            Ok(())
        } else if self.eat('+') {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> SddsResult<()> {
        self.primary()?;
        if self.eat('^') {
            self.unary()?;
            self.out.push("pow".to_string());
        }
        Ok(())
    }

    fn primary(&mut self) -> SddsResult<()> {
        let lexeme = self
            .peek()
            .cloned()
            .ok_or_else(|| sdds_err!(UnexpectedEof: "expression ends early"))?;
        self.at += 1;
        match lexeme {
            Lexeme::Number(n) => self.out.push(n),
            Lexeme::Name(name) => {
                if self.eat('(') {
                    if !self.eat(')') {
                        self.expression()?;
                        while self.eat(',') {
                            self.expression()?;
                        }
                        self.expect(')')?;
                    }
                }
                self.out.push(name);
            }
            Lexeme::Symbol('(') => {
                self.expression()?;
                self.expect(')')?;
            }
            Lexeme::Symbol(c) => sdds_bail!(UnknownToken: "unexpected '{}'", c),
        }
        Ok(())
    }
}

/// Convert an infix expression to RPN text.
pub fn infix_to_postfix(infix: &str) -> SddsResult<String> {
    let mut parser = Parser {
        lexemes: lex(infix)?,
        at: 0,
        out: Vec::new(),
    };
    parser.expression()?;
    if let Some(extra) = parser.peek() {
        sdds_bail!(UnknownToken: "unexpected {:?} after expression", extra);
    }
    Ok(parser.out.join(" "))
}

const ADD: u8 = 1;
const MUL: u8 = 2;
const UNARY: u8 = 3;
const POW: u8 = 4;
const ATOM: u8 = 5;

fn wrap((text, _): (String, u8), parens: bool) -> String {
    if parens { format!("({text})") } else { text }
}

/// Convert RPN text to an equivalent fully determined infix expression.
///
/// Only numeric operations can be converted; names that are not built-ins are treated as
/// values.
pub fn postfix_to_infix(postfix: &str) -> SddsResult<String> {
    let mut stack: Vec<(String, u8)> = Vec::new();
    let pop = |stack: &mut Vec<(String, u8)>, op: &str| {
        stack
            .pop()
            .ok_or_else(|| sdds_err!(StackUnderflow: "{} lacks operands", op))
    };
    let mut tokens = Tokenizer::new(postfix);
    while let Some(token) = tokens.next_raw() {
        if token.starts_with('"') {
            sdds_bail!("strings have no infix form");
        }
        if let Some(x) = parse_f64(token).filter(|_| looks_numeric(token)) {
            if !x.is_finite() {
                sdds_bail!(ValueOutOfRange: "{} has no infix literal", token);
            }
            let text = format!("{:?}", x.abs());
            stack.push(if x.is_sign_negative() {
                (format!("-{text}"), UNARY)
            } else {
                (text, ATOM)
            });
            continue;
        }
        match token {
            "+" | "-" | "*" | "/" => {
                let prec = if matches!(token, "+" | "-") { ADD } else { MUL };
                let right = pop(&mut stack, token)?;
                let left = pop(&mut stack, token)?;
                let (lp, rp) = (left.1 < prec, right.1 <= prec);
                stack.push((format!("{} {} {}", wrap(left, lp), token, wrap(right, rp)), prec));
            }
            "pow" => {
                let right = pop(&mut stack, token)?;
                let left = pop(&mut stack, token)?;
                let (lp, rp) = (left.1 <= POW, right.1 < POW);
                stack.push((format!("{}^{}", wrap(left, lp), wrap(right, rp)), POW));
            }
            "chs" => {
                let operand = pop(&mut stack, token)?;
                let parens = operand.1 < UNARY;
                stack.push((format!("-{}", wrap(operand, parens)), UNARY));
            }
            name => match find_builtin(name).map(|i| &builtins()[i]) {
                Some(b) if b.kind == FunctionKind::Numeric && b.arity > 0 => {
                    if stack.len() < b.arity {
                        sdds_bail!(StackUnderflow: "{} lacks operands", name);
                    }
                    let args = stack.split_off(stack.len() - b.arity);
                    let args = args.into_iter().map(|(text, _)| text).join(", ");
                    stack.push((format!("{name}({args})"), ATOM));
                }
                Some(b) if b.kind == FunctionKind::Numeric => stack.push((name.to_string(), ATOM)),
                Some(_) => sdds_bail!("{} has no infix form", name),
                None => stack.push((name.to_string(), ATOM)),
            },
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some((text, _)), true) => Ok(text),
        (None, _) => sdds_bail!(EmptyInput: "empty expression"),
        (Some(_), false) => sdds_bail!("expression leaves {} values", stack.len() + 1),
    }
}
