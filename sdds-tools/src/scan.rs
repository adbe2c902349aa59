//! The scanned-argument convention shared by every utility.
//!
//! An argument starting with `-` is an option: `-keyword=item1,item2`. Items are split at commas
//! that are neither escaped with `\` nor inside double quotes. Anything else is a positional
//! argument, usually a file name.

use std::fmt;

use sdds_error::{SddsResult, sdds_bail, sdds_err};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedArg {
    Option { keyword: String, items: Vec<String> },
    Positional(String),
}

impl fmt::Display for ScannedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannedArg::Option { keyword, items } if items.is_empty() => write!(f, "-{keyword}"),
            ScannedArg::Option { keyword, items } => write!(f, "-{}={}", keyword, items.join(",")),
            ScannedArg::Positional(word) => f.write_str(word),
        }
    }
}

fn split_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            '"' => quoted = !quoted,
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    items.push(current);
    items
}

/// Classify command-line words. A lone `-` is positional.
pub fn scan_args<S: AsRef<str>>(args: &[S]) -> Vec<ScannedArg> {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            match arg.strip_prefix('-') {
                Some(rest) if !rest.is_empty() => match rest.split_once('=') {
                    Some((keyword, items)) => ScannedArg::Option {
                        keyword: keyword.to_string(),
                        items: split_items(items),
                    },
                    None => ScannedArg::Option {
                        keyword: rest.to_string(),
                        items: Vec::new(),
                    },
                },
                _ => ScannedArg::Positional(arg.to_string()),
            }
        })
        .collect()
}

/// Resolve `word` against `options` by case-insensitive prefix.
///
/// An exact match wins; otherwise the prefix must select exactly one option.
pub fn match_option(word: &str, options: &[&str]) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    let word = word.to_ascii_lowercase();
    let mut found = None;
    for (i, option) in options.iter().enumerate() {
        let option = option.to_ascii_lowercase();
        if option == word {
            return Some(i);
        }
        if option.starts_with(&word) {
            if found.is_some() {
                return None;
            }
            found = Some(i);
        }
    }
    found
}

/// Like [`match_option`], failing with a message naming what was being resolved.
pub fn require_option(word: &str, options: &[&str], what: &str) -> SddsResult<usize> {
    match_option(word, options).ok_or_else(|| {
        sdds_err!(
            "unknown or ambiguous {} \"{}\" (expected one of {})",
            what,
            word,
            options.join(", ")
        )
    })
}

/// Split `key=value`; a bare word has no value.
pub fn key_value(item: &str) -> (&str, Option<&str>) {
    match item.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (item, None),
    }
}

/// Parse the single item of an option such as `-fromPage=3`.
pub fn single_item<T: std::str::FromStr>(keyword: &str, items: &[String]) -> SddsResult<T> {
    match items {
        [item] => item
            .parse()
            .map_err(|_| sdds_err!("invalid value \"{}\" for -{}", item, keyword)),
        _ => sdds_bail!("-{} takes exactly one value", keyword),
    }
}

/// Standard streams requested with `-pipe[=input][,output]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeFlags {
    pub input: bool,
    pub output: bool,
}

impl PipeFlags {
    /// Parse the items of `-pipe`. No items means both directions.
    pub fn from_items(items: &[String]) -> SddsResult<Self> {
        if items.is_empty() {
            return Ok(Self {
                input: true,
                output: true,
            });
        }
        let mut flags = Self::default();
        for item in items {
            match require_option(item, &["input", "output"], "pipe direction")? {
                0 => flags.input = true,
                _ => flags.output = true,
            }
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn options_and_positionals() {
        let scanned = scan_args(&["in.sdds", "-column=x,decreasing", "-unique", "-", "out"]);
        assert_eq!(
            scanned,
            vec![
                ScannedArg::Positional("in.sdds".to_string()),
                ScannedArg::Option {
                    keyword: "column".to_string(),
                    items: vec!["x".to_string(), "decreasing".to_string()],
                },
                ScannedArg::Option {
                    keyword: "unique".to_string(),
                    items: vec![],
                },
                ScannedArg::Positional("-".to_string()),
                ScannedArg::Positional("out".to_string()),
            ]
        );
        assert_eq!(scanned[1].to_string(), "-column=x,decreasing");
    }

    #[rstest]
    #[case("a,b", &["a", "b"])]
    #[case("\"x,y\",z", &["x,y", "z"])]
    #[case("a\\,b", &["a,b"])]
    #[case("a,,b", &["a", "", "b"])]
    #[case("k=v=w", &["k=v=w"])]
    fn items(#[case] text: &str, #[case] expected: &[&str]) {
        assert_eq!(split_items(text), expected);
    }

    #[rstest]
    #[case("dec", Some(1))]
    #[case("INC", Some(0))]
    #[case("in", None)]
    #[case("increasingly", None)]
    #[case("", None)]
    #[case("input", Some(2))]
    fn prefixes(#[case] word: &str, #[case] expected: Option<usize>) {
        assert_eq!(
            match_option(word, &["increasing", "decreasing", "input"]),
            expected
        );
    }

    #[test]
    fn exact_match_beats_prefix() {
        assert_eq!(match_option("row", &["rows", "row"]), Some(1));
    }

    #[rstest]
    #[case(&[], true, true)]
    #[case(&["in"], true, false)]
    #[case(&["out"], false, true)]
    #[case(&["o", "i"], true, true)]
    fn pipes(#[case] items: &[&str], #[case] input: bool, #[case] output: bool) {
        let items = items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            PipeFlags::from_items(&items).unwrap(),
            PipeFlags { input, output }
        );
    }

    #[test]
    fn bad_pipe() {
        assert!(PipeFlags::from_items(&["sideways".to_string()]).is_err());
    }
}
