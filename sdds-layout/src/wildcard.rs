use regex::{Regex, RegexBuilder};
use sdds_error::{SddsResult, sdds_err};

/// Options for [`WildcardPattern`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Ignore ASCII case when matching.
    pub case_insensitive: bool,
}

/// A shell-style pattern supporting `*`, `?` and `[...]` character classes.
///
/// A backslash makes the next character literal.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Regex,
}

impl WildcardPattern {
    /// Compile a pattern.
    pub fn new(pattern: &str, options: MatchOptions) -> SddsResult<Self> {
        let mut re = String::with_capacity(pattern.len() * 2 + 2);
        re.push('^');
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                '\\' => match chars.next() {
                    Some(lit) => re.push_str(&regex::escape(&lit.to_string())),
                    None => re.push_str(r"\\"),
                },
                '[' => {
                    let mut class = String::from("[");
                    if matches!(chars.peek(), Some('!') | Some('^')) {
                        chars.next();
                        class.push('^');
                    }
                    let mut closed = false;
                    let mut first = true;
                    while let Some(cc) = chars.next() {
                        if cc == ']' && !first {
                            closed = true;
                            break;
                        }
                        first = false;
                        match cc {
                            '\\' | '[' | ']' | '&' | '~' => {
                                class.push('\\');
                                class.push(cc);
                            }
                            _ => class.push(cc),
                        }
                    }
                    if !closed {
                        return Err(sdds_err!("unterminated character class in \"{}\"", pattern));
                    }
                    class.push(']');
                    re.push_str(&class);
                }
                other => re.push_str(&regex::escape(&other.to_string())),
            }
        }
        re.push('$');
        let regex = RegexBuilder::new(&re)
            .case_insensitive(options.case_insensitive)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| sdds_err!("invalid pattern \"{}\": {}", pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if `name` matches the whole pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// True if `s` contains any wildcard metacharacters.
pub fn has_wildcards(s: &str) -> bool {
    s.contains(['*', '?', '['])
}
