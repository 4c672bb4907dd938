//! Regex subset used by the `$regex` selector operator.
//!
//! The pattern is compiled once into a token list so a query matcher can be
//! built a single time and evaluated against every candidate document.
//!
//! Supported syntax:
//! - `.`: any character
//! - `*`: zero or more (greedy)
//! - `+`: one or more (greedy)
//! - `?`: zero or one
//! - `^` / `$`: anchors
//! - `\d` `\D` `\w` `\W` `\s` `\S`: character classes
//! - `[abc]` `[a-z]` `[^abc]`: bracket classes
//! - `\.` `\\` etc.: literal escapes
//!
//! Matching is unanchored unless `^` and/or `$` are present.

use crate::error::{Error, Result};

/// A single-character matcher.
#[derive(Clone, Debug, PartialEq)]
enum CharClass {
    Any,
    Literal(char),
    Digit(bool),
    Word(bool),
    Space(bool),
    /// Bracket class: (ranges, negated). A single char is a range of one.
    Set(Vec<(char, char)>, bool),
}

impl CharClass {
    fn matches(&self, c: char) -> bool {
        match self {
            CharClass::Any => true,
            CharClass::Literal(l) => *l == c,
            CharClass::Digit(neg) => c.is_ascii_digit() != *neg,
            CharClass::Word(neg) => (c.is_alphanumeric() || c == '_') != *neg,
            CharClass::Space(neg) => c.is_whitespace() != *neg,
            CharClass::Set(ranges, neg) => {
                let hit = ranges.iter().any(|(lo, hi)| c >= *lo && c <= *hi);
                hit != *neg
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Quantifier {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Clone, Debug, PartialEq)]
struct Token {
    class: CharClass,
    quantifier: Quantifier,
}

/// A compiled pattern.
///
/// ```
/// use vela_core::pattern_match::Regex;
/// let re = Regex::new("^[a-z]+\\d+$").unwrap();
/// assert!(re.is_match("abc123"));
/// assert!(!re.is_match("123abc"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Regex {
    source: String,
    tokens: Vec<Token>,
    anchored_start: bool,
    anchored_end: bool,
}

impl Regex {
    /// Compiles a pattern. Unclosed brackets and dangling quantifiers are
    /// reported as `InvalidQueryShape`.
    pub fn new(pattern: &str) -> Result<Self> {
        let anchored_start = pattern.starts_with('^');
        let anchored_end = pattern.ends_with('$') && !pattern.ends_with("\\$");
        let body = if anchored_start { &pattern[1..] } else { pattern };
        let body = if anchored_end && !body.is_empty() {
            &body[..body.len() - 1]
        } else {
            body
        };
        let tokens = compile(body)
            .ok_or_else(|| Error::invalid_query_shape(format!("invalid $regex: {}", pattern)))?;
        Ok(Self {
            source: pattern.to_string(),
            tokens,
            anchored_start,
            anchored_end,
        })
    }

    /// Returns the original pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the pattern matches `value`.
    pub fn is_match(&self, value: &str) -> bool {
        let chars: Vec<char> = value.chars().collect();
        let last_start = if self.anchored_start { 0 } else { chars.len() };
        (0..=last_start).any(|start| {
            match_at(&chars, &self.tokens, start, 0)
                .map(|end| !self.anchored_end || end == chars.len())
                .unwrap_or(false)
        })
    }
}

/// Convenience wrapper: compiles and matches in one call.
pub fn regex(value: &str, pattern: &str) -> bool {
    Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false)
}

fn compile(pattern: &str) -> Option<Vec<Token>> {
    let pat: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut pi = 0;
    while pi < pat.len() {
        let (len, class) = match pat[pi] {
            '.' => (1, CharClass::Any),
            '*' | '+' | '?' => return None,
            '\\' if pi + 1 < pat.len() => {
                let class = match pat[pi + 1] {
                    'd' => CharClass::Digit(false),
                    'D' => CharClass::Digit(true),
                    'w' => CharClass::Word(false),
                    'W' => CharClass::Word(true),
                    's' => CharClass::Space(false),
                    'S' => CharClass::Space(true),
                    other => CharClass::Literal(other),
                };
                (2, class)
            }
            '[' => parse_bracket_class(&pat, pi)?,
            ch => (1, CharClass::Literal(ch)),
        };
        pi += len;
        let quantifier = match pat.get(pi) {
            Some('*') => Quantifier::ZeroOrMore,
            Some('+') => Quantifier::OneOrMore,
            Some('?') => Quantifier::ZeroOrOne,
            _ => Quantifier::One,
        };
        if quantifier != Quantifier::One {
            pi += 1;
        }
        tokens.push(Token { class, quantifier });
    }
    Some(tokens)
}

/// Parses `[abc]`, `[a-z]`, `[^abc]`; returns the token length including `]`.
fn parse_bracket_class(pat: &[char], pi: usize) -> Option<(usize, CharClass)> {
    let negate = pi + 1 < pat.len() && pat[pi + 1] == '^';
    let start = if negate { pi + 2 } else { pi + 1 };
    let end = start + pat[start..].iter().position(|c| *c == ']')?;
    let body = &pat[start..end];
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < body.len() {
        if i + 2 < body.len() && body[i + 1] == '-' {
            ranges.push((body[i], body[i + 2]));
            i += 3;
        } else {
            ranges.push((body[i], body[i]));
            i += 1;
        }
    }
    Some((end - pi + 1, CharClass::Set(ranges, negate)))
}

/// Returns `Some(end_position)` if `tokens[ti..]` matches from `chars[ci]`.
fn match_at(chars: &[char], tokens: &[Token], ci: usize, ti: usize) -> Option<usize> {
    let Some(token) = tokens.get(ti) else {
        return Some(ci);
    };
    let hit = |i: usize| i < chars.len() && token.class.matches(chars[i]);
    match token.quantifier {
        Quantifier::One => {
            if hit(ci) {
                match_at(chars, tokens, ci + 1, ti + 1)
            } else {
                None
            }
        }
        Quantifier::ZeroOrOne => {
            if hit(ci) {
                if let Some(end) = match_at(chars, tokens, ci + 1, ti + 1) {
                    return Some(end);
                }
            }
            match_at(chars, tokens, ci, ti + 1)
        }
        Quantifier::ZeroOrMore | Quantifier::OneOrMore => {
            let min = if token.quantifier == Quantifier::OneOrMore { 1 } else { 0 };
            let mut end = ci;
            while hit(end) {
                end += 1;
            }
            if end - ci < min {
                return None;
            }
            // Greedy: consume as many as possible, then backtrack
            (ci + min..=end)
                .rev()
                .find_map(|try_ci| match_at(chars, tokens, try_ci, ti + 1))
        }
    }
}
