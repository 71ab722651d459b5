//! Splits a message chain into argument tokens.
//!
//! Text runs are split on unescaped whitespace. A `"` opens a verbatim span
//! when it starts the run or follows unescaped whitespace, and the span closes
//! at the first unescaped `"` followed by whitespace or the end of the run. A
//! standalone `--` stops tokenizing: the remainder of the run becomes one
//! verbatim token. Rich elements are passed through as their own tokens.

use std::fmt;

use crate::message::{MessageChain, MessageElement};

/// One argument of a command call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Element(MessageElement),
}

impl Token {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Token::Text(s) => Some(s),
            Token::Element(_) => None,
        }
    }

    pub fn content(&self) -> String {
        match self {
            Token::Text(s) => s.clone(),
            Token::Element(e) => e.content(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Text(s.to_string())
    }
}

/// Tokenize a whole chain.
///
/// Once a text run hits the stop marker, every later text run is kept
/// verbatim as a single token.
pub fn tokenize(chain: &MessageChain) -> Vec<Token> {
    let mut out = Vec::new();
    let mut stopped = false;
    for element in chain {
        match element {
            MessageElement::Text(text) if stopped => {
                if !text.trim().is_empty() {
                    out.push(Token::Text(text.clone()));
                }
            }
            MessageElement::Text(text) => {
                stopped = tokenize_text(text, &mut out);
            }
            other => out.push(Token::Element(other.clone())),
        }
    }
    out
}

/// Tokenize a plain string. Convenience over [`tokenize`].
pub fn tokenize_str(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    tokenize_text(text, &mut out);
    out.into_iter().map(|t| t.content()).collect()
}

/// Returns true if the stop marker was found.
fn tokenize_text(text: &str, out: &mut Vec<Token>) -> bool {
    let chars: Vec<char> = text.chars().collect();
    match find_stop(&chars) {
        Some((start, end)) => {
            let head: String = chars[..start].iter().collect();
            let tail: String = chars[end..].iter().collect();
            if !head.trim().is_empty() {
                push_words(&head, out);
            }
            if !tail.trim().is_empty() {
                out.push(Token::Text(tail));
            }
            true
        }
        None => {
            push_words(text, out);
            false
        }
    }
}

fn push_words(text: &str, out: &mut Vec<Token>) {
    for word in split_quoted(text) {
        out.push(Token::Text(word));
    }
}

// ============================================================================
// Scanning
// ============================================================================

fn is_ws(c: char) -> bool {
    c.is_whitespace()
}

/// A character is escaped by an odd run of backslashes right before it.
fn unescaped(chars: &[char], i: usize) -> bool {
    let run = chars[..i].iter().rev().take_while(|&&c| c == '\\').count();
    run % 2 == 0
}

/// Locate the stop marker: `--` at the start of the run, or after unescaped
/// whitespace, followed by whitespace. Returns the range to cut, including
/// the surrounding whitespace.
fn find_stop(chars: &[char]) -> Option<(usize, usize)> {
    let skip_ws = |mut k: usize| {
        while k < chars.len() && is_ws(chars[k]) {
            k += 1;
        }
        k
    };
    let dashes_at = |k: usize| {
        k + 2 < chars.len() && chars[k] == '-' && chars[k + 1] == '-' && is_ws(chars[k + 2])
    };

    for i in 0..chars.len() {
        if i == 0 && dashes_at(0) {
            return Some((0, skip_ws(2)));
        }
        if is_ws(chars[i]) && unescaped(chars, i) {
            let j = skip_ws(i);
            if dashes_at(j) {
                return Some((i, skip_ws(j + 2)));
            }
        }
    }
    None
}

/// First opening quote, as the `(start, end)` of the delimiter.
fn find_quote_begin(chars: &[char]) -> Option<(usize, usize)> {
    for i in 0..chars.len() {
        if i == 0 && chars[0] == '"' {
            return Some((0, 1));
        }
        if is_ws(chars[i]) && unescaped(chars, i) && chars.get(i + 1) == Some(&'"') {
            return Some((i, i + 2));
        }
    }
    None
}

/// First closing quote, as the `(start, end)` of the delimiter.
fn find_quote_end(chars: &[char]) -> Option<(usize, usize)> {
    for i in 0..chars.len() {
        if chars[i] != '"' || !unescaped(chars, i) {
            continue;
        }
        if i + 1 == chars.len() {
            return Some((i, i + 1));
        }
        if is_ws(chars[i + 1]) {
            return Some((i, i + 2));
        }
    }
    None
}

fn split_quoted(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if let Some((b_start, b_end)) = find_quote_begin(&chars) {
        let after = &chars[b_end..];
        if let Some((e_start, e_end)) = find_quote_end(after) {
            let before: String = chars[..b_start].iter().collect();
            let quoted: String = after[..e_start].iter().collect();
            let rest: String = after[e_end..].iter().collect();
            let mut out = split_quoted(&before);
            out.push(quoted);
            out.extend(split_quoted(&rest));
            return out;
        }
    }
    split_words(&chars)
}

/// Split on unescaped whitespace, drop blank words, then resolve escapes.
fn split_words(chars: &[char]) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = Vec::new();
    for (i, &c) in chars.iter().enumerate() {
        if is_ws(c) && unescaped(chars, i) {
            words.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    words.push(current);

    words
        .into_iter()
        .filter(|w| !w.iter().all(|c| is_ws(*c)))
        .map(|w| unescape(&w))
        .collect()
}

/// `\x` becomes `x`. A trailing lone backslash is kept.
fn unescape(word: &[char]) -> String {
    let mut out = String::with_capacity(word.len());
    let mut i = 0;
    while i < word.len() {
        if word[i] == '\\' && i + 1 < word.len() && word[i + 1] != '\n' {
            out.push(word[i + 1]);
            i += 2;
        } else {
            out.push(word[i]);
            i += 1;
        }
    }
    out
}
