//! Compact `key: value` argument grammar.
//!
//! Users type job parameters as free text, for example
//! `prompts: a cat in a hat steps: 40 seed: 7`. The recognized keys are
//! `prompts`, `negative`, `resize`, `seed`, `scale`, `module`, `steps` and
//! `denoise`, matched case-insensitively and in any order.
//!
//! A value runs until the next recognized `key:` begins, so prompts may
//! contain commas, colons and any word that is not immediately followed by
//! a colon. Values never span a newline. The whole input has to be covered
//! by segments; anything left over is an error rather than being dropped.

use std::collections::HashMap;
use std::ops::Range;
use std::str::FromStr;

use thiserror::Error;

use crate::args::ProcessArguments;

/// A key of the argument grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKey {
    Prompts,
    Negative,
    Resize,
    Seed,
    Scale,
    Module,
    Steps,
    Denoise,
}

impl ArgKey {
    pub const ALL: [ArgKey; 8] = [
        ArgKey::Prompts,
        ArgKey::Negative,
        ArgKey::Resize,
        ArgKey::Seed,
        ArgKey::Scale,
        ArgKey::Module,
        ArgKey::Steps,
        ArgKey::Denoise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArgKey::Prompts => "prompts",
            ArgKey::Negative => "negative",
            ArgKey::Resize => "resize",
            ArgKey::Seed => "seed",
            ArgKey::Scale => "scale",
            ArgKey::Module => "module",
            ArgKey::Steps => "steps",
            ArgKey::Denoise => "denoise",
        }
    }
}

/// One `key: value` segment found by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<'a> {
    pub key: ArgKey,
    /// The value with surrounding whitespace trimmed.
    pub value: &'a str,
    /// Byte range of the whole segment, including leading whitespace.
    pub span: Range<usize>,
}

/// Errors produced while reading argument text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Part of the input is not a `key: value` segment.
    #[error("Not all input was parsed: unexpected {remainder:?} at offset {offset}")]
    UnconsumedInput { offset: usize, remainder: String },

    /// A numeric key was given a value that is not a number.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Split `text` into segments, requiring that they cover all of it.
///
/// Leftover spaces or tabs are allowed, so a blank line yields no
/// segments. Any other leftover text, a line break included, is
/// [`ParseError::UnconsumedInput`].
pub fn tokenize(text: &str) -> Result<Vec<Segment<'_>>, ParseError> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        match segment_at(text, pos) {
            Some(segment) => {
                pos = segment.span.end;
                segments.push(segment);
            }
            None => break,
        }
    }

    let remainder = &text[pos..];
    if remainder.contains(|c: char| c == '\n' || c == '\r') || !remainder.trim().is_empty() {
        return Err(ParseError::UnconsumedInput {
            offset: pos,
            remainder: remainder.to_string(),
        });
    }
    Ok(segments)
}

/// Parse argument text into a fresh [`ProcessArguments`].
///
/// # Example
/// ```
/// let args = sd_task_client::grammar::parse("prompts: cat steps: 40 seed: 7").unwrap();
/// assert_eq!(args.prompts, "cat");
/// assert_eq!(args.steps, 40);
/// assert_eq!(args.seed, Some(7));
/// assert_eq!(args.scale, 12.0);
/// ```
pub fn parse(text: &str) -> Result<ProcessArguments, ParseError> {
    let mut args = ProcessArguments::default();
    args.apply_common_args(text)?;
    Ok(args)
}

impl FromStr for ProcessArguments {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl ProcessArguments {
    /// Overwrite the grammar-controlled fields from argument text.
    ///
    /// Keys missing from `text` are reset to their defaults (`seed` and
    /// `module` become absent). `width`, `height`, `count`, `images` and
    /// `comment` are left alone. Nothing is modified when parsing fails.
    pub fn apply_common_args(&mut self, text: &str) -> Result<(), ParseError> {
        let raw = collect(text)?;

        let prompts = raw.get(&ArgKey::Prompts).copied().unwrap_or("").to_string();
        let negative = raw.get(&ArgKey::Negative).copied().unwrap_or("").to_string();
        let steps = parse_int(&raw, ArgKey::Steps)?.unwrap_or(30);
        let scale = parse_float(&raw, ArgKey::Scale)?.unwrap_or(12.0);
        let denoise = parse_float(&raw, ArgKey::Denoise)?.unwrap_or(0.7);
        let resize_mode = parse_int(&raw, ArgKey::Resize)?.unwrap_or(2);
        let seed = parse_int(&raw, ArgKey::Seed)?;
        let module = raw.get(&ArgKey::Module).map(|m| m.to_string());

        self.prompts = prompts;
        self.negative_prompts = negative;
        self.steps = steps;
        self.scale = scale;
        self.denoise = denoise;
        self.resize_mode = resize_mode;
        self.seed = seed;
        self.module = module;
        self.limit_args_range();
        Ok(())
    }

    /// Render `steps`, `seed` and `module` as argument text.
    ///
    /// Used to prefill an edit box for a follow-up job; feed the edited
    /// text back through [`ProcessArguments::apply_additional_arguments`].
    pub fn additional_arguments(&self) -> String {
        let mut parts = vec![format!("steps: {}", self.steps)];
        if let Some(seed) = self.seed {
            parts.push(format!("seed: {}", seed));
        }
        if let Some(module) = &self.module {
            parts.push(format!("module: {}", module));
        }
        parts.join(" ")
    }

    /// Parse argument text and copy back only `steps`, `seed` and `module`.
    pub fn apply_additional_arguments(&mut self, text: &str) -> Result<(), ParseError> {
        let parsed = parse(text)?;
        self.steps = parsed.steps;
        self.seed = parsed.seed;
        self.module = parsed.module;
        Ok(())
    }
}

/// Segments as a key → value map; a repeated key keeps its last value.
fn collect(text: &str) -> Result<HashMap<ArgKey, &str>, ParseError> {
    Ok(tokenize(text)?
        .into_iter()
        .map(|segment| (segment.key, segment.value))
        .collect())
}

fn parse_int(raw: &HashMap<ArgKey, &str>, key: ArgKey) -> Result<Option<i64>, ParseError> {
    raw.get(&key)
        .map(|value| {
            value.parse::<i64>().map_err(|_| ParseError::InvalidValue {
                key: key.as_str(),
                value: value.to_string(),
            })
        })
        .transpose()
}

fn parse_float(raw: &HashMap<ArgKey, &str>, key: ArgKey) -> Result<Option<f64>, ParseError> {
    raw.get(&key)
        .map(|value| {
            value.parse::<f64>().map_err(|_| ParseError::InvalidValue {
                key: key.as_str(),
                value: value.to_string(),
            })
        })
        .transpose()
}

/// Match `key <ws> :` at byte offset `pos`.
///
/// Returns the key and the offset just past the colon.
fn key_colon_at(src: &str, pos: usize) -> Option<(ArgKey, usize)> {
    let rest = src[pos..].as_bytes();
    for key in ArgKey::ALL {
        let name = key.as_str().as_bytes();
        if rest.len() < name.len() || !rest[..name.len()].eq_ignore_ascii_case(name) {
            continue;
        }
        let after = &src[pos + name.len()..];
        let trimmed = after.trim_start();
        if trimmed.starts_with(':') {
            let colon = pos + name.len() + (after.len() - trimmed.len());
            return Some((key, colon + 1));
        }
    }
    None
}

/// End offset of a value starting at `start`.
///
/// A character belongs to the value unless it is a newline or a `key:`
/// begins right after it.
fn value_end(src: &str, start: usize) -> usize {
    let mut end = start;
    for (i, c) in src[start..].char_indices() {
        if c == '\n' {
            break;
        }
        let next = start + i + c.len_utf8();
        if key_colon_at(src, next).is_some() {
            break;
        }
        end = next;
    }
    end
}

/// Match one segment starting at `pos`, including leading whitespace.
fn segment_at(src: &str, pos: usize) -> Option<Segment<'_>> {
    let rest = &src[pos..];
    let key_pos = pos + (rest.len() - rest.trim_start().len());
    let (key, after_colon) = key_colon_at(src, key_pos)?;

    // Whitespace after the colon is skipped greedily, but handed back one
    // character at a time if the value would otherwise be empty.
    let tail = &src[after_colon..];
    let mut start = after_colon + (tail.len() - tail.trim_start().len());
    loop {
        let end = value_end(src, start);
        if end > start {
            return Some(Segment {
                key,
                value: src[start..end].trim(),
                span: pos..end,
            });
        }
        if start == after_colon {
            return None;
        }
        start = src[after_colon..start]
            .char_indices()
            .next_back()
            .map(|(i, _)| after_colon + i)?;
    }
}
