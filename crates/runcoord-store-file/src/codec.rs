// crates/runcoord-store-file/src/codec.rs
// ============================================================================
// Module: Properties Codec
// Description: Line-oriented key=value encoding for store files.
// Purpose: Serialize complete snapshots canonically and parse them strictly.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The file format is a strict subset of Java-style properties: one
//! `key=value` entry per line, keys in lexical order, `#`/`!` comment lines
//! and blank lines ignored. Backslash escapes cover the separators,
//! whitespace, comment markers, and control characters (`\uXXXX`). Anything
//! the encoder would never write (a dangling backslash, an unknown escape,
//! a line without separator, a duplicate key) fails the parse rather than
//! being guessed at, so a damaged file is never silently rewritten.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Properties decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Content is not valid UTF-8.
    #[error("store file is not valid utf-8")]
    Utf8,
    /// A line could not be parsed.
    #[error("line {line}: {message}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes entries as canonical properties text.
#[must_use]
pub fn encode(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        escape_into(&mut out, key, true);
        out.push('=');
        escape_into(&mut out, value, false);
        out.push('\n');
    }
    out
}

/// Appends an escaped key or value.
fn escape_into(out: &mut String, text: &str, is_key: bool) {
    for (index, ch) in text.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(ch);
            }
            '#' | '!' if index == 0 => {
                out.push('\\');
                out.push(ch);
            }
            ' ' if is_key || index == 0 => out.push_str("\\ "),
            other if other.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(other));
            }
            other => out.push(other),
        }
    }
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Decodes properties text into an entry map.
///
/// # Errors
///
/// Returns [`CodecError`] when the content is not UTF-8 or any line is
/// malformed.
pub fn decode(bytes: &[u8]) -> Result<BTreeMap<String, String>, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::Utf8)?;
    let mut entries = BTreeMap::new();
    for (index, raw_line) in text.split('\n').enumerate() {
        let line_number = index + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line).trim_start_matches([' ', '\t']);
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (raw_key, raw_value) = split_entry(line).ok_or_else(|| CodecError::Malformed {
            line: line_number,
            message: "missing '=' separator".to_string(),
        })?;
        let key = unescape(raw_key, line_number)?;
        if key.is_empty() {
            return Err(CodecError::Malformed {
                line: line_number,
                message: "empty key".to_string(),
            });
        }
        let value = unescape(raw_value.trim_start_matches([' ', '\t']), line_number)?;
        if entries.insert(key, value).is_some() {
            return Err(CodecError::Malformed {
                line: line_number,
                message: "duplicate key".to_string(),
            });
        }
    }
    Ok(entries)
}

/// Splits a line at the first unescaped `=` or `:`.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (offset, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return Some((&line[..offset], &line[offset + 1..])),
            _ => {}
        }
    }
    None
}

/// Resolves backslash escapes.
fn unescape(raw: &str, line: usize) -> Result<String, CodecError> {
    let malformed = |message: &str| CodecError::Malformed {
        line,
        message: message.to_string(),
    };
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            None => return Err(malformed("dangling backslash")),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(literal @ ('\\' | '=' | ':' | '#' | '!' | ' ')) => out.push(literal),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return Err(malformed("truncated \\u escape"));
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| malformed("invalid \\u escape digits"))?;
                let decoded =
                    char::from_u32(code).ok_or_else(|| malformed("\\u escape is not a char"))?;
                out.push(decoded);
            }
            Some(_) => return Err(malformed("unknown escape sequence")),
        }
    }
    Ok(out)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
