//! Raw record reader: decoding, dialect detection, and row tokenization.
//!
//! Turns a byte stream into a lazy sequence of [`RawRow`]s. No conflict-event
//! semantics here; this layer only knows bytes, encodings, delimiters, and
//! quotes.
//!
//! Structurally broken lines (unterminated quotes, stray quotes inside a
//! field) are reported as [`RowEvent::Malformed`] and reading continues with
//! the next line. A byte sequence that fails to decode under the configured
//! encoding is a fatal [`ReadError`], reported once for the whole stream.
//!
//! Encoding and delimiter detection are explicit helper functions. They run
//! once, before parsing begins, on the caller's initiative; the reader itself
//! only ever receives an explicit configuration and never switches dialect
//! mid-stream.

use serde::{Deserialize, Serialize};

use crate::error::{ReadError, ReadResult};

// =============================================================================
// Encoding
// =============================================================================

/// Supported text encodings for the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// UTF-8 (strict, no lossy fallback).
    #[default]
    Utf8,
    /// ISO-8859-1 / Latin-1.
    Latin1,
}

impl TextEncoding {
    /// Canonical charset label.
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "iso-8859-1",
        }
    }

    /// Parse a charset label. Accepts the common aliases.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "utf-8" | "utf8" | "ascii" => Some(TextEncoding::Utf8),
            "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
                Some(TextEncoding::Latin1)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the encoding of raw bytes using chardet.
///
/// Explicit pre-step only: the result is a suggestion the caller may feed
/// into the load configuration. Charsets outside the supported pair map to
/// their closest supported equivalent, defaulting to UTF-8.
pub fn detect_encoding(bytes: &[u8]) -> TextEncoding {
    let charset = chardet::detect(bytes).0;
    TextEncoding::from_label(&charset).unwrap_or(TextEncoding::Utf8)
}

/// Decode bytes to a string under the given encoding, strictly.
///
/// Unlike a lossy decode, any undecodable byte sequence aborts with a single
/// [`ReadError::Decode`] naming the encoding and the approximate offset.
pub fn decode(bytes: &[u8], encoding: TextEncoding) -> ReadResult<String> {
    match encoding {
        TextEncoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(e) => Err(ReadError::Decode {
                encoding: encoding.as_str(),
                offset: e.valid_up_to(),
            }),
        },
        TextEncoding::Latin1 => encoding_rs::WINDOWS_1252
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|cow| cow.into_owned())
            .ok_or(ReadError::Decode {
                encoding: encoding.as_str(),
                offset: 0,
            }),
    }
}

// =============================================================================
// Delimiter
// =============================================================================

/// Supported field delimiters.
///
/// Two dialects are recognized: comma-separated with `.` decimals, and
/// semicolon-separated with `,` decimals. The decimal convention lives in
/// the coercer configuration; this type only names the field separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Semicolon => ';',
        }
    }
}

impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Detect the delimiter from the first non-empty line of the content.
///
/// Deterministic: counts occurrences of each supported delimiter and picks
/// the winner, comma on a tie. Explicit pre-step only; never consulted
/// mid-stream.
pub fn detect_delimiter(content: &str) -> Delimiter {
    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();

    if semicolons > commas {
        Delimiter::Semicolon
    } else {
        Delimiter::Comma
    }
}

// =============================================================================
// Row Reading
// =============================================================================

/// One tokenized source row: its 1-based line number and raw field values.
///
/// Ephemeral; produced by the reader, consumed by the schema normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line number in the source stream.
    pub line: u64,
    /// Field values, unquoted but otherwise untouched.
    pub fields: Vec<String>,
    /// The original line text, kept for diagnostics.
    pub raw: String,
}

/// One event from the row reader.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent {
    /// A successfully tokenized row.
    Row(RawRow),
    /// A line the tokenizer could not parse. Skipped, not fatal.
    Malformed {
        line: u64,
        raw: String,
        message: String,
    },
}

/// Lazy row reader over decoded content.
///
/// Finite and not restartable: once consumed, a fresh read requires a fresh
/// call to [`read_rows`]. Blank lines are skipped without an event.
pub struct RowReader<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    delimiter: char,
}

/// Tokenize decoded content into a lazy sequence of [`RowEvent`]s.
pub fn read_rows(content: &str, delimiter: Delimiter) -> RowReader<'_> {
    RowReader {
        lines: content.lines().enumerate(),
        delimiter: delimiter.as_char(),
    }
}

impl Iterator for RowReader<'_> {
    type Item = RowEvent;

    fn next(&mut self) -> Option<Self::Item> {
        for (idx, line) in self.lines.by_ref() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx as u64 + 1;
            return Some(match split_line(line, self.delimiter) {
                Ok(fields) => RowEvent::Row(RawRow {
                    line: line_no,
                    fields,
                    raw: line.to_string(),
                }),
                Err(message) => RowEvent::Malformed {
                    line: line_no,
                    raw: line.to_string(),
                    message,
                },
            });
        }
        None
    }
}

/// Split one line into fields, honoring double-quote escaping.
///
/// Quoting rules: a field may be wrapped in double quotes; inside a quoted
/// field, `""` is a literal quote and the delimiter is data. A quote opening
/// mid-field or left unterminated at end of line makes the whole line
/// malformed.
fn split_line(line: &str, delimiter: char) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            if field_started {
                return Err(format!(
                    "unescaped quote inside field {}",
                    fields.len() + 1
                ));
            }
            in_quotes = true;
            field_started = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
            field_started = false;
        } else {
            current.push(c);
            field_started = true;
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }

    fields.push(current);
    Ok(fields)
}
