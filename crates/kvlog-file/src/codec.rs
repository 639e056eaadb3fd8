//! Line format for the file backend
//!
//! One event per line: `<sequence>\t<kind>\t<key>\t<value>\n`, with kind
//! codes from [`EventKind::code`]. Backslash, tab, newline and carriage
//! return inside keys and values are escaped (`\\`, `\t`, `\n`, `\r`), so
//! plain strings are stored verbatim and arbitrary strings still fit on one
//! line.

use kvlog_core::error::{LogError, Result};
use kvlog_core::types::{Event, EventKind, Mutation, Sequence};
use std::fmt::Write;

pub const FIELD_SEPARATOR: char = '\t';
pub const RECORD_TERMINATOR: char = '\n';

/// Append the encoded line for `mutation` stored under `sequence`
pub fn encode_into(out: &mut String, sequence: Sequence, mutation: &Mutation) {
    // Writing into a String cannot fail
    let _ = write!(out, "{}\t{}\t", sequence, mutation.kind.code());
    escape_into(out, &mutation.key);
    out.push(FIELD_SEPARATOR);
    escape_into(out, &mutation.value);
    out.push(RECORD_TERMINATOR);
}

pub fn encode(sequence: Sequence, mutation: &Mutation) -> String {
    let mut out = String::with_capacity(24 + mutation.key.len() + mutation.value.len());
    encode_into(&mut out, sequence, mutation);
    out
}

/// Decode one line, without its terminator
///
/// `line_no` is 1-based and only used for error reporting.
pub fn decode(line: &str, line_no: u64) -> Result<Event> {
    let corrupt = |reason: String| LogError::Corrupt {
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    let [sequence, kind, key, value] = fields.as_slice() else {
        return Err(corrupt(format!("expected 4 fields, found {}", fields.len())));
    };

    let sequence: Sequence = sequence
        .parse()
        .map_err(|_| corrupt(format!("invalid sequence {:?}", sequence)))?;
    let kind = kind
        .parse::<u8>()
        .ok()
        .and_then(EventKind::from_code)
        .ok_or_else(|| corrupt(format!("unknown event kind {:?}", kind)))?;
    let key = unescape(key).map_err(corrupt)?;
    let value = match kind {
        EventKind::Put => unescape(value).map_err(corrupt)?,
        EventKind::Delete => String::new(),
    };

    Ok(Event {
        sequence,
        kind,
        key,
        value,
    })
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(field: &str) -> std::result::Result<String, String> {
    if !field.contains('\\') {
        return Ok(field.to_string());
    }

    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("invalid escape \\{}", other)),
            None => return Err("dangling escape at end of field".to_string()),
        }
    }
    Ok(out)
}
