use serde::{Deserialize, Serialize};
use std::fmt;

/// Event sequence number - strictly monotonic u64, starting at 1
pub type Sequence = u64;

/// Kind of mutation recorded by an event
///
/// The numeric codes are part of the on-disk and on-table format and must
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    Delete = 1,
    Put = 2,
}

impl EventKind {
    pub const DELETE_CODE: u8 = 1;
    pub const PUT_CODE: u8 = 2;

    /// Stable integer code used by every backend
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            Self::DELETE_CODE => Some(EventKind::Delete),
            Self::PUT_CODE => Some(EventKind::Put),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Delete => f.write_str("DELETE"),
            EventKind::Put => f.write_str("PUT"),
        }
    }
}

/// One durable log record: a sequenced Put or Delete of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: Sequence,
    pub kind: EventKind,
    pub key: String,
    /// Empty for deletes
    pub value: String,
}

impl Event {
    pub fn put(sequence: Sequence, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: EventKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(sequence: Sequence, key: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: EventKind::Delete,
            key: key.into(),
            value: String::new(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Put => write!(f, "#{} PUT {} = {:?}", self.sequence, self.key, self.value),
            EventKind::Delete => write!(f, "#{} DELETE {}", self.sequence, self.key),
        }
    }
}

/// A mutation waiting in the write queue, not yet sequenced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: EventKind,
    pub key: String,
    pub value: String,
}

impl Mutation {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Attach the sequence assigned by the backend
    pub fn into_event(self, sequence: Sequence) -> Event {
        Event {
            sequence,
            kind: self.kind,
            key: self.key,
            value: self.value,
        }
    }
}
