pub mod event;

pub use event::{Event, EventKind, Mutation, Sequence};
