//! Memory module - Core types and data structures
//!
//! The central `Memory` entity plus its satellite types: kinds, privacy
//! scopes, links, feedback events, and the validated insert draft.

mod item;

pub use item::{
    FeedbackEvent, FeedbackKind, Link, LinkKind, Memory, MemoryDraft, MemoryKind, Privacy,
};
