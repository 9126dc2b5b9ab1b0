//! Payload loading, MIME message rendering, and EML storage.
//!
//! The renderer is pure: given a validated payload, attachment bytes and
//! a date, identical inputs produce byte-identical RFC 5322 output. The
//! only I/O in this crate is reading the named attachment files and
//! persisting the rendered bytes.

pub mod builder;
pub mod error;
pub mod payload;
pub mod storage;

pub use builder::{Attachment, MessageBuilder};
pub use error::EmlError;
pub use payload::Payload;
pub use storage::EmlStorage;
