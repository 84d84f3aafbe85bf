//! # cask-hash
//!
//! SHA-1 content addresses and streaming digests for the cask store.
//!
//! An [`Address`] is the 20-byte SHA-1 digest that identifies a stored
//! object. Its textual form is exactly 40 hexadecimal digits, emitted
//! upper-case and parsed in either case. [`Hasher`] accumulates a digest
//! over a stream of chunks; [`digest_reader`] and [`digest_stream`] are
//! one-shot helpers that read a source to EOF.

mod address;
mod digest;

pub use address::{Address, ParseAddressError};
pub use digest::{digest_bytes, digest_reader, digest_stream, Hasher};
