//! # Link Reader Module
//!
//! Reassembles frames from the raw byte stream of one node transport.

pub mod reader;

pub use reader::{LinkReader, ReaderState, ReaderStats};
