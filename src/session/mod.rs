//! # Session Module
//!
//! Per-node command sessions.
//!
//! - `mailbox`: single-slot acknowledgment handoff
//! - `node`: transport ownership, reader task and command execution
//! - `op`: node-independent named operations

pub mod mailbox;
pub mod node;
pub mod op;

pub use mailbox::Mailbox;
pub use node::{CommandResult, NodeSession};
pub use op::NodeOp;
