//! # Radio Fleet Library
//!
//! Command a fleet of embedded radio nodes and collect the telemetry they
//! report.
//!
//! Every node sits behind its own byte-stream link (serial port or TCP
//! socket) speaking a small framed protocol. This library provides the frame
//! codec, a resynchronizing link reader, per-node command sessions, a fan-out
//! executor running one command on many nodes at once, and the coverage
//! campaign built on top of them.

pub mod campaign;
pub mod config;
pub mod error;
pub mod fanout;
pub mod fleet;
pub mod frame;
pub mod link;
pub mod session;
pub mod telemetry;
pub mod transport;
