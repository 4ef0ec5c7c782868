//! Ring-Partitioned Key-Value Store
//!
//! Peer nodes arrange themselves on a circular identifier space `[1, 1024]` and each owns a
//! contiguous slice of it. A bootstrap node (id 0) seeds the ring, holds the initial keys and is
//! the entry point for joins. Operations entering at any node are forwarded along successor
//! links until they reach the owner.
//!
//! ## Architecture Modules
//! - **`ring`**: Identifiers, ranges, per-node link state, and the join/leave/handoff protocol.
//! - **`storage`**: The ordered key store with the range split/merge used by handoff.
//! - **`routing`**: Ownership tests, forwarding with path traces, print traversal, result delivery.
//! - **`transport`**: Connection-per-request TCP messaging with bincode frames, timeouts and retry.
//! - **`node`**: Assembles a running node and its operator console.
//! - **`config`**: Config-file parsing and environment overrides.

pub mod config;
pub mod error;
pub mod node;
pub mod ring;
pub mod routing;
pub mod storage;
pub mod transport;
