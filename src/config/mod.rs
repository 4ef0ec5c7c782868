//! Node Configuration
//!
//! Reads the per-node config file and layers `RING_*` environment overrides on top.
//!
//! ## Core Concepts
//! - **File**: Line 1 is the node id, line 2 the port. A bootstrap file lists its initial `key value`
//!   pairs after that; a ring node file names the bootstrap node's address and port on line 3.
//! - **Overrides**: `RING_BIND_HOST`, `RING_RPC_TIMEOUT_MS`, `RING_RPC_ATTEMPTS`, `RING_LOG_LEVEL`.
//! - **Failures**: Every problem is a `RingError::Config` naming the offending line; the node does not start.

pub mod loader;
