//! Request Routing Module
//!
//! Steady-state `lookup`, `insert`, `delete` and `print`.
//!
//! ## Core Concepts
//! - **Ownership test**: A key is served where it falls in the node's circular range.
//! - **Forwarding**: On a miss the node appends its id to the path trace and passes the request to its
//!   successor, fire-and-forget.
//! - **Result channel**: The owner reports straight to the bootstrap node, never back along the chain.
//! - **Print**: Every node lists its own keys and passes the request on until it would reach its origin.

pub mod report;
pub mod router;
