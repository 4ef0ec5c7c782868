//! Ring Membership Module
//!
//! Keeps every node's view of "who owns which keys" consistent while nodes
//! join and leave.
//!
//! ## Core Concepts
//! - **Identifier space**: Integers `[1, 1024]` read circularly. The bootstrap node sits at the reserved id 0.
//! - **Ownership**: A node owns `(predecessor, self]`. The union of all ranges covers the space exactly once
//!   between handoffs.
//! - **Join**: The candidate asks the bootstrap node. The request walks successor links until it reaches the
//!   node whose range holds the candidate id; that node splits its range and hands the lower part over.
//!   The candidate then tells its new predecessor to point at it.
//! - **Leave**: The leaving node gives its keys and predecessor to its successor, then its successor to its
//!   predecessor. With a single peer left, that peer absorbs everything and becomes the sole member.
//!
//! All state transitions live in [`state`] as plain synchronous methods; [`membership`] wraps them with
//! the network calls.

pub mod membership;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
