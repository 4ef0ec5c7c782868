//! Node Assembly Module
//!
//! Puts a bootstrap node or a ring node together and drives it from the operator console.
//!
//! ## Core Concepts
//! - **RingNode**: Binds the listener, owns the node state behind one lock and exposes the operator
//!   operations (`enter`, `exit`, `lookup`, `insert`, `delete`, `print`, `status`).
//! - **Roles**: The bootstrap node starts as the sole member holding every key and collects routed
//!   results on its console. A ring node starts detached and joins on `enter`.
//! - **Events**: Joins, exits, print listings and routed results reach the operator through an
//!   unbounded channel, independent of the command that caused them.

pub mod console;
pub mod events;
pub mod node;
