//! Key-Range Storage Module
//!
//! Holds the slice of the key space a node currently owns.
//!
//! ## Core Concepts
//! - **Ordered map**: Keys are integers in `[1, 1024]`, values are strings, kept key-sorted.
//! - **Range extraction**: On join the donor splits off the candidate's sub-range in one step.
//! - **Range merge**: On leave (or admission) the recipient absorbs a neighbour's slice wholesale.
//!
//! Ownership checks live with the node state, not here.

pub mod store;
