//! Link Transport Module
//!
//! Connection-per-request messaging between ring members over TCP.
//!
//! ## Core Concepts
//! - **Protocol**: One typed [`Message`](protocol::Message) per connection; only `enter` is answered.
//! - **Framing**: Length-prefixed bincode frames with an upper size bound.
//! - **Client**: Every call has a deadline and a bounded number of delivery attempts,
//!   surfacing `Unreachable` and `Timeout` as distinct error kinds instead of hanging.
//! - **Server**: A single accept loop that spawns one handler task per connection.
//! - **De-duplication**: Operation ids stay constant across hops so retried deliveries are applied once.

pub mod client;
pub mod codec;
pub mod dedup;
pub mod protocol;
pub mod server;
