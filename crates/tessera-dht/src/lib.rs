//! Kademlia-style distributed value store.
//!
//! Content-addressed records (`key == blake3(value)`) are stored on the
//! `R` peers closest to the key in the 256-bit XOR keyspace:
//!
//! - [`RoutingTable`] — per-node peer buckets over the XOR metric.
//! - [`DhtNode`] — put/get with majority-ack replication, background
//!   retry, iterative lookup, and retention sweeping.
//!
//! Network access goes through [`tessera_net::Rpc`], so tests run against
//! in-process mocks instead of live QUIC endpoints.

mod error;
mod node;
mod routing;

pub use error::DhtError;
pub use node::{DhtConfig, DhtNode};
pub use routing::RoutingTable;
