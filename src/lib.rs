//! A lightweight pub/sub transport over TCP for soft-realtime systems:
//! one-in-flight-per-peer flow control on the publish side, latest-wins
//! coalescing on the subscribe side, and no broker, discovery, ordering,
//! or delivery guarantees in between. See `SPEC_FULL.md` for the full
//! design.

pub mod compression;
pub mod error;
pub mod image;
mod node;
mod pacer;
mod publisher;
mod subscriber;
mod wire;

pub use error::{Result, TetherError};
pub use node::{Compression, Node};
pub use publisher::Publisher;
pub use subscriber::Subscriber;
