//! # FSCP Transport
//!
//! Datagram transport abstraction for FSCP endpoints.
//!
//! FSCP is transport-agnostic as long as the transport delivers discrete
//! datagrams: every datagram carries exactly one protocol message. This
//! crate provides:
//! - the [`Datagram`] trait that endpoints drive
//! - [`UdpTransport`], the production UDP implementation
//! - [`MemoryNetwork`]/[`MemoryTransport`], a lossless in-process transport
//!   for deterministic tests

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod datagram;
pub mod mem;
pub mod udp;

pub use datagram::{Datagram, TransportError};
pub use mem::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;
