//! Boundary exchange between neighboring mesh blocks.
//!
//! This crate moves ghost-cell data and correction fluxes between blocks.
//! It is split along the protocol's seams:
//!
//! - [`topology`] — who my neighbors are ([`Topology`], [`Neighbor`],
//!   [`Face`]) and what they have allocated ([`AllocationSnapshot`]).
//! - [`transport`] — how bytes move ([`Transport`], [`ChannelTag`],
//!   [`BoundaryMessage`]), with an in-process [`MemoryTransport`] used by
//!   single-rank runs and tests.
//! - [`slab`] — which cells a given neighbor relationship covers, and the
//!   averaging restriction applied across refinement jumps.
//! - [`channel`] — one persistent endpoint's cycle-counted state machine
//!   ([`BoundaryChannel`]).
//! - [`boundary`] — the per-variable protocol driver
//!   ([`BoundaryVariable`]) that the block container orchestrates.
//!
//! Sends never block. Receives are polls: "nothing yet" is a
//! [`TaskStatus::Incomplete`](floe_core::TaskStatus), not an error, and the
//! caller re-polls until every channel reports complete.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod channel;
pub mod slab;
pub mod topology;
pub mod transport;

pub use boundary::{BoundaryVariable, ExchangePhase};
pub use channel::{BoundaryChannel, ChannelState};
pub use topology::{AllocationSnapshot, Face, Neighbor, Topology};
pub use transport::{BoundaryMessage, ChannelKind, ChannelTag, MemoryTransport, Transport};
