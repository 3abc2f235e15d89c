//! The per-block variable container and its exchange driver.
//!
//! [`BlockData`] is the owner of everything that lives on one mesh block:
//! the registry of cell and face variables, the sparse allocation policy
//! governing which of them hold storage right now, the cache of variable
//! packs built over them, and the persistent boundary channels that move
//! ghost and flux data to the block's neighbors.
//!
//! The crate splits along those lines:
//!
//! - [`alloc`] — [`SparseConfig`] and the [`AllocationPolicy`] deciding
//!   when variables get storage and who may take it away.
//! - [`data`] — [`BlockData`] itself: registration, lookup, selection,
//!   copies, and the pack retrieval family.
//! - [`exchange`] — the container half of the boundary protocol: channel
//!   setup, the non-blocking send/receive/clear cycle, and the
//!   [`Prolongator`] seam for filling coarse-fine interfaces.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod alloc;
pub mod data;
pub mod exchange;

pub use alloc::{AllocationPolicy, SparseConfig};
pub use data::{BlockData, CopyFilter};
pub use exchange::Prolongator;
