//! Variable packs: indexed bundles of variables for kernel-style loops.
//!
//! A pack flattens a selection of [`CellVariable`](floe_field::CellVariable)s
//! into consecutive component slots so that numerical kernels can iterate
//! one flat range instead of walking the registry. Packs are built per
//! container and memoized in a [`PackCache`]; the cache re-validates each
//! hit against the selection's current [`AllocFingerprint`] and rebuilds
//! when sparse allocation has shifted underneath it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod fingerprint;
pub mod list;
pub mod pack;

pub use cache::PackCache;
pub use fingerprint::AllocFingerprint;
pub use list::VarList;
pub use pack::{PackIndexMap, PackedVar, SlotRange, VariableFluxPack, VariablePack};
