//! Block layout, buffer storage, and field variables for Floe.
//!
//! A [`BlockLayout`] fixes the cell geometry every variable on a mesh
//! block shares: interior extents, ghost width, and whether coarse mirror
//! buffers exist for refinement boundaries. [`Buffer`] is the dense host
//! storage behind every variable, and [`CellVariable`]/[`FaceVariable`]
//! pair a buffer (or three) with its identity, metadata, and allocation
//! state.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod layout;
pub mod variable;

pub use buffer::{Buffer, Slab};
pub use layout::{Axis, BlockLayout, IndexDomain};
pub use variable::{CellVariable, FaceRead, FaceVariable, FaceWrite, VarRead, VarWrite};
