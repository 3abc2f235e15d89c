//! Floe: per-block field data for block-structured mesh refinement codes.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Floe sub-crates. For most users, adding `floe` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use floe::prelude::*;
//! use std::sync::Arc;
//!
//! // Declare the fields every block carries.
//! let mut builder = SchemaBuilder::new();
//! builder
//!     .add_field(
//!         "rho",
//!         Metadata::new(Placement::Cell, &[
//!             MetadataFlag::Independent,
//!             MetadataFlag::FillGhost,
//!         ]),
//!     )
//!     .unwrap();
//! builder
//!     .add_sparse_pool(
//!         "scalar",
//!         Metadata::new(Placement::Cell, &[
//!             MetadataFlag::Independent,
//!             MetadataFlag::Sparse,
//!         ])
//!         .with_default_value(0.5),
//!         &[SparseId(1), SparseId(4)],
//!     )
//!     .unwrap();
//! let schema = Arc::new(builder.build());
//!
//! // One container per mesh block. Dense fields get storage immediately;
//! // sparse pool members wait for a runtime allocation decision.
//! let layout = BlockLayout::new(16, 16, 1, 2, false).unwrap();
//! let mut data = BlockData::new(BlockId(0), layout, SparseConfig { enabled: true });
//! data.initialize(&schema).unwrap();
//! assert!(data.is_allocated(&VarLabel::dense("rho")));
//! assert!(!data.is_allocated(&VarLabel::sparse("scalar", SparseId(1))));
//!
//! data.allocate_sparse("scalar", SparseId(1)).unwrap();
//!
//! // Bundle variables into a cached, name-indexed pack. Pool bases expand
//! // to their members; unallocated members keep a slot but no storage.
//! let pack = data
//!     .pack_variables_by_name(&["rho", "scalar"], None, false)
//!     .unwrap();
//! assert_eq!(pack.len(), 3);
//! assert!(pack.is_allocated(1));
//! assert!(!pack.is_allocated(2));
//! assert!(pack.index().contains("scalar_1"));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `floe-core` | IDs, metadata, the field schema, errors, `TaskStatus` |
//! | [`field`] | `floe-field` | Block layout and per-variable storage |
//! | [`pack`] | `floe-pack` | Variable lists, packs, and the fingerprint-keyed cache |
//! | [`comm`] | `floe-comm` | Boundary channels, mesh topology, transports |
//! | [`block`] | `floe-block` | The per-block container and the exchange driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, IDs, and errors (`floe-core`).
///
/// Contains variable metadata, the resolved field schema, the cooperative
/// [`types::TaskStatus`], and the error taxonomy shared by every sub-crate.
pub use floe_core as types;

/// Block layout and variable storage (`floe-field`).
///
/// Provides [`field::BlockLayout`] (cell counts, ghost depth, coarse mirror
/// geometry) and the storage types [`field::CellVariable`] and
/// [`field::FaceVariable`].
pub use floe_field as field;

/// Variable lists and packs (`floe-pack`).
///
/// Build a [`pack::VarList`], then bundle it into a [`pack::VariablePack`]
/// or [`pack::VariableFluxPack`] through the [`pack::PackCache`]. Packs are
/// invalidated automatically when sparse allocation state changes.
pub use floe_pack as pack;

/// Boundary communication (`floe-comm`).
///
/// The [`comm::Topology`] and [`comm::Transport`] traits are the extension
/// points for real meshes and real wires; [`comm::MemoryTransport`] serves
/// tests and single-process runs.
pub use floe_comm as comm;

/// The per-block container (`floe-block`).
///
/// [`block::BlockData`] ties the layers together: schema registration,
/// sparse allocation, pack retrieval, and the non-blocking ghost and
/// flux-correction exchange.
pub use floe_block as block;

/// Common imports for typical Floe usage.
///
/// ```rust
/// use floe::prelude::*;
/// ```
///
/// This imports the most frequently used types: the schema builder, variable
/// metadata, block layout, the container, and the exchange-facing traits.
pub mod prelude {
    // Core types and IDs
    pub use floe_core::{
        BlockId, Metadata, MetadataFlag, Placement, RankId, Real, ResolvedSchema, SchemaBuilder,
        SparseId, TaskStatus, VarLabel,
    };

    // Errors
    pub use floe_core::{AllocError, BoundaryError, ConfigError, SelectionError, TransportError};

    // Field storage
    pub use floe_field::{Axis, BlockLayout, CellVariable, FaceVariable};

    // Packs
    pub use floe_pack::{VarList, VariableFluxPack, VariablePack};

    // Communication
    pub use floe_comm::{
        AllocationSnapshot, ExchangePhase, Face, MemoryTransport, Neighbor, Topology, Transport,
    };

    // Block container
    pub use floe_block::{BlockData, CopyFilter, Prolongator, SparseConfig};
}
