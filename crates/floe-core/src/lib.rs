//! Core types for the Floe block-data layer.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the rest of the workspace: identifiers, variable
//! metadata, the resolved field schema, the cooperative task status, and
//! the error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod meta;
pub mod schema;
pub mod status;

pub use error::{AllocError, BoundaryError, ConfigError, SelectionError, TransportError};
pub use id::{BlockId, PackId, RankId, SparseId, StorageGeneration, VarLabel};
pub use meta::{FlagSet, Metadata, MetadataFlag, Placement};
pub use schema::{ResolvedSchema, SchemaBuilder, SparsePool};
pub use status::TaskStatus;

/// Field scalar type used throughout the workspace.
///
/// All cell, face, and flux storage holds `Real` values. Single precision
/// is not supported; mixed-precision kernels convert at the edges.
pub type Real = f64;
