//! The resolved field schema: every variable a block must carry.
//!
//! Upstream components each declare the fields they need; by the time a
//! block is initialized those declarations have been merged into one
//! [`ResolvedSchema`]. The schema is immutable after [`SchemaBuilder::build`]
//! and shared (`Arc`) by every block on the rank.

use crate::error::ConfigError;
use crate::id::{SparseId, VarLabel};
use crate::meta::{Metadata, MetadataFlag};
use std::collections::{BTreeMap, BTreeSet};

/// A pool of sparse variables sharing one base name and metadata.
///
/// Each ID in the pool becomes a distinct variable `(base, id)` on every
/// block; whether a given member is allocated on a given block is decided
/// at runtime by the allocation policy.
#[derive(Clone, Debug, PartialEq)]
pub struct SparsePool {
    meta: Metadata,
    ids: BTreeSet<SparseId>,
}

impl SparsePool {
    /// Metadata shared by every member of the pool.
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// The member IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = SparseId> + '_ {
        self.ids.iter().copied()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the pool has no members. Never true for a built schema.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is a member of this pool.
    pub fn contains(&self, id: SparseId) -> bool {
        self.ids.contains(&id)
    }
}

/// The merged, validated set of fields a block container must register.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedSchema {
    dense: BTreeMap<String, Metadata>,
    pools: BTreeMap<String, SparsePool>,
}

impl ResolvedSchema {
    /// Enumerate every concrete variable the schema implies, in a
    /// deterministic order: dense fields first (name-sorted), then pool
    /// members (name-sorted, ascending ID within a pool).
    pub fn all_fields(&self) -> impl Iterator<Item = (VarLabel, &Metadata)> + '_ {
        let dense = self
            .dense
            .iter()
            .map(|(name, meta)| (VarLabel::dense(name), meta));
        let sparse = self.pools.iter().flat_map(|(name, pool)| {
            pool.ids()
                .map(move |id| (VarLabel::sparse(name, id), pool.meta()))
        });
        dense.chain(sparse)
    }

    /// Total number of concrete variables implied by the schema.
    pub fn field_count(&self) -> usize {
        self.dense.len() + self.pools.values().map(SparsePool::len).sum::<usize>()
    }

    /// Metadata of a dense field, if one with this name exists.
    pub fn dense_meta(&self, name: &str) -> Option<&Metadata> {
        self.dense.get(name)
    }

    /// The sparse pool with this base name, if one exists.
    pub fn sparse_pool(&self, name: &str) -> Option<&SparsePool> {
        self.pools.get(name)
    }

    /// Whether `name` is the base name of a sparse pool.
    pub fn is_sparse_base(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }
}

/// Builder for [`ResolvedSchema`]; rejects invalid declarations at add time.
///
/// ```
/// use floe_core::{Metadata, MetadataFlag, Placement, SchemaBuilder, SparseId};
///
/// let mut builder = SchemaBuilder::new();
/// builder
///     .add_field(
///         "rho",
///         Metadata::new(Placement::Cell, &[
///             MetadataFlag::Independent,
///             MetadataFlag::FillGhost,
///         ]),
///     )
///     .unwrap();
/// builder
///     .add_sparse_pool(
///         "scalar",
///         Metadata::new(Placement::Cell, &[
///             MetadataFlag::Independent,
///             MetadataFlag::Sparse,
///             MetadataFlag::FillGhost,
///         ]),
///         &[SparseId(0), SparseId(3)],
///     )
///     .unwrap();
/// let schema = builder.build();
/// assert_eq!(schema.field_count(), 3);
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    dense: BTreeMap<String, Metadata>,
    pools: BTreeMap<String, SparsePool>,
}

impl SchemaBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dense field.
    ///
    /// # Errors
    ///
    /// Fails on invalid metadata, a `Sparse` flag (sparse variables are
    /// declared through [`add_sparse_pool`](Self::add_sparse_pool)), or a
    /// name already taken by a field or pool.
    pub fn add_field(&mut self, name: &str, meta: Metadata) -> Result<&mut Self, ConfigError> {
        meta.validate(name)?;
        if meta.is_set(MetadataFlag::Sparse) {
            return Err(ConfigError::InvalidMetadata {
                name: name.to_string(),
                reason: "sparse fields must be declared as a pool".to_string(),
            });
        }
        self.check_name_free(name)?;
        self.dense.insert(name.to_string(), meta);
        Ok(self)
    }

    /// Declare a sparse pool with the given member IDs.
    ///
    /// # Errors
    ///
    /// Fails on invalid metadata, a missing `Sparse` flag, an empty ID
    /// list, a negative or repeated ID, or a name already taken.
    pub fn add_sparse_pool(
        &mut self,
        name: &str,
        meta: Metadata,
        ids: &[SparseId],
    ) -> Result<&mut Self, ConfigError> {
        meta.validate(name)?;
        if !meta.is_set(MetadataFlag::Sparse) {
            return Err(ConfigError::InvalidMetadata {
                name: name.to_string(),
                reason: "pool metadata must carry the Sparse flag".to_string(),
            });
        }
        if ids.is_empty() {
            return Err(ConfigError::EmptyPool {
                base: name.to_string(),
            });
        }
        self.check_name_free(name)?;
        let mut members = BTreeSet::new();
        for &id in ids {
            if id.0 < 0 {
                return Err(ConfigError::InvalidSparseId {
                    base: name.to_string(),
                    id,
                });
            }
            if !members.insert(id) {
                return Err(ConfigError::DuplicateSparseId {
                    base: name.to_string(),
                    id,
                });
            }
        }
        self.pools.insert(
            name.to_string(),
            SparsePool {
                meta,
                ids: members,
            },
        );
        Ok(self)
    }

    /// Consume the builder and produce the immutable schema.
    pub fn build(self) -> ResolvedSchema {
        ResolvedSchema {
            dense: self.dense,
            pools: self.pools,
        }
    }

    fn check_name_free(&self, name: &str) -> Result<(), ConfigError> {
        if self.dense.contains_key(name) || self.pools.contains_key(name) {
            return Err(ConfigError::DuplicateField {
                label: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Placement;

    fn cell_meta(flags: &[MetadataFlag]) -> Metadata {
        Metadata::new(Placement::Cell, flags)
    }

    #[test]
    fn all_fields_orders_dense_then_pools() {
        let mut b = SchemaBuilder::new();
        b.add_field("zeta", cell_meta(&[MetadataFlag::Derived])).unwrap();
        b.add_field("alpha", cell_meta(&[MetadataFlag::Independent])).unwrap();
        b.add_sparse_pool(
            "pool",
            cell_meta(&[MetadataFlag::Independent, MetadataFlag::Sparse]),
            &[SparseId(5), SparseId(1)],
        )
        .unwrap();
        let schema = b.build();

        let labels: Vec<String> = schema.all_fields().map(|(l, _)| l.to_string()).collect();
        assert_eq!(labels, vec!["alpha", "zeta", "pool_1", "pool_5"]);
    }

    #[test]
    fn duplicate_names_rejected_across_kinds() {
        let mut b = SchemaBuilder::new();
        b.add_field("x", cell_meta(&[MetadataFlag::Derived])).unwrap();
        let err = b
            .add_sparse_pool(
                "x",
                cell_meta(&[MetadataFlag::Independent, MetadataFlag::Sparse]),
                &[SparseId(0)],
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField { .. }));
    }

    #[test]
    fn pool_requires_sparse_flag() {
        let mut b = SchemaBuilder::new();
        let err = b
            .add_sparse_pool("p", cell_meta(&[MetadataFlag::Independent]), &[SparseId(0)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMetadata { .. }));
    }

    #[test]
    fn dense_field_rejects_sparse_flag() {
        let mut b = SchemaBuilder::new();
        let err = b
            .add_field(
                "x",
                cell_meta(&[MetadataFlag::Independent, MetadataFlag::Sparse]),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMetadata { .. }));
    }

    #[test]
    fn pool_rejects_negative_and_duplicate_ids() {
        let sparse = cell_meta(&[MetadataFlag::Independent, MetadataFlag::Sparse]);
        let mut b = SchemaBuilder::new();
        assert!(matches!(
            b.add_sparse_pool("p", sparse.clone(), &[SparseId(-1)]),
            Err(ConfigError::InvalidSparseId { .. })
        ));
        assert!(matches!(
            b.add_sparse_pool("p", sparse.clone(), &[SparseId(2), SparseId(2)]),
            Err(ConfigError::DuplicateSparseId { .. })
        ));
        assert!(matches!(
            b.add_sparse_pool("p", sparse, &[]),
            Err(ConfigError::EmptyPool { .. })
        ));
    }

    #[test]
    fn queries_distinguish_dense_and_pools() {
        let mut b = SchemaBuilder::new();
        b.add_field("rho", cell_meta(&[MetadataFlag::Independent])).unwrap();
        b.add_sparse_pool(
            "s",
            cell_meta(&[MetadataFlag::Independent, MetadataFlag::Sparse]),
            &[SparseId(2)],
        )
        .unwrap();
        let schema = b.build();

        assert!(schema.dense_meta("rho").is_some());
        assert!(schema.dense_meta("s").is_none());
        assert!(schema.is_sparse_base("s"));
        assert!(!schema.is_sparse_base("rho"));
        assert!(schema.sparse_pool("s").is_some_and(|p| p.contains(SparseId(2))));
    }
}
