//! Error types for the Floe block-data layer, organized by subsystem:
//! configuration, selection, allocation, transport, and boundary exchange.
//!
//! Non-completion of a communication poll is **not** an error — it is
//! reported through [`TaskStatus`](crate::TaskStatus). Everything in this
//! module is fatal to the operation that returned it.

use crate::id::SparseId;
use crate::meta::Placement;
use std::error::Error;
use std::fmt;

/// Errors raised while declaring schemas, layouts, or variables.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// A variable was declared at a placement this layer cannot store.
    UnsupportedPlacement {
        /// The offending placement.
        placement: Placement,
        /// Name of the variable being declared.
        name: String,
    },
    /// A flag combination or shape violates the metadata rules.
    InvalidMetadata {
        /// Name of the variable being declared.
        name: String,
        /// Which rule was violated.
        reason: String,
    },
    /// A variable identity was declared twice where uniqueness is required.
    DuplicateField {
        /// Rendered label of the colliding identity.
        label: String,
    },
    /// A sparse pool listed the same member ID twice.
    DuplicateSparseId {
        /// Base name of the pool.
        base: String,
        /// The repeated ID.
        id: SparseId,
    },
    /// A sparse pool listed a negative member ID.
    InvalidSparseId {
        /// Base name of the pool.
        base: String,
        /// The rejected ID.
        id: SparseId,
    },
    /// A sparse pool was declared with no member IDs.
    EmptyPool {
        /// Base name of the pool.
        base: String,
    },
    /// Block layout extents or ghost width are unusable.
    InvalidLayout {
        /// Which constraint failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPlacement { placement, name } => {
                write!(f, "variable '{name}': {placement} placement is not supported")
            }
            Self::InvalidMetadata { name, reason } => {
                write!(f, "variable '{name}': invalid metadata: {reason}")
            }
            Self::DuplicateField { label } => {
                write!(f, "variable '{label}' is already registered")
            }
            Self::DuplicateSparseId { base, id } => {
                write!(f, "pool '{base}': duplicate sparse id {id}")
            }
            Self::InvalidSparseId { base, id } => {
                write!(f, "pool '{base}': sparse id {id} is negative")
            }
            Self::EmptyPool { base } => write!(f, "pool '{base}' has no member ids"),
            Self::InvalidLayout { reason } => write!(f, "invalid block layout: {reason}"),
        }
    }
}

impl Error for ConfigError {}

/// Errors raised when a lookup or selection names nothing.
///
/// Always carries the offending name so task-level logs can point at the
/// misspelled or never-registered variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionError {
    /// A requested name matched neither a dense variable nor a sparse base.
    UnknownVariable {
        /// The name that resolved to nothing.
        name: String,
    },
    /// A base name exists but the requested pool member does not.
    UnknownSparseId {
        /// Base name of the pool.
        base: String,
        /// The ID that is not registered.
        id: SparseId,
    },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVariable { name } => {
                write!(f, "no variable named '{name}' is registered")
            }
            Self::UnknownSparseId { base, id } => {
                write!(f, "pool '{base}' has no member with sparse id {id}")
            }
        }
    }
}

impl Error for SelectionError {}

/// Errors raised by the sparse allocation policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// Allocation state of a dense variable cannot be changed.
    NotSparse {
        /// Rendered label of the variable.
        label: String,
    },
    /// Sparse allocation support is disabled for this block.
    SparseDisabled {
        /// Rendered label of the variable.
        label: String,
    },
    /// The named variable is not registered on this block.
    UnknownVariable {
        /// Rendered label that resolved to nothing.
        label: String,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSparse { label } => {
                write!(f, "variable '{label}' is not sparse; its allocation is fixed")
            }
            Self::SparseDisabled { label } => {
                write!(f, "sparse support is disabled; cannot deallocate '{label}'")
            }
            Self::UnknownVariable { label } => {
                write!(f, "no variable named '{label}' is registered")
            }
        }
    }
}

impl Error for AllocError {}

/// Errors raised by a message transport.
///
/// A transport failure is a resource failure, not a timing condition:
/// "nothing arrived yet" is expressed as `Ok(None)` from a poll, never as
/// an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// Send or poll on a tag that was never opened.
    ChannelUnopened {
        /// Rendered channel tag.
        tag: String,
    },
    /// The peer endpoint is gone.
    ChannelClosed {
        /// Rendered channel tag.
        tag: String,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelUnopened { tag } => write!(f, "channel {tag} was never opened"),
            Self::ChannelClosed { tag } => write!(f, "channel {tag} is closed"),
        }
    }
}

impl Error for TransportError {}

/// Errors raised by the boundary-exchange protocol driver.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundaryError {
    /// A ghost-filled variable has no persistent channels; channel setup
    /// must run before the first receive cycle.
    SetupMissing {
        /// Rendered label of the variable.
        label: String,
    },
    /// A protocol call arrived outside its legal window in the cycle.
    OutOfOrder {
        /// The operation that was attempted.
        op: &'static str,
        /// The channel state it found.
        state: &'static str,
    },
    /// The variable was reallocated mid-cycle without rebinding its
    /// boundary storage.
    StaleBinding {
        /// Rendered label of the variable.
        label: String,
    },
    /// A coarser neighbor was reported for a variable without coarse
    /// storage; the layout and the topology disagree about refinement.
    CoarseStorageMissing {
        /// Rendered label of the variable.
        label: String,
    },
    /// The underlying transport failed.
    Transport {
        /// Rendered channel tag.
        tag: String,
        /// The transport failure.
        source: TransportError,
    },
    /// The external prolongation collaborator failed.
    Prolongation {
        /// Description from the collaborator.
        reason: String,
    },
}

impl fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetupMissing { label } => {
                write!(f, "variable '{label}' has no boundary channels; run channel setup first")
            }
            Self::OutOfOrder { op, state } => {
                write!(f, "{op} called while channel is {state}")
            }
            Self::StaleBinding { label } => {
                write!(
                    f,
                    "variable '{label}' was reallocated mid-cycle; rebind boundary storage first"
                )
            }
            Self::CoarseStorageMissing { label } => {
                write!(f, "variable '{label}' has a refined neighbor but no coarse storage")
            }
            Self::Transport { tag, source } => {
                write!(f, "transport failure on channel {tag}: {source}")
            }
            Self::Prolongation { reason } => write!(f, "prolongation failed: {reason}"),
        }
    }
}

impl Error for BoundaryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        let err = SelectionError::UnknownVariable {
            name: "denisty".to_string(),
        };
        assert!(err.to_string().contains("denisty"));

        let err = AllocError::NotSparse {
            label: "rho".to_string(),
        };
        assert!(err.to_string().contains("rho"));
    }

    #[test]
    fn boundary_transport_error_exposes_source() {
        let err = BoundaryError::Transport {
            tag: "ghost 1->2 rho".to_string(),
            source: TransportError::ChannelClosed {
                tag: "ghost 1->2 rho".to_string(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("closed"));
    }
}
