//! composition errors
//!
//! All of these are validation failures of the desired state. Composition stops at the
//! first one and nothing of the failing entity is emitted.
use crate::entity::EntityRef;
use crate::path::{InvalidSegment, NamespacePath};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("must pass {field} to {entity}")]
    MissingRequiredField {
        entity: EntityRef,
        field: &'static str,
    },

    #[error("must provide a site when providing a location in {entity}")]
    MissingScope { entity: EntityRef },

    #[error("no more than one of {first} or {second} can be specified in {entity}")]
    ConflictingModifiers {
        entity: EntityRef,
        first: &'static str,
        second: &'static str,
    },

    #[error("must pass exactly one of source or content to {entity}")]
    MutuallyExclusiveInput { entity: EntityRef },

    #[error("must specify both ssl_cert and ssl_key in {entity} when {field} is set")]
    IncompleteSslConfig {
        entity: EntityRef,
        field: &'static str,
    },

    #[error("must pass ssl_cert and ssl_key to {entity} when ssl_redirect => true")]
    MissingSslForRedirect { entity: EntityRef },

    #[error("hsts can only be enabled together with ssl_redirect in {entity}")]
    InvalidHstsConfig { entity: EntityRef },

    #[error("{path} is declared by both {existing} and {new}")]
    DuplicatePath {
        path: NamespacePath,
        existing: EntityRef,
        new: EntityRef,
    },

    #[error("unusable path in {entity}")]
    InvalidPath {
        entity: EntityRef,
        #[source]
        source: InvalidSegment,
    },
}

impl CompositionError {
    /// The entity whose declaration failed
    pub fn entity(&self) -> &EntityRef {
        match self {
            CompositionError::MissingRequiredField { entity, .. }
            | CompositionError::MissingScope { entity }
            | CompositionError::ConflictingModifiers { entity, .. }
            | CompositionError::MutuallyExclusiveInput { entity }
            | CompositionError::IncompleteSslConfig { entity, .. }
            | CompositionError::MissingSslForRedirect { entity }
            | CompositionError::InvalidHstsConfig { entity }
            | CompositionError::InvalidPath { entity, .. } => entity,
            CompositionError::DuplicatePath { new, .. } => new,
        }
    }
}

/// Attach the entity to path errors
pub(crate) trait PathResultExt<T> {
    fn for_entity(self, entity: &EntityRef) -> Result<T, CompositionError>;
}

impl<T> PathResultExt<T> for Result<T, InvalidSegment> {
    fn for_entity(self, entity: &EntityRef) -> Result<T, CompositionError> {
        self.map_err(|source| CompositionError::InvalidPath {
            entity: entity.clone(),
            source,
        })
    }
}
