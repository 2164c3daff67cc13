//! Storage error types.
//!
//! Backend failures and isolation failures share one type so that storage
//! calls compose with `?`; the tenancy cases keep their [`TenancyError`] intact.

use super::ResourceKey;
use crate::enforcer::ResourceKind;
use crate::error::TenancyError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No row with this kind and id
    #[error("Resource not found: {kind}/{id}")]
    ResourceNotFound { kind: ResourceKind, id: String },

    /// A row with this kind and id already exists
    #[error("Resource already exists: {kind}/{id}")]
    ResourceAlreadyExists { kind: ResourceKind, id: String },

    /// The acting tenant may not touch the row
    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    /// Backend cannot be reached
    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },
}

impl StorageError {
    pub fn not_found(key: &ResourceKey) -> Self {
        Self::ResourceNotFound {
            kind: key.kind(),
            id: key.id().to_string(),
        }
    }

    pub fn already_exists(key: &ResourceKey) -> Self {
        Self::ResourceAlreadyExists {
            kind: key.kind(),
            id: key.id().to_string(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// The tenancy failure behind this error, if any.
    pub fn tenancy(&self) -> Option<&TenancyError> {
        match self {
            StorageError::Tenancy(error) => Some(error),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
