//! Error types for the zonal statistics pipeline.
//!
//! Only configuration problems and unavailable data sources reach the caller.
//! Data gaps and empty categories are absorbed into no-data statistics and
//! never appear here.

use thiserror::Error;
use zonal_common::CommonError;

/// Errors that can occur while running an analysis.
#[derive(Error, Debug)]
pub enum ZonalError {
    /// A data source query failed. Never retried.
    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    /// The analysis configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The area of interest could not be built.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Invalid metadata in a raster store or catalog.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Failed to read raster data.
    #[error("failed to read raster data: {0}")]
    ReadFailed(String),

    /// Zarr format error.
    #[error("Zarr format error: {0}")]
    Zarr(String),

    /// The analysis was superseded by a newer selection.
    #[error("analysis cancelled")]
    Cancelled,

    /// Unexpected internal failure, e.g. a panicked worker task.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZonalError {
    /// Create a SourceUnavailable error.
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl Into<String>) -> Self {
        Self::Zarr(msg.into())
    }

    /// Create an Internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Coarse classification reported to presentation collaborators.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SourceUnavailable(_) | Self::ReadFailed(_) | Self::Zarr(_) => {
                FailureKind::SourceUnavailable
            }
            Self::InvalidConfig(_) | Self::InvalidGeometry(_) | Self::InvalidMetadata(_) => {
                FailureKind::InvalidConfig
            }
            Self::Cancelled | Self::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Failure category carried by `AnalysisFailed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceUnavailable,
    InvalidConfig,
    Internal,
}

impl From<CommonError> for ZonalError {
    fn from(err: CommonError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for ZonalError {
    fn from(err: std::io::Error) -> Self {
        Self::SourceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ZonalError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ZonalError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Internal(err.to_string())
        }
    }
}

/// Result type for zonal processor operations.
pub type Result<T> = std::result::Result<T, ZonalError>;
