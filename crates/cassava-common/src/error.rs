//! Error types and error codes for Cassava
//!
//! This module defines:
//! - `CassavaError`: Application-specific error enum
//! - `ErrorCode`: Structured error codes for logging and API responses

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CassavaError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    #[error("service '{0}' not exist")]
    ServiceNotExist(String),

    #[error("lookup of service '{service_id}' failed: {reason}")]
    LookupFailed { service_id: String, reason: String },

    #[error("lookup of service '{0}' timed out")]
    LookupTimeout(String),

    #[error("{kind} quota of tenant '{tenant}' exceeded: used {used}, requested {requested}, limit {limit}")]
    QuotaExceeded {
        kind: String,
        tenant: String,
        used: i64,
        requested: i64,
        limit: i64,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CassavaError {
    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CassavaError::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn lookup_failed(service_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CassavaError::LookupFailed {
            service_id: service_id.into(),
            reason: reason.into(),
        }
    }

    /// Structured code for this error
    pub fn code(&self) -> ErrorCode<'static> {
        match self {
            CassavaError::IllegalArgument(_) => PARAMETER_VALIDATE_ERROR,
            CassavaError::MalformedKey { .. } => MALFORMED_KEY,
            CassavaError::ServiceNotExist(_) => SERVICE_NOT_EXIST,
            CassavaError::LookupFailed { .. } | CassavaError::LookupTimeout(_) => {
                DATA_ACCESS_ERROR
            }
            CassavaError::QuotaExceeded { .. } => OVER_TENANT_QUOTA,
            CassavaError::ConfigError(_) | CassavaError::InternalError(_) => SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, CassavaError>;

/// Error code structure
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const MALFORMED_KEY: ErrorCode<'static> = ErrorCode {
    code: 20014,
    message: "malformed registry key",
};

pub const OVER_TENANT_QUOTA: ErrorCode<'static> = ErrorCode {
    code: 5033,
    message: "tenant capacity reach quota",
};

pub const SERVICE_NOT_EXIST: ErrorCode<'static> = ErrorCode {
    code: 21008,
    message: "service not exist",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};
