//! Cassava Common - Shared types, constants, and utilities
//!
//! This crate provides the foundational pieces used across all Cassava components:
//! - Error types and error codes
//! - Registry key layout constants
//! - Reserved tenant and quota plugin names
//! - Tenant scope helpers

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{CassavaError, ErrorCode, Result};
pub use utils::join_tenant;

/// Separator between key segments, and between a tenant and a service id
pub const SPLIT: &str = "/";

/// Registry key prefixes
pub const SERVICE_INDEX_PREFIX: &str = "/cse-sr/ms/indexes/";
pub const SERVICE_FILE_PREFIX: &str = "/cse-sr/ms/files/";
pub const INSTANCE_FILE_PREFIX: &str = "/cse-sr/inst/files/";

/// Tenant scope (`domain/project`) reserved for the registry itself
pub const REGISTRY_DOMAIN_PROJECT: &str = "default/default";

/// Application id under which shared services register
pub const REGISTRY_APP_ID: &str = "default";

/// Service name of the registry, always treated as shared
pub const REGISTRY_SERVICE_NAME: &str = "SERVICECENTER";

/// Quota plugin name that activates the built-in counting engine
pub const BUILDIN_QUOTA_PLUGIN: &str = "buildin";

/// Default per-tenant limits used by the built-in quota plugin
pub const DEFAULT_SERVICE_QUOTA: i64 = 50000;
pub const DEFAULT_INSTANCE_QUOTA: i64 = 150000;
pub const DEFAULT_SCHEMA_QUOTA: i64 = 100;
pub const DEFAULT_TAG_QUOTA: i64 = 100;
pub const DEFAULT_RULE_QUOTA: i64 = 100;

/// Default timeout for metadata lookups issued while classifying services
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 3000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_domain_project() {
        assert_eq!(REGISTRY_DOMAIN_PROJECT, join_tenant("default", "default"));
    }

    #[test]
    fn test_prefixes_under_root() {
        for prefix in [
            SERVICE_INDEX_PREFIX,
            SERVICE_FILE_PREFIX,
            INSTANCE_FILE_PREFIX,
        ] {
            assert!(prefix.starts_with("/cse-sr/"));
            assert!(prefix.ends_with(SPLIT));
        }
    }
}
