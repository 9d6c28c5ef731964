//! Utility functions for Cassava

use crate::SPLIT;

/// Join a domain and project into a tenant scope (`domain/project`)
pub fn join_tenant(domain: &str, project: &str) -> String {
    format!("{}{}{}", domain, SPLIT, project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_tenant() {
        assert_eq!(join_tenant("default", "default"), "default/default");
        assert_eq!(join_tenant("acme@corp", "p1"), "acme@corp/p1");
    }
}
