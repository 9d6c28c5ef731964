//! Built-in quota enforcement
//!
//! Answers "may this tenant create N more resources of a kind" from the
//! counts kept by [`BuildinCounter`]. Counts are best-effort, so the check is
//! advisory: concurrent creators can overshoot a limit by a small margin.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use cassava_common::{
    CassavaError, DEFAULT_INSTANCE_QUOTA, DEFAULT_RULE_QUOTA, DEFAULT_SCHEMA_QUOTA,
    DEFAULT_SERVICE_QUOTA, DEFAULT_TAG_QUOTA, Result,
};

use crate::counter::BuildinCounter;
use crate::model::ResourceKind;

/// Per-tenant limits by resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub service: i64,
    pub instance: i64,
    pub schema: i64,
    pub tag: i64,
    pub rule: i64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE_QUOTA,
            instance: DEFAULT_INSTANCE_QUOTA,
            schema: DEFAULT_SCHEMA_QUOTA,
            tag: DEFAULT_TAG_QUOTA,
            rule: DEFAULT_RULE_QUOTA,
        }
    }
}

impl QuotaLimits {
    /// Limit for `kind`, `None` for kinds that carry no quota
    pub fn limit(&self, kind: ResourceKind) -> Option<i64> {
        match kind {
            ResourceKind::ServiceIndex => Some(self.service),
            ResourceKind::Instance => Some(self.instance),
            ResourceKind::Schema => Some(self.schema),
            ResourceKind::Tag => Some(self.tag),
            ResourceKind::Rule => Some(self.rule),
            ResourceKind::ServiceRecord => None,
        }
    }
}

/// Usage of one tenant for one kind, with the headroom left
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub kind: ResourceKind,
    pub tenant: String,
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
}

#[derive(Clone)]
pub struct QuotaChecker {
    counter: Arc<BuildinCounter>,
    limits: QuotaLimits,
}

impl QuotaChecker {
    pub fn new(counter: Arc<BuildinCounter>, limits: QuotaLimits) -> Self {
        Self { counter, limits }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    pub fn used(&self, kind: ResourceKind, tenant: &str) -> i64 {
        self.counter.get(kind, tenant)
    }

    /// Headroom left for `tenant`, never negative; `None` when `kind` has no quota
    pub fn remaining(&self, kind: ResourceKind, tenant: &str) -> Option<i64> {
        let limit = self.limits.limit(kind)?;
        Some((limit - self.used(kind, tenant)).max(0))
    }

    /// Usage of every counted `(kind, tenant)`, sorted like the counter snapshot
    pub fn usage(&self) -> Vec<QuotaUsage> {
        self.counter
            .snapshot()
            .into_iter()
            .filter_map(|entry| {
                let limit = self.limits.limit(entry.kind)?;
                Some(QuotaUsage {
                    kind: entry.kind,
                    remaining: (limit - entry.count).max(0),
                    used: entry.count,
                    tenant: entry.tenant,
                    limit,
                })
            })
            .collect()
    }

    /// Check that `requested` more resources fit in the tenant's quota
    pub fn apply(&self, kind: ResourceKind, tenant: &str, requested: i64) -> Result<()> {
        if requested <= 0 {
            return Err(CassavaError::IllegalArgument(format!(
                "requested {} quota must be positive, got {}",
                kind, requested
            )));
        }

        let Some(limit) = self.limits.limit(kind) else {
            return Err(CassavaError::IllegalArgument(format!(
                "{} carries no quota",
                kind
            )));
        };
        let used = self.used(kind, tenant);
        if used + requested > limit {
            warn!(%kind, tenant, used, requested, limit, "Quota exceeded");
            return Err(CassavaError::QuotaExceeded {
                kind: kind.to_string(),
                tenant: tenant.to_string(),
                used,
                requested,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::Counter;

    fn checker(instance_limit: i64) -> (Arc<BuildinCounter>, QuotaChecker) {
        let counter = Arc::new(BuildinCounter::new());
        let limits = QuotaLimits {
            instance: instance_limit,
            ..Default::default()
        };
        (counter.clone(), QuotaChecker::new(counter, limits))
    }

    #[test]
    fn test_default_limits() {
        let limits = QuotaLimits::default();
        assert_eq!(limits.limit(ResourceKind::ServiceIndex), Some(50000));
        assert_eq!(limits.limit(ResourceKind::Instance), Some(150000));
        assert_eq!(limits.limit(ResourceKind::Schema), Some(100));
        assert_eq!(limits.limit(ResourceKind::ServiceRecord), None);
    }

    #[test]
    fn test_apply_within_limit() {
        let (counter, checker) = checker(3);
        counter.on_create(ResourceKind::Instance, "t1/p1");
        assert!(checker.apply(ResourceKind::Instance, "t1/p1", 2).is_ok());
        assert_eq!(checker.remaining(ResourceKind::Instance, "t1/p1"), Some(2));
    }

    #[test]
    fn test_apply_over_limit() {
        let (counter, checker) = checker(2);
        counter.on_create(ResourceKind::Instance, "t1/p1");
        counter.on_create(ResourceKind::Instance, "t1/p1");

        let err = checker
            .apply(ResourceKind::Instance, "t1/p1", 1)
            .unwrap_err();
        assert_eq!(
            err,
            CassavaError::QuotaExceeded {
                kind: "INSTANCE".to_string(),
                tenant: "t1/p1".to_string(),
                used: 2,
                requested: 1,
                limit: 2,
            }
        );
        assert_eq!(checker.remaining(ResourceKind::Instance, "t1/p1"), Some(0));
        // other tenants are unaffected
        assert!(checker.apply(ResourceKind::Instance, "t2/p1", 2).is_ok());
    }

    #[test]
    fn test_apply_rejects_non_positive() {
        let (_, checker) = checker(2);
        assert!(matches!(
            checker.apply(ResourceKind::Instance, "t1/p1", 0),
            Err(CassavaError::IllegalArgument(_))
        ));
        assert!(matches!(
            checker.apply(ResourceKind::ServiceRecord, "t1/p1", 1),
            Err(CassavaError::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_usage_reports_remaining() {
        let (counter, checker) = checker(5);
        counter.on_create(ResourceKind::Instance, "t1/p1");
        counter.on_create(ResourceKind::Instance, "t1/p1");
        counter.on_create(ResourceKind::ServiceIndex, "t2/p1");

        assert_eq!(
            checker.usage(),
            vec![
                QuotaUsage {
                    kind: ResourceKind::ServiceIndex,
                    tenant: "t2/p1".to_string(),
                    used: 1,
                    limit: 50000,
                    remaining: 49999,
                },
                QuotaUsage {
                    kind: ResourceKind::Instance,
                    tenant: "t1/p1".to_string(),
                    used: 2,
                    limit: 5,
                    remaining: 3,
                },
            ]
        );
    }
}
