//! Zone authorization: the grant relation is the sole source of truth.

use crate::error::InfraError;
use crate::traits::GrantStore;
use crate::types::{SubjectId, ZoneCode};

/// Decide whether a subject may enter a zone.
///
/// True iff an active grant row exists for the pair. There is no implicit
/// default-allow: a subject with zero grants is denied everywhere, however
/// confidently the matcher identified them. Deliberately independent of any
/// biometric input so the rule is testable on its own.
pub async fn authorize(
    grants: &dyn GrantStore,
    subject: SubjectId,
    zone: ZoneCode,
) -> Result<bool, InfraError> {
    let allowed = grants.is_granted(subject, zone).await?;
    if !allowed {
        tracing::debug!(subject, zone, "no active grant for zone");
    }
    Ok(allowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Grant fake: (subject, zone) -> active flag. Pairs absent from the
    /// map have no row at all.
    struct MemoryGrants {
        rows: HashMap<(SubjectId, ZoneCode), bool>,
    }

    #[async_trait]
    impl GrantStore for MemoryGrants {
        async fn is_granted(
            &self,
            subject: SubjectId,
            zone: ZoneCode,
        ) -> Result<bool, InfraError> {
            Ok(self.rows.get(&(subject, zone)).copied().unwrap_or(false))
        }
    }

    #[tokio::test]
    async fn test_active_grant_allows() {
        let grants = MemoryGrants {
            rows: HashMap::from([((42, 3), true)]),
        };
        assert!(authorize(&grants, 42, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_row_denies() {
        let grants = MemoryGrants {
            rows: HashMap::new(),
        };
        assert!(!authorize(&grants, 42, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_row_denies() {
        let grants = MemoryGrants {
            rows: HashMap::from([((42, 3), false)]),
        };
        assert!(!authorize(&grants, 42, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_is_zone_scoped() {
        let grants = MemoryGrants {
            rows: HashMap::from([((42, 3), true)]),
        };
        assert!(!authorize(&grants, 42, 4).await.unwrap());
        assert!(!authorize(&grants, 7, 3).await.unwrap());
    }
}
