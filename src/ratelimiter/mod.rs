//! `RateLimiter` (§4.2): a fixed-window counter over `KVStore`'s atomic
//! increment-with-TTL primitive. Tier-derived limit; a principal carrying
//! `api.rate_limit_bypass` skips the check entirely.

use crate::auth::{Permission, Principal, RoleTable};
use crate::config::TiersConfig;
use crate::kvstore::{KVStore, KvError};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_unix: i64,
}

pub struct RateLimiter {
    kv: Arc<dyn KVStore>,
    roles: Arc<RoleTable>,
    tiers: TiersConfig,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KVStore>, roles: Arc<RoleTable>, tiers: TiersConfig) -> Self {
        Self { kv, roles, tiers }
    }

    /// Checks and consumes one request out of the principal's current
    /// 60-second window. Fails *closed* on a `KVStore` error: the inference
    /// path is billable, so an unreadable counter must never be treated as
    /// "allow" (Open Question c — the opposite of a blanket `except: return
    /// True`).
    pub async fn allow(&self, principal: &Principal) -> Result<Decision, KvError> {
        let limit = self.tiers.limit_for(principal.tier);
        let reset_at_unix = window_end_unix();

        if self.roles.authorize(&principal.roles, Permission::ApiRateLimitBypass) {
            return Ok(Decision {
                allowed: true,
                limit,
                remaining: limit,
                reset_at_unix,
            });
        }

        let key = format!("ratelimit:{}:{}", principal.id, window_start_unix());
        let count = self.kv.incr_with_ttl(&key, WINDOW).await?;

        let allowed = count <= u64::from(limit);
        let remaining = limit.saturating_sub(u32::try_from(count).unwrap_or(limit));

        Ok(Decision {
            allowed,
            limit,
            remaining,
            reset_at_unix,
        })
    }
}

fn window_start_unix() -> i64 {
    let now = chrono::Utc::now().timestamp();
    now - (now % WINDOW.as_secs() as i64)
}

fn window_end_unix() -> i64 {
    window_start_unix() + WINDOW.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, Tier};
    use crate::config::TierLimits;
    use crate::kvstore::MemoryKvStore;
    use std::collections::HashSet;

    fn principal(tier: Tier, roles: Vec<String>) -> Principal {
        Principal {
            id: 1,
            contact: "a@example.com".into(),
            tier,
            status: crate::auth::Status::Active,
            password_hash: String::new(),
            roles,
        }
    }

    fn limiter() -> RateLimiter {
        let mut tiers = TiersConfig::default();
        tiers.free = TierLimits { limit_per_minute: 2 };
        let roles = RoleTable::new(vec![Role {
            name: "bypass".into(),
            description: String::new(),
            permissions: HashSet::from([Permission::ApiRateLimitBypass]),
            inherits: vec![],
        }])
        .unwrap();
        RateLimiter::new(Arc::new(MemoryKvStore::default()), Arc::new(roles), tiers)
    }

    #[tokio::test]
    async fn blocks_after_tier_limit() {
        let limiter = limiter();
        let p = principal(Tier::Free, vec![]);
        assert!(limiter.allow(&p).await.unwrap().allowed);
        assert!(limiter.allow(&p).await.unwrap().allowed);
        assert!(!limiter.allow(&p).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn bypass_role_skips_the_counter() {
        let limiter = limiter();
        let p = principal(Tier::Free, vec!["bypass".to_string()]);
        for _ in 0..10 {
            assert!(limiter.allow(&p).await.unwrap().allowed);
        }
    }
}
