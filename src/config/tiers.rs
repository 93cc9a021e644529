use serde::{Deserialize, Serialize};

/// Requests-per-60s-window limit for one tier.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TierLimits {
    pub limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TiersConfig {
    pub free: TierLimits,
    pub pro: TierLimits,
    pub enterprise: TierLimits,
    pub research: TierLimits,
    pub admin: TierLimits,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            free: TierLimits { limit_per_minute: 10 },
            pro: TierLimits { limit_per_minute: 60 },
            enterprise: TierLimits { limit_per_minute: 600 },
            research: TierLimits { limit_per_minute: 120 },
            admin: TierLimits { limit_per_minute: u32::MAX },
        }
    }
}

impl TiersConfig {
    pub fn limit_for(&self, tier: crate::auth::Tier) -> u32 {
        use crate::auth::Tier;
        match tier {
            Tier::Free => self.free.limit_per_minute,
            Tier::Pro => self.pro.limit_per_minute,
            Tier::Enterprise => self.enterprise.limit_per_minute,
            Tier::Research => self.research.limit_per_minute,
            Tier::Admin => self.admin.limit_per_minute,
        }
    }
}
