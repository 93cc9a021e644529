use crate::gpu::Gib;
use serde::{Deserialize, Serialize};

/// GPU inventory descriptor, e.g. `[{id = "gpu0", total_memory = 24}]` in `config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpuDeviceConfig {
    pub id: String,
    pub total_memory: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GpuPoolConfig {
    #[serde(default)]
    pub devices: Vec<GpuDeviceConfig>,

    /// Static `model -> required GiB` table. Unknown models default to 8 GiB (§4.5).
    #[serde(default = "default_model_memory")]
    pub model_memory: std::collections::BTreeMap<String, u64>,

    /// Whether a device already serving a model may accept another lease of the same
    /// model instead of requiring a fully idle device.
    #[serde(default = "default_true")]
    pub allow_model_sharing: bool,
}

fn default_true() -> bool {
    true
}

fn default_model_memory() -> std::collections::BTreeMap<String, u64> {
    let mut m = std::collections::BTreeMap::new();
    m.insert("gpt-4".to_string(), 16);
    m.insert("gpt-4o-mini".to_string(), 8);
    m.insert("deepseek-chat".to_string(), 8);
    m
}

pub const DEFAULT_REQUIRED_MEMORY_GIB: u64 = 8;

impl GpuPoolConfig {
    pub fn required_memory(&self, model: &str) -> Gib {
        Gib(
            self.model_memory
                .get(model)
                .copied()
                .unwrap_or(DEFAULT_REQUIRED_MEMORY_GIB),
        )
    }
}
