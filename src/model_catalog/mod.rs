pub mod registry;

pub use registry::ModelRegistry;

use crate::config::{CONFIG, Config};
use std::sync::LazyLock;

pub static MODEL_REGISTRY: LazyLock<ModelRegistry> = LazyLock::new(|| {
    let cfg = &*CONFIG;
    let models = collect_global_model_names(cfg);
    ModelRegistry::new(&models)
});

/// The set of known model names comes from the GPU pool's static
/// per-model-memory table (§4.5) — a model only makes sense to advertise if
/// the gateway knows how much device memory it needs.
fn collect_global_model_names(cfg: &Config) -> Vec<String> {
    cfg.gpu_pool.model_memory.keys().cloned().collect()
}
