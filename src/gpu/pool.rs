//! Pure GPU device-allocation logic (§4.5): no IO, no async, safe to hold
//! behind a single mutex as the scheduler's per-device critical section.

use super::Gib;
use std::collections::{BTreeMap, HashMap};

pub type LeaseId = u64;

#[derive(Debug, Clone)]
struct Device {
    id: String,
    total_memory: Gib,
    used_memory: Gib,
    current_model: Option<String>,
    leases: HashMap<LeaseId, Gib>,
}

/// A device's commitment of memory to one running job. Released on every
/// terminal path, including a caught worker panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub id: LeaseId,
    pub device_id: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub id: String,
    pub total_memory: Gib,
    pub used_memory: Gib,
    pub current_model: Option<String>,
    pub lease_count: usize,
}

pub const DEFAULT_REQUIRED_MEMORY_GIB: u64 = 8;

/// Device inventory and lease bookkeeping. `TryAllocate`/`Release` maintain
/// the invariant that `used_memory` always equals the sum of outstanding
/// lease memory for each device, and `used_memory <= total_memory`.
pub struct GpuPool {
    devices: Vec<Device>,
    model_memory: BTreeMap<String, u64>,
    allow_model_sharing: bool,
    next_lease_id: LeaseId,
}

impl GpuPool {
    pub fn new(
        devices: impl IntoIterator<Item = (String, Gib)>,
        model_memory: BTreeMap<String, u64>,
        allow_model_sharing: bool,
    ) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|(id, total_memory)| Device {
                    id,
                    total_memory,
                    used_memory: Gib::ZERO,
                    current_model: None,
                    leases: HashMap::new(),
                })
                .collect(),
            model_memory,
            allow_model_sharing,
            next_lease_id: 0,
        }
    }

    pub fn required_memory(&self, model: &str) -> Gib {
        Gib(self
            .model_memory
            .get(model)
            .copied()
            .unwrap_or(DEFAULT_REQUIRED_MEMORY_GIB))
    }

    /// Finds a device for `model`: one already serving it (if the backend
    /// allows sharing and there is headroom), otherwise the least-loaded idle
    /// device with enough free memory. Ties broken by lowest device id.
    pub fn try_allocate(&mut self, model: &str) -> Option<Lease> {
        let required = self.required_memory(model);

        let mut candidate: Option<usize> = None;

        if self.allow_model_sharing {
            candidate = self
                .devices
                .iter()
                .enumerate()
                .filter(|(_, d)| {
                    d.current_model.as_deref() == Some(model)
                        && d.total_memory.checked_sub(d.used_memory).unwrap_or(Gib::ZERO) >= required
                })
                .min_by(|(_, a), (_, b)| {
                    a.used_memory.cmp(&b.used_memory).then(a.id.cmp(&b.id))
                })
                .map(|(i, _)| i);
        }

        if candidate.is_none() {
            candidate = self
                .devices
                .iter()
                .enumerate()
                .filter(|(_, d)| {
                    d.current_model.is_none()
                        && d.total_memory.checked_sub(d.used_memory).unwrap_or(Gib::ZERO) >= required
                })
                .min_by(|(_, a), (_, b)| {
                    a.used_memory.cmp(&b.used_memory).then(a.id.cmp(&b.id))
                })
                .map(|(i, _)| i);
        }

        let index = candidate?;
        let device = &mut self.devices[index];

        let lease_id = self.next_lease_id;
        self.next_lease_id += 1;

        device.used_memory = device.used_memory + required;
        device.current_model = Some(model.to_string());
        device.leases.insert(lease_id, required);

        Some(Lease {
            id: lease_id,
            device_id: device.id.clone(),
            model: model.to_string(),
        })
    }

    /// Releases a lease, decrementing `used_memory` and clearing
    /// `current_model` once the device's lease count reaches zero.
    pub fn release(&mut self, lease: &Lease) {
        let Some(device) = self.devices.iter_mut().find(|d| d.id == lease.device_id) else {
            return;
        };
        let Some(amount) = device.leases.remove(&lease.id) else {
            return;
        };
        device.used_memory = device.used_memory.checked_sub(amount).unwrap_or(Gib::ZERO);
        if device.leases.is_empty() {
            device.current_model = None;
        }
    }

    pub fn snapshot(&self) -> Vec<DeviceState> {
        self.devices
            .iter()
            .map(|d| DeviceState {
                id: d.id.clone(),
                total_memory: d.total_memory,
                used_memory: d.used_memory,
                current_model: d.current_model.clone(),
                lease_count: d.leases.len(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(devices: &[(&str, u64)], model_memory: &[(&str, u64)], sharing: bool) -> GpuPool {
        GpuPool::new(
            devices.iter().map(|(id, mem)| (id.to_string(), Gib(*mem))),
            model_memory
                .iter()
                .map(|(m, mem)| (m.to_string(), *mem))
                .collect(),
            sharing,
        )
    }

    #[test]
    fn allocates_least_loaded_idle_device() {
        let mut p = pool(&[("a", 16), ("b", 16)], &[("gpt-4", 8)], false);
        let lease_a = p.try_allocate("gpt-4").unwrap();
        assert_eq!(lease_a.device_id, "a");
        let lease_b = p.try_allocate("gpt-4").unwrap();
        assert_eq!(lease_b.device_id, "b");
    }

    #[test]
    fn refuses_oversubscription() {
        let mut p = pool(&[("a", 8)], &[("gpt-4", 16)], false);
        assert!(p.try_allocate("gpt-4").is_none());
    }

    #[test]
    fn sharing_stacks_leases_on_same_device() {
        let mut p = pool(&[("a", 16)], &[("gpt-4", 4)], true);
        let l1 = p.try_allocate("gpt-4").unwrap();
        let l2 = p.try_allocate("gpt-4").unwrap();
        assert_eq!(l1.device_id, l2.device_id);
        let snap = p.snapshot();
        assert_eq!(snap[0].used_memory, Gib(8));
        assert_eq!(snap[0].lease_count, 2);
    }

    #[test]
    fn release_clears_current_model_at_zero_leases() {
        let mut p = pool(&[("a", 16)], &[("gpt-4", 8)], false);
        let lease = p.try_allocate("gpt-4").unwrap();
        p.release(&lease);
        let snap = p.snapshot();
        assert_eq!(snap[0].used_memory, Gib(0));
        assert!(snap[0].current_model.is_none());
    }

    #[test]
    fn unknown_model_defaults_to_eight_gib() {
        let p = pool(&[("a", 16)], &[], false);
        assert_eq!(p.required_memory("mystery-model"), Gib(8));
    }
}
