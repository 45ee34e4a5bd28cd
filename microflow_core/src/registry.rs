//! Owner of every simulated device, keyed by id.
use microflow_hardware::{Atomizer, AtomizerStatus, Pump, PumpStatus, SimContext};
use microflow_traits::{DeviceState, EventLevel};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const SOURCE: &str = "registry";

/// Status of every registered device at one moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub pumps: BTreeMap<String, PumpStatus>,
    pub atomizers: BTreeMap<String, AtomizerStatus>,
    /// Milliseconds since the Unix epoch at capture time.
    pub timestamp_ms: u64,
}

pub struct DeviceRegistry {
    ctx: SimContext,
    pumps: RwLock<BTreeMap<String, Arc<Pump>>>,
    atomizers: RwLock<BTreeMap<String, Arc<Atomizer>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceRegistry {
    pub fn new(ctx: SimContext) -> Self {
        Self {
            ctx,
            pumps: RwLock::new(BTreeMap::new()),
            atomizers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Context every device registered here is built with.
    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Register a pump. A pump already registered under `id` is replaced and,
    /// if it was running, stopped.
    pub fn add_pump(&self, id: &str, initial_volume: f64) -> Arc<Pump> {
        let pump = Arc::new(Pump::new(id, initial_volume, &self.ctx));
        let displaced = write(&self.pumps).insert(id.to_string(), Arc::clone(&pump));
        if let Some(old) = displaced {
            self.ctx.log.record(
                EventLevel::Warn,
                SOURCE,
                &format!("pump {id} replaced by a new registration"),
            );
            if old.state() == DeviceState::On {
                let _ = old.stop();
            }
        }
        self.ctx.log.record(
            EventLevel::Info,
            SOURCE,
            &format!("added pump {id} with {initial_volume}ml"),
        );
        pump
    }

    /// Register an atomizer, replacing (and stopping) any previous one with the same id.
    pub fn add_atomizer(&self, id: &str) -> Arc<Atomizer> {
        let atomizer = Arc::new(Atomizer::new(id, &self.ctx));
        let displaced = write(&self.atomizers).insert(id.to_string(), Arc::clone(&atomizer));
        if let Some(old) = displaced {
            self.ctx.log.record(
                EventLevel::Warn,
                SOURCE,
                &format!("atomizer {id} replaced by a new registration"),
            );
            if old.state() == DeviceState::On {
                let _ = old.stop();
            }
        }
        self.ctx
            .log
            .record(EventLevel::Info, SOURCE, &format!("added atomizer {id}"));
        atomizer
    }

    pub fn pump(&self, id: &str) -> Option<Arc<Pump>> {
        read(&self.pumps).get(id).cloned()
    }

    pub fn atomizer(&self, id: &str) -> Option<Arc<Atomizer>> {
        read(&self.atomizers).get(id).cloned()
    }

    pub fn pump_ids(&self) -> Vec<String> {
        read(&self.pumps).keys().cloned().collect()
    }

    pub fn atomizer_ids(&self) -> Vec<String> {
        read(&self.atomizers).keys().cloned().collect()
    }

    fn pumps(&self) -> Vec<Arc<Pump>> {
        read(&self.pumps).values().cloned().collect()
    }

    fn atomizers(&self) -> Vec<Arc<Atomizer>> {
        read(&self.atomizers).values().cloned().collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        RegistrySnapshot {
            pumps: self
                .pumps()
                .iter()
                .map(|p| (p.id().to_string(), p.status()))
                .collect(),
            atomizers: self
                .atomizers()
                .iter()
                .map(|a| (a.id().to_string(), a.status()))
                .collect(),
            timestamp_ms,
        }
    }

    /// Stop every running device. Devices that are off or faulted are left
    /// alone; calling this again is harmless. Returns how many were stopped.
    pub fn shutdown(&self) -> usize {
        let mut stopped = 0;
        for p in self.pumps() {
            if p.state() == DeviceState::On && p.stop().is_ok() {
                stopped += 1;
            }
        }
        for a in self.atomizers() {
            if a.state() == DeviceState::On && a.stop().is_ok() {
                stopped += 1;
            }
        }
        self.ctx.log.record(
            EventLevel::Info,
            SOURCE,
            &format!("shut down ({stopped} devices stopped)"),
        );
        stopped
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("pumps", &self.pump_ids())
            .field("atomizers", &self.atomizer_ids())
            .finish()
    }
}
