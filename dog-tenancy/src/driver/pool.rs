use std::sync::Arc;

use dashmap::DashMap;

use crate::driver::StoreDriver;
use crate::types::PhysicalTarget;
use crate::{TenancyError, TenancyResult};

/// Physical target → store driver.
#[derive(Default)]
pub struct TargetPool {
    drivers: DashMap<PhysicalTarget, Arc<dyn StoreDriver>>,
}

impl TargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, target: PhysicalTarget, driver: Arc<dyn StoreDriver>) {
        self.drivers.insert(target, driver);
    }

    /// Register `make()` under `target` unless a driver is already there.
    pub fn register_if_absent<F>(&self, target: PhysicalTarget, make: F) -> Arc<dyn StoreDriver>
    where
        F: FnOnce() -> Arc<dyn StoreDriver>,
    {
        self.drivers.entry(target).or_insert_with(make).value().clone()
    }

    /// Driver for `target`; an unknown target is unreachable.
    pub fn driver(&self, target: &PhysicalTarget) -> TenancyResult<Arc<dyn StoreDriver>> {
        self.drivers
            .get(target)
            .map(|d| d.value().clone())
            .ok_or_else(|| TenancyError::TargetUnavailable(format!("no driver for {target}")))
    }

    pub fn remove(&self, target: &PhysicalTarget) -> Option<Arc<dyn StoreDriver>> {
        self.drivers.remove(target).map(|(_, driver)| driver)
    }

    pub fn contains(&self, target: &PhysicalTarget) -> bool {
        self.drivers.contains_key(target)
    }

    pub fn targets(&self) -> Vec<PhysicalTarget> {
        let mut all: Vec<_> = self.drivers.iter().map(|e| e.key().clone()).collect();
        all.sort();
        all
    }
}
