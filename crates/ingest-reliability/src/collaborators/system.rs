//! Host-backed health signals

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::System;

use super::{ResourceHealth, ResourceMonitor, ServiceHealth, ServiceHealthMonitor};
use crate::error::CollaboratorError;

/// Memory and CPU usage of the whole host, sampled with `sysinfo`
///
/// CPU usage is computed between consecutive refreshes, so the first reading
/// after construction may be low.
pub struct SystemResourceMonitor {
    system: Mutex<System>,
    memory_limit_percent: f64,
    cpu_limit_percent: f64,
}

impl SystemResourceMonitor {
    /// Create a monitor reporting unhealthy at 90% memory or CPU
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();

        Self {
            system: Mutex::new(system),
            memory_limit_percent: 90.0,
            cpu_limit_percent: 90.0,
        }
    }

    /// Set the usage levels above which the host is reported unhealthy
    pub fn with_limits(mut self, memory_percent: f64, cpu_percent: f64) -> Self {
        self.memory_limit_percent = memory_percent;
        self.cpu_limit_percent = cpu_percent;
        self
    }

    fn sample(&self) -> Result<ResourceHealth, CollaboratorError> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();

        let total = system.total_memory();
        if total == 0 {
            return Err(CollaboratorError::Unavailable(
                "total memory reported as zero".into(),
            ));
        }

        let memory_usage_percent = system.used_memory() as f64 / total as f64 * 100.0;
        let cpu_usage_percent = system.global_cpu_usage() as f64;

        Ok(ResourceHealth {
            memory_usage_percent,
            cpu_usage_percent,
            healthy: memory_usage_percent < self.memory_limit_percent
                && cpu_usage_percent < self.cpu_limit_percent,
        })
    }
}

impl Default for SystemResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceMonitor for SystemResourceMonitor {
    async fn resource_health(&self) -> Result<ResourceHealth, CollaboratorError> {
        self.sample()
    }
}

/// Service health signal that always reports the same value
///
/// For hosts without an aggregate health monitor.
#[derive(Debug, Clone)]
pub struct StaticServiceHealth {
    health: ServiceHealth,
}

impl StaticServiceHealth {
    pub fn new(overall_health: impl Into<String>) -> Self {
        Self {
            health: ServiceHealth {
                overall_health: overall_health.into(),
            },
        }
    }

    pub fn healthy() -> Self {
        Self {
            health: ServiceHealth::healthy(),
        }
    }
}

#[async_trait]
impl ServiceHealthMonitor for StaticServiceHealth {
    async fn overall_health(&self) -> Result<ServiceHealth, CollaboratorError> {
        Ok(self.health.clone())
    }
}
