//! Host CPU reads the Rate Scheduler ticks against.

use parking_lot::Mutex;
use sysinfo::System;

/// Abstracts "read host CPU percent" so the scheduler can be ticked with a
/// stub in tests without touching `/proc`.
pub trait CpuReader: Send + Sync {
    fn read_cpu_percent(&self) -> f32;
}

/// Real reader backed by `sysinfo`, matching the host-metrics approach
/// already used for VPS telemetry.
pub struct SysinfoCpuReader {
    system: Mutex<System>,
}

impl SysinfoCpuReader {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system: Mutex::new(system) }
    }
}

impl Default for SysinfoCpuReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuReader for SysinfoCpuReader {
    fn read_cpu_percent(&self) -> f32 {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.global_cpu_usage()
    }
}
