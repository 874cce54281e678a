//! Host CPU and memory readings for transfer sampling.
//!
//! Thin wrapper over `sysinfo` so the connection handler can take paired
//! CPU%/RAM% readings without touching the library types directly. Each
//! handler owns its own sampler; refreshes are scoped to what the two
//! figures need rather than a full system scan.

use sysinfo::System;

pub struct ResourceSampler {
    sys: System,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        // Prime the CPU counters; usage is a delta between refreshes, so
        // the first reading after this may legitimately be 0.
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self { sys }
    }

    /// CPU utilisation averaged across all cores, percent.
    pub fn cpu_percent(&mut self) -> f64 {
        self.sys.refresh_cpu_usage();
        f64::from(self.sys.global_cpu_usage())
    }

    /// Used physical memory as a percentage of total.
    pub fn ram_percent(&mut self) -> f64 {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return 0.0;
        }
        self.sys.used_memory() as f64 / total as f64 * 100.0
    }

    /// Paired (cpu%, ram%) reading.
    pub fn sample(&mut self) -> (f64, f64) {
        (self.cpu_percent(), self.ram_percent())
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
