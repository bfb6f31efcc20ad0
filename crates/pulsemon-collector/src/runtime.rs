use crate::{Collector, MetricsCollection};
use anyhow::Result;
use rand::Rng;
use std::sync::Mutex;
use sysinfo::System;

/// Counter incremented by one on every [`RuntimeCollector::collect`] call.
pub const POLL_COUNT: &str = "PollCount";
/// Gauge carrying a fresh random number on every poll.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Samples host memory, swap, CPU and load through `sysinfo`.
///
/// The `System` handle lives behind a mutex, so overlapping calls are
/// serialised and `PollCount` grows by exactly one per call.
pub struct RuntimeCollector {
    system: Mutex<System>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&self, collection: &MetricsCollection) -> Result<()> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow::anyhow!("runtime collector lock poisoned"))?;
        system.refresh_memory();
        system.refresh_cpu_usage();

        collection.set_gauge("TotalMemory", system.total_memory() as f64);
        collection.set_gauge("UsedMemory", system.used_memory() as f64);
        collection.set_gauge("FreeMemory", system.free_memory() as f64);
        collection.set_gauge("AvailableMemory", system.available_memory() as f64);
        collection.set_gauge("TotalSwap", system.total_swap() as f64);
        collection.set_gauge("UsedSwap", system.used_swap() as f64);

        collection.set_gauge("CPUutilization", system.global_cpu_usage() as f64);
        for (i, cpu) in system.cpus().iter().enumerate() {
            collection.set_gauge(format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64);
        }

        let load = System::load_average();
        collection.set_gauge("LoadAverage1", load.one);
        collection.set_gauge("LoadAverage5", load.five);
        collection.set_gauge("LoadAverage15", load.fifteen);

        collection.set_gauge(RANDOM_VALUE, rand::thread_rng().gen::<f64>());
        collection.add_counter(POLL_COUNT, 1);

        tracing::debug!(
            cpus = system.cpus().len(),
            pending = collection.len(),
            "Runtime metrics sampled"
        );
        Ok(())
    }
}
