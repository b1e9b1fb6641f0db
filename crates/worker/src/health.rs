//! Host-health sampler for adaptive-mode pause/resume (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio::sync::RwLock;

/// A single RAM/swap/CPU reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthReading {
    pub ram_pct: f32,
    pub swap_pct: f32,
    pub cpu_pct: f32,
}

impl HealthReading {
    pub fn exceeds(&self, ram_threshold: f32, swap_threshold: f32, cpu_threshold: f32) -> bool {
        self.ram_pct > ram_threshold || self.swap_pct > swap_threshold || self.cpu_pct > cpu_threshold
    }
}

/// Samples host health every 5 s and publishes the latest reading through a
/// shared cell, the way a dedicated scheduler job owns its own tick loop
/// instead of being polled inline by request handlers.
pub struct HealthSampler {
    system: System,
    reading: Arc<RwLock<HealthReading>>,
}

impl HealthSampler {
    /// Build a sampler plus the shared cell callers read from.
    pub fn new() -> (Self, Arc<RwLock<HealthReading>>) {
        let reading = Arc::new(RwLock::new(HealthReading::default()));
        (
            Self {
                system: System::new_all(),
                reading: reading.clone(),
            },
            reading,
        )
    }

    /// Runs forever, sampling on a 5 s tick. Intended to be spawned as its
    /// own background task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            self.system.refresh_memory();
            self.system.refresh_cpu_usage();

            let total_mem = self.system.total_memory().max(1);
            let ram_pct = self.system.used_memory() as f32 / total_mem as f32 * 100.0;

            let total_swap = self.system.total_swap();
            let swap_pct = if total_swap == 0 {
                0.0
            } else {
                self.system.used_swap() as f32 / total_swap as f32 * 100.0
            };

            let cpu_pct = self.system.global_cpu_usage();

            tracing::debug!(ram_pct, swap_pct, cpu_pct, "host health sample");
            *self.reading.write().await = HealthReading { ram_pct, swap_pct, cpu_pct };
        }
    }
}
