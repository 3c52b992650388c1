//! Telemetry and metrics collection

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// System metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// CPU usage percentage (0-100)
    pub cpu_usage: f32,

    /// Memory usage in bytes
    pub memory_used: u64,

    /// Total memory in bytes
    pub memory_total: u64,

    /// Memory usage percentage
    pub memory_percent: f32,

    /// System uptime in seconds
    pub uptime_secs: u64,

    /// Number of CPU cores
    pub cpu_count: usize,

    /// Hostname
    pub hostname: String,
}

/// Collect system metrics
pub fn collect_metrics() -> SystemMetrics {
    let mut sys = System::new_all();
    sys.refresh_all();

    let memory_used = sys.used_memory();
    let memory_total = sys.total_memory();

    SystemMetrics {
        cpu_usage: sys.global_cpu_usage(),
        memory_used,
        memory_total,
        memory_percent: if memory_total > 0 {
            (memory_used as f32 / memory_total as f32) * 100.0
        } else {
            0.0
        },
        uptime_secs: System::uptime(),
        cpu_count: sys.cpus().len(),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
    }
}
