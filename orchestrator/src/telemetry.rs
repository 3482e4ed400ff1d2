//! Host resource sampling

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// Free capacity on the orchestrating host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headroom {
    /// Free disk space across all mounted disks (0-100)
    pub free_disk_percent: f64,

    /// Available memory (0-100)
    pub free_memory_percent: f64,

    pub disk_total: u64,
    pub memory_total: u64,
    pub hostname: String,
}

/// Sample disk and memory headroom
pub fn collect_headroom() -> Headroom {
    let mut sys = System::new();
    sys.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let (disk_available, disk_total) = disks.iter().fold((0u64, 0u64), |(free, total), disk| {
        (free + disk.available_space(), total + disk.total_space())
    });

    let memory_total = sys.total_memory();

    Headroom {
        free_disk_percent: percent(disk_available, disk_total),
        free_memory_percent: percent(sys.available_memory(), memory_total),
        disk_total,
        memory_total,
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        // nothing to measure, do not block on it
        100.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
