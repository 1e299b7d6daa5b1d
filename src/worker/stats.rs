use sysinfo::{Disks, System};

use super::types::SystemStats;

/// Samples host usage. `sysinfo` must have been refreshed by the caller.
pub fn get_stats(sysinfo: &System, task_count: u64) -> SystemStats {
    let disks = Disks::new_with_refreshed_list();
    let total_disk: u64 = disks.iter().map(|disk| disk.total_space()).sum();
    let used_disk: u64 = disks
        .iter()
        .map(|disk| disk.total_space().saturating_sub(disk.available_space()))
        .sum();

    SystemStats {
        cpu_usage: (sysinfo.global_cpu_usage() * 100.0).round() / 100.0,
        total_cpus: sysinfo.cpus().len() as u64,
        total_memory: sysinfo.total_memory(),
        used_memory: sysinfo.used_memory(),
        total_swap: sysinfo.total_swap(),
        used_swap: sysinfo.used_swap(),
        total_disk,
        used_disk,
        system_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
        hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        task_count,
    }
}
