use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Resources of the machine generating the load, kept alongside the results
/// so runs on different hosts can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub cpu_cores: u64,
    pub total_memory: u64,
    pub available_memory: u64,
}

pub fn get_hardware_info() -> HostInfo {
    let mut sys = System::new_all();
    sys.refresh_all();

    HostInfo {
        cpu_cores: sys.cpus().len() as u64,
        total_memory: sys.total_memory(),
        available_memory: sys.available_memory(),
    }
}
