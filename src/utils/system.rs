// src/utils/system.rs: System functions

use sysinfo::System;


/// Number of physical cores on this machine, falling back to logical cores and then 1.
pub fn detect_cores() -> usize {
    System::physical_core_count()
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}


/// Caps a requested process count at the available cores.
///
/// # Arguments
///
/// * `requested` - Process count from the command line, if any.
/// * `available` - Cores detected on the host.
///
/// # Returns
///
/// (process count to pass on, whether it was capped). Zero counts as unset.
pub fn cap_processes(requested: Option<usize>, available: usize) -> (Option<usize>, bool) {
    match requested {
        None | Some(0) => (None, false),
        Some(n) if n > available => (Some(available.max(1)), true),
        Some(n) => (Some(n), false),
    }
}
