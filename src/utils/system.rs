// src/utils/system.rs: System functions

use log::debug;
use sysinfo::System;


/// Determines how many samples may run at once.
///
/// # Arguments
///
/// * `requested` - Explicit worker count from the command line, if any.
///
/// # Returns
///
/// The requested count when positive, otherwise the number of physical cores
/// (at least 1).
pub fn detect_concurrency(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n,
        _ => {
            let physical_cores = System::physical_core_count().unwrap_or(1).max(1);
            debug!("Detected {} physical cores", physical_cores);
            physical_cores
        }
    }
}
