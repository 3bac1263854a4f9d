use sysinfo::{ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

pub trait HeapIntrospection: Send + Sync {
    fn heap_usage(&self) -> Option<HeapUsage>;
}

/// Memory figures of the current process: resident memory as used, the
/// virtual address space as total.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl HeapIntrospection for ProcessMemory {
    fn heap_usage(&self) -> Option<HeapUsage> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }
        let pid = sysinfo::get_current_pid().ok()?;

        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = sys.process(pid)?;

        Some(HeapUsage {
            used_bytes: process.memory(),
            total_bytes: process.virtual_memory(),
        })
    }
}

pub fn format_memory_usage(usage: Option<HeapUsage>) -> String {
    match usage {
        Some(usage) => format!(
            "RAM Usage: {:.2} MB / {:.2} MB",
            usage.used_bytes as f64 / BYTES_PER_MB,
            usage.total_bytes as f64 / BYTES_PER_MB
        ),
        None => "RAM Usage: Not supported".to_string(),
    }
}
