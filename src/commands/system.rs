//! Host and process resource snapshot for the `system` command.

use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// CPU usage is measured over this window.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Resource usage at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    /// Resident memory of this process, if it could be read.
    pub process_memory: Option<u64>,
}

impl SystemSnapshot {
    /// Samples CPU over one second, then reads memory figures.
    pub async fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        tokio::time::sleep(CPU_SAMPLE_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let process_memory = sysinfo::get_current_pid().ok().and_then(|pid| {
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            sys.process(pid).map(sysinfo::Process::memory)
        });

        Self {
            cpu_percent: sys.global_cpu_usage(),
            memory_used: sys.used_memory(),
            memory_total: sys.total_memory(),
            process_memory,
        }
    }

    /// Memory in use as a percentage of the total.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_total as f64 * 100.0
        }
    }

    /// `"42.0% (3.2/7.8 GB)"`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn memory_line(&self) -> String {
        format!(
            "{:.1}% ({:.1}/{:.1} GB)",
            self.memory_percent(),
            self.memory_used as f64 / BYTES_PER_GB,
            self.memory_total as f64 / BYTES_PER_GB
        )
    }

    /// `"123.4 MB"`, or `"unknown"`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn process_memory_line(&self) -> String {
        self.process_memory.map_or_else(
            || "unknown".to_owned(),
            |bytes| format!("{:.1} MB", bytes as f64 / BYTES_PER_MB),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_lines() {
        let snapshot = SystemSnapshot {
            cpu_percent: 12.5,
            memory_used: 2 * 1024 * 1024 * 1024,
            memory_total: 8 * 1024 * 1024 * 1024,
            process_memory: Some(50 * 1024 * 1024),
        };
        assert_eq!(snapshot.memory_line(), "25.0% (2.0/8.0 GB)");
        assert_eq!(snapshot.process_memory_line(), "50.0 MB");
    }

    #[test]
    fn test_zero_total_memory() {
        let snapshot = SystemSnapshot {
            cpu_percent: 0.0,
            memory_used: 0,
            memory_total: 0,
            process_memory: None,
        };
        assert!(snapshot.memory_percent().abs() < f64::EPSILON);
        assert_eq!(snapshot.process_memory_line(), "unknown");
    }

    #[tokio::test]
    async fn test_collect_reads_memory() {
        let snapshot = SystemSnapshot::collect().await;
        assert!(snapshot.memory_total > 0);
        assert!(snapshot.memory_used <= snapshot.memory_total);
    }
}
