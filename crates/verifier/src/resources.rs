use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryReading {
    pub fn available_gb(&self) -> f64 {
        self.available_bytes as f64 / BYTES_PER_GB
    }

    pub fn percent_used(&self) -> f64 {
        percent_used(self.total_bytes, self.available_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskReading {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl DiskReading {
    pub fn free_gb(&self) -> f64 {
        self.free_bytes as f64 / BYTES_PER_GB
    }

    pub fn percent_used(&self) -> f64 {
        percent_used(self.total_bytes, self.free_bytes)
    }
}

fn percent_used(total: u64, free: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(free) as f64 * 100.0 / total as f64
}

/// `None` when the platform reports no memory at all.
pub fn read_memory(system: &mut System) -> Option<MemoryReading> {
    system.refresh_memory();
    let total_bytes = system.total_memory();
    (total_bytes > 0).then(|| MemoryReading {
        total_bytes,
        available_bytes: system.available_memory(),
    })
}

/// The disk holding `path`: the mounted filesystem with the longest mount point that
/// is a prefix of it.
pub fn read_disk(path: &Path) -> Option<DiskReading> {
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<(PathBuf, DiskReading)> = disks
        .list()
        .iter()
        .map(|disk| {
            let reading = DiskReading {
                total_bytes: disk.total_space(),
                free_bytes: disk.available_space(),
            };
            (disk.mount_point().to_path_buf(), reading)
        })
        .collect();
    disk_for(&path, &mounts)
}

fn disk_for(path: &Path, mounts: &[(PathBuf, DiskReading)]) -> Option<DiskReading> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, reading)| *reading)
}

/// Global CPU usage. Needs two samples, so this waits for the minimum update interval.
pub async fn read_cpu(system: &mut System) -> f64 {
    system.refresh_cpu_usage();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    system.refresh_cpu_usage();
    f64::from(system.global_cpu_usage())
}

/// Memory, disk and CPU readings keyed the way the snapshot reports them. Readings the
/// platform cannot provide are left out.
pub async fn collect(disk_path: &Path) -> BTreeMap<String, f64> {
    let mut system = System::new();
    let mut readings = BTreeMap::new();
    match read_memory(&mut system) {
        Some(memory) => {
            readings.insert("memory_available_gb".to_string(), memory.available_gb());
            readings.insert("memory_percent".to_string(), memory.percent_used());
        }
        None => tracing::debug!("Memory readings unavailable"),
    }
    match read_disk(disk_path) {
        Some(disk) => {
            readings.insert("disk_free_gb".to_string(), disk.free_gb());
            readings.insert("disk_percent".to_string(), disk.percent_used());
        }
        None => tracing::debug!(path = %disk_path.display(), "Disk readings unavailable"),
    }
    readings.insert("cpu_percent".to_string(), read_cpu(&mut system).await);
    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(total_bytes: u64, free_bytes: u64) -> DiskReading {
        DiskReading {
            total_bytes,
            free_bytes,
        }
    }

    #[test]
    fn percentages() {
        assert!((disk(200, 50).percent_used() - 75.0).abs() < 1e-9);
        assert_eq!(disk(0, 0).percent_used(), 0.0);
        let memory = MemoryReading {
            total_bytes: 16 * 1024 * 1024 * 1024,
            available_bytes: 4 * 1024 * 1024 * 1024,
        };
        assert!((memory.available_gb() - 4.0).abs() < 1e-9);
        assert!((memory.percent_used() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn deepest_mount_point_wins() {
        let mounts = vec![
            (PathBuf::from("/"), disk(100, 10)),
            (PathBuf::from("/home"), disk(100, 60)),
            (PathBuf::from("/home/user/data"), disk(100, 90)),
        ];
        assert_eq!(disk_for(Path::new("/home/user/project"), &mounts), Some(disk(100, 60)));
        assert_eq!(disk_for(Path::new("/home/user/data/x"), &mounts), Some(disk(100, 90)));
        assert_eq!(disk_for(Path::new("/var/tmp"), &mounts), Some(disk(100, 10)));
        // `/homework` is not under `/home`.
        assert_eq!(disk_for(Path::new("/homework"), &mounts), Some(disk(100, 10)));
        assert_eq!(disk_for(Path::new("/x"), &[]), None);
    }

    #[tokio::test]
    async fn collect_reports_cpu_everywhere() {
        let readings = collect(Path::new(".")).await;
        let cpu = readings["cpu_percent"];
        assert!(cpu >= 0.0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn memory_and_disk_on_linux() {
        let readings = collect(Path::new(".")).await;
        assert!(readings.contains_key("memory_percent"));
        assert!(readings.contains_key("memory_available_gb"));
    }
}
