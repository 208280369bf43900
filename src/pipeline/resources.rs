//! Pre-flight check of free memory and disk against the corpus size.

use std::path::Path;
use std::process::Command;

use crate::corpus;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Host facts the pre-flight check needs. `None` means "could not tell".
pub trait SystemProbe {
    fn free_memory(&self) -> Option<u64>;
    fn free_disk(&self, path: &Path) -> Option<u64>;
}

/// Reads `/proc/meminfo` and asks `df`.
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn free_memory(&self) -> Option<u64> {
        let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&contents)
    }

    fn free_disk(&self, path: &Path) -> Option<u64> {
        let out = Command::new("df").arg("-Pk").arg(path).output().ok()?;
        if !out.status.success() {
            return None;
        }
        parse_df(&String::from_utf8_lossy(&out.stdout))
    }
}

/// `MemAvailable` in bytes.
fn parse_meminfo(contents: &str) -> Option<u64> {
    let line = contents.lines().find(|l| l.starts_with("MemAvailable:"))?;
    // "MemAvailable:   16384000 kB"
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// Available bytes from `df -Pk` output (fourth column of the last line).
fn parse_df(output: &str) -> Option<u64> {
    let line = output.lines().skip(1).last()?;
    let kb: u64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(kb * 1024)
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceReport {
    pub corpus_size: u64,
    pub recommended_memory: f64,
    pub recommended_disk: f64,
    pub free_memory: Option<u64>,
    pub free_disk: Option<u64>,
}

impl ResourceReport {
    /// Measure the roots and the host. `ram_ratio_mb` megabytes of corpora call for
    /// 1G of RAM; `disk_factor` times the corpora is the disk recommendation.
    pub fn measure<P: AsRef<Path>>(
        roots: &[P],
        engine_path: &Path,
        ram_ratio_mb: u64,
        disk_factor: u64,
        probe: &dyn SystemProbe,
    ) -> Self {
        let corpus_size: u64 = roots.iter().map(|r| corpus::disk_usage(r.as_ref())).sum();
        let ratio = ram_ratio_mb.max(1) as f64 * MB as f64;
        Self {
            corpus_size,
            recommended_memory: GB as f64 * corpus_size as f64 / ratio,
            recommended_disk: disk_factor as f64 * corpus_size as f64,
            free_memory: probe.free_memory(),
            free_disk: probe.free_disk(engine_path),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        let gb = GB as f64;
        let mut out = Vec::new();
        if let Some(free) = self.free_memory {
            if (free as f64) < self.recommended_memory {
                out.push(format!(
                    "more than {:.0}G of RAM recommended, only {:.0}G available",
                    self.recommended_memory / gb,
                    free as f64 / gb
                ));
            }
        }
        if let Some(free) = self.free_disk {
            if (free as f64) < self.recommended_disk {
                out.push(format!(
                    "more than {:.0}G of storage recommended, only {:.0}G available",
                    self.recommended_disk / gb,
                    free as f64 / gb
                ));
            }
        }
        out
    }
}
