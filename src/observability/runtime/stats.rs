//! Process runtime statistics.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::alloc::allocation_stats;

/// Garbage-collection counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcStats {
    /// Collections completed since process start.
    pub cycles: u64,
    /// Pause durations of the latest collections, most recent first.
    pub recent_pauses: Vec<Duration>,
}

/// Memory counters, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub alloc_bytes: u64,
    pub total_alloc_bytes: u64,
    pub sys_bytes: u64,
    pub heap_alloc_bytes: u64,
}

/// Raw reading of process-wide runtime state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeStats {
    /// Time since the OS started the process, when known.
    pub uptime: Option<Duration>,
    /// Live tasks on the async runtime.
    pub tasks: usize,
    /// OS threads in the process.
    pub threads: usize,
    pub gc: GcStats,
    pub memory: MemoryStats,
}

/// Source of [`RuntimeStats`] for the sampler.
pub trait RuntimeStatsProvider: Send {
    fn read(&self) -> RuntimeStats;
}

/// Reads statistics of the current process.
///
/// - uptime: from the process start time the OS reports
/// - tasks: tokio's alive task count for the current runtime
/// - threads: OS tasks of the process, or the runtime worker count where
///   the platform does not list them
/// - memory: [`CountingAllocator`](super::CountingAllocator) counters when
///   installed, resident set size as system bytes
/// - gc: always empty, Rust has no collector
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessStats;

impl RuntimeStatsProvider for ProcessStats {
    fn read(&self) -> RuntimeStats {
        let runtime = tokio::runtime::Handle::try_current().ok();
        let tasks = runtime
            .as_ref()
            .map(|h| h.metrics().num_alive_tasks())
            .unwrap_or(0);

        let process = current_process();
        let threads = process
            .as_ref()
            .and_then(|p| p.threads)
            .or_else(|| runtime.as_ref().map(|h| h.metrics().num_workers()))
            .unwrap_or(0);
        let resident = process.as_ref().map(|p| p.resident_bytes).unwrap_or(0);

        let memory = match allocation_stats() {
            Some(a) => MemoryStats {
                alloc_bytes: a.allocated,
                total_alloc_bytes: a.total_allocated,
                sys_bytes: resident,
                heap_alloc_bytes: a.allocated,
            },
            None => MemoryStats {
                sys_bytes: resident,
                ..MemoryStats::default()
            },
        };

        RuntimeStats {
            uptime: process.and_then(|p| p.uptime),
            tasks,
            threads,
            gc: GcStats::default(),
            memory,
        }
    }
}

/// What the OS reports about this process.
#[derive(Debug)]
struct ProcessFacts {
    uptime: Option<Duration>,
    threads: Option<usize>,
    resident_bytes: u64,
}

fn current_process() -> Option<ProcessFacts> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::everything(),
    );
    let process = system.process(pid)?;

    Some(ProcessFacts {
        uptime: uptime_since(process.start_time(), SystemTime::now()),
        threads: process.tasks().map(|tasks| thread_count(pid, tasks)),
        resident_bytes: process.memory(),
    })
}

/// Wall-clock time from `started_secs` (seconds since the epoch) to `now`.
fn uptime_since(started_secs: u64, now: SystemTime) -> Option<Duration> {
    if started_secs == 0 {
        return None;
    }
    now.duration_since(UNIX_EPOCH + Duration::from_secs(started_secs))
        .ok()
}

/// Task list plus the main thread when the list leaves it out.
fn thread_count(pid: Pid, tasks: &HashSet<Pid>) -> usize {
    if tasks.contains(&pid) {
        tasks.len()
    } else {
        tasks.len() + 1
    }
}

/// Name of the local host, if it can be determined.
pub fn local_hostname() -> Option<String> {
    System::host_name()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_counts_from_process_start() {
        let started = 1_700_000_000;
        let now = UNIX_EPOCH + Duration::from_secs(started + 90);
        assert_eq!(uptime_since(started, now), Some(Duration::from_secs(90)));

        // unknown start, or a start in the future
        assert_eq!(uptime_since(0, now), None);
        assert_eq!(uptime_since(started + 200, now), None);
    }

    #[test]
    fn thread_count_includes_main_thread_once() {
        let pid = Pid::from_u32(100);
        let workers: HashSet<Pid> = [101, 102].into_iter().map(Pid::from_u32).collect();
        assert_eq!(thread_count(pid, &workers), 3);

        let all: HashSet<Pid> = [100, 101, 102].into_iter().map(Pid::from_u32).collect();
        assert_eq!(thread_count(pid, &all), 3);
    }

    #[tokio::test]
    async fn process_stats_reads_runtime() {
        let stats = ProcessStats.read();
        assert!(stats.threads >= 1);
        assert_eq!(stats.gc, GcStats::default());
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[tokio::test]
    async fn uptime_covers_time_before_first_read() {
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let stats = ProcessStats.read();
        let uptime = stats.uptime.expect("process start time is known");
        assert!(uptime >= Duration::from_secs(1), "uptime was {uptime:?}");
        assert!(stats.memory.sys_bytes > 0);
    }
}
