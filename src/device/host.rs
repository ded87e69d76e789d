//! Host telemetry via sysinfo
//!
//! All three reports read one shared sample. A sample is reused until
//! sysinfo's minimum CPU update interval has passed, so reports gathered
//! together (a broadcast tick, `get_full_status`) agree with each other and
//! never read a zero CPU delta.

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::json;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use sysinfo::{Components, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{CollaboratorError, MetricsSource, Telemetry};
use crate::protocol::{into_payload, timestamp_now};

/// Temperature treated as 0% health
const MAX_SAFE_TEMP_C: f64 = 80.0;

/// Board model exposed by device-tree platforms
const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

/// Memory figures in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemInfo {
    total: u64,
    available: u64,
    used: u64,
}

impl MemInfo {
    fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round1(self.used as f64 * 100.0 / self.total as f64)
    }
}

/// One refresh of the host counters
#[derive(Debug, Clone, Copy, PartialEq)]
struct HostSample {
    cpu_percent: f64,
    cpu_count: usize,
    memory: MemInfo,
    /// Hottest sensor in °C, if any is readable
    temperature: Option<f64>,
    taken_at: Instant,
}

struct Sampler {
    system: System,
    last: Option<HostSample>,
}

/// Metrics source reading the local host
pub struct HostMetrics {
    sampler: Mutex<Sampler>,
    max_age: Duration,
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMetrics")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl HostMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta; take the baseline now
        system.refresh_cpu_usage();

        Self {
            sampler: Mutex::new(Sampler { system, last: None }),
            max_age: MINIMUM_CPU_UPDATE_INTERVAL,
        }
    }

    /// Current sample, refreshed only when the cached one has expired
    fn sample(&self) -> HostSample {
        let mut sampler = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = sampler.last {
            if last.taken_at.elapsed() < self.max_age {
                return last;
            }
        }

        let system = &mut sampler.system;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let sample = HostSample {
            cpu_percent: round1(f64::from(system.global_cpu_usage())).clamp(0.0, 100.0),
            cpu_count: system.cpus().len().max(1),
            memory: MemInfo {
                total: system.total_memory(),
                available: system.available_memory(),
                used: system.used_memory(),
            },
            temperature: hottest_component(),
            taken_at: Instant::now(),
        };
        sampler.last = Some(sample);
        sample
    }

    fn checked_sample(&self) -> Result<HostSample, CollaboratorError> {
        let sample = self.sample();
        if sample.memory.total == 0 {
            return Err(CollaboratorError::Unavailable("memory statistics".to_string()));
        }
        Ok(sample)
    }
}

#[async_trait]
impl MetricsSource for HostMetrics {
    async fn basic_status(&self) -> Result<Telemetry, CollaboratorError> {
        let sample = self.checked_sample()?;
        let uptime = System::uptime();
        let temperature = sample.temperature.unwrap_or(0.0);

        Ok(into_payload(json!({
            "system_health": health_score(sample.cpu_percent, sample.memory.percent(), temperature),
            "cpu_percent": sample.cpu_percent,
            "memory_percent": sample.memory.percent(),
            "operating_time": format_uptime(uptime),
            "uptime_seconds": uptime,
            "load_average": load_average(),
            "temperature": temperature,
            "timestamp": timestamp_now(),
        })))
    }

    async fn health_metrics(&self) -> Result<Telemetry, CollaboratorError> {
        let sample = self.checked_sample()?;

        Ok(into_payload(json!({
            "cpu": {
                "percent": sample.cpu_percent,
                "count": sample.cpu_count,
                "load_average": load_average(),
            },
            "memory": {
                "total": sample.memory.total,
                "available": sample.memory.available,
                "used": sample.memory.used,
                "percent": sample.memory.percent(),
            },
            "temperature": sample.temperature,
            "timestamp": timestamp_now(),
        })))
    }

    async fn diagnostic_info(&self) -> Result<Telemetry, CollaboratorError> {
        let boot_time = i64::try_from(System::boot_time())
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|t| t.to_rfc3339());
        let model = tokio::fs::read_to_string(DEVICE_TREE_MODEL)
            .await
            .ok()
            .map(|s| s.trim().trim_end_matches('\0').to_string());

        Ok(into_payload(json!({
            "platform": format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            "os": System::long_os_version(),
            "kernel": System::kernel_version(),
            "hostname": System::host_name(),
            "model": model,
            "boot_time": boot_time,
            "server_version": env!("CARGO_PKG_VERSION"),
            "pid": std::process::id(),
            "timestamp": timestamp_now(),
        })))
    }
}

fn load_average() -> [f64; 3] {
    let load = System::load_average();
    [load.one, load.five, load.fifteen]
}

fn hottest_component() -> Option<f64> {
    let components = Components::new_with_refreshed_list();
    components
        .list()
        .iter()
        .filter_map(|component| {
            let celsius: Option<f32> = component.temperature().into();
            celsius.map(f64::from).filter(|c| c.is_finite() && *c > 0.0)
        })
        .reduce(f64::max)
        .map(round1)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Weighted health: CPU 30%, memory 30%, temperature 40%
fn health_score(cpu_percent: f64, memory_percent: f64, temperature: f64) -> f64 {
    let cpu = (100.0 - cpu_percent).max(0.0);
    let memory = (100.0 - memory_percent).max(0.0);
    let temp = (100.0 - temperature * 100.0 / MAX_SAFE_TEMP_C).max(0.0);
    round1(cpu * 0.3 + memory * 0.3 + temp * 0.4)
}

/// "Xd Yh Zm"
fn format_uptime(total: u64) -> String {
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_reports_share_one_sample() {
        let metrics = HostMetrics::new();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;

        let (basic, health) = tokio::join!(metrics.basic_status(), metrics.health_metrics());
        let basic = basic.unwrap();
        let health = health.unwrap();

        assert_eq!(basic["cpu_percent"], health["cpu"]["percent"]);
        assert_eq!(basic["memory_percent"], health["memory"]["percent"]);
    }

    #[test]
    fn test_sample_is_reused_within_interval() {
        let metrics = HostMetrics::new();

        let first = metrics.sample();
        let second = metrics.sample();

        assert_eq!(first.taken_at, second.taken_at);
        assert!(first.memory.total > 0);
        assert!(first.cpu_count >= 1);
    }

    #[test]
    fn test_sample_refreshes_after_interval() {
        let metrics = HostMetrics::new();

        let first = metrics.sample();
        std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL + Duration::from_millis(20));
        let second = metrics.sample();

        assert!(second.taken_at > first.taken_at);
    }

    #[tokio::test]
    async fn test_report_shapes() {
        let metrics = HostMetrics::new();

        let basic = metrics.basic_status().await.unwrap();
        assert!(basic["operating_time"].as_str().unwrap().ends_with('m'));
        assert_eq!(basic["load_average"].as_array().unwrap().len(), 3);
        let health = basic["system_health"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&health));

        let info = metrics.diagnostic_info().await.unwrap();
        assert_eq!(info["server_version"], env!("CARGO_PKG_VERSION"));
        assert!(info["platform"].as_str().unwrap().contains(std::env::consts::OS));
    }

    #[test]
    fn test_health_score_weights() {
        assert_eq!(health_score(0.0, 0.0, 0.0), 100.0);
        assert_eq!(health_score(100.0, 100.0, 80.0), 0.0);
        assert_eq!(health_score(50.0, 50.0, 40.0), 50.0);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(93_784), "1d 2h 3m");
        assert_eq!(format_uptime(59), "0d 0h 0m");
    }

    #[test]
    fn test_memory_percent() {
        let memory = MemInfo {
            total: 4_000,
            available: 1_000,
            used: 3_000,
        };
        assert_eq!(memory.percent(), 75.0);
        assert_eq!(MemInfo { total: 0, available: 0, used: 0 }.percent(), 0.0);
    }
}
