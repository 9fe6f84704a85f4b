use chrono::{DateTime, Local};
use sysinfo::{Disks, Networks, System};

pub const CSV_HEADER: &str = "timestamp,cpu_percent,memory_total_gb,memory_available_gb,\
                              memory_percent,disk_read_mb_interval,disk_write_mb_interval,\
                              net_sent_mb_interval,net_recv_mb_interval";

const GB: f64 = 1024.0 * 1024.0 * 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// One line of the metrics csv, everything a single window produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub cpu_percent: f32,
    pub memory_total_gb: f64,
    pub memory_available_gb: f64,
    pub memory_percent: f64,
    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub net_sent_mb: f64,
    pub net_recv_mb: f64,
}

impl Sample {
    /// render the sample as one csv row matching `CSV_HEADER`
    pub fn render(&self) -> String {
        format!(
            "{},{:.1},{:.2},{:.2},{:.1},{:.2},{:.2},{:.2},{:.2}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
            self.cpu_percent,
            self.memory_total_gb,
            self.memory_available_gb,
            self.memory_percent,
            self.disk_read_mb,
            self.disk_write_mb,
            self.net_sent_mb,
            self.net_recv_mb,
        )
    }
}

/// Wraps the sysinfo handles and keeps the refresh-to-refresh state behind
/// the per window io deltas.
pub struct Sampler {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl Sampler {
    /// Prime all counters, the first window starts here.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_all();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// Close the current window and start the next one. The cpu load and the
    /// io deltas cover the time since the previous call.
    pub fn sample(&mut self) -> Sample {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();
        self.disks.refresh(true);
        self.networks.refresh(true);

        let total = self.system.total_memory() as f64;
        let available = self.system.available_memory() as f64;
        let memory_percent = if total > 0.0 {
            (total - available) / total * 100.0
        } else {
            0.0
        };

        let (read, written) = self.disks.iter().fold((0, 0), |(read, written), disk| {
            let usage = disk.usage();
            (read + usage.read_bytes, written + usage.written_bytes)
        });
        let (received, transmitted) =
            self.networks
                .iter()
                .fold((0, 0), |(received, transmitted), (_, data)| {
                    (received + data.received(), transmitted + data.transmitted())
                });

        Sample {
            timestamp: Local::now(),
            cpu_percent: self.system.global_cpu_usage(),
            memory_total_gb: total / GB,
            memory_available_gb: available / GB,
            memory_percent,
            disk_read_mb: read as f64 / MB,
            disk_write_mb: written as f64 / MB,
            net_sent_mb: transmitted as f64 / MB,
            net_recv_mb: received as f64 / MB,
        }
    }
}
