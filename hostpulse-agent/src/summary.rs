use hostpulse::{ProcessTable, Snapshot};

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human-readable size with one decimal, capped at GB.
pub fn format_bytes(bytes: f64) -> String {
    let mut size = bytes.max(0.0);
    let mut unit = 0;
    while size > 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// One status line for a snapshot and the latest process table.
pub fn status_line(snapshot: &Snapshot, table: &ProcessTable) -> String {
    let mut line = format!(
        "cpu {:.1}% | mem {:.1}% ({} / {}) | disk {}/s | net {}/s | {} procs",
        snapshot.cpu_total,
        snapshot.memory.percent,
        format_bytes(snapshot.memory.used_bytes as f64),
        format_bytes(snapshot.memory.total_bytes as f64),
        format_bytes(snapshot.disk_io.total()),
        format_bytes(snapshot.network_io.total()),
        table.len(),
    );

    if let Some(battery) = &snapshot.battery {
        line.push_str(&format!(" | battery {:.0}%", battery.percent));
    }
    if let Some(cpu) = snapshot.temperature.as_ref().and_then(|t| t.cpu_celsius) {
        line.push_str(&format!(" | {:.0}°C", cpu));
    }

    let top: Vec<String> = table
        .top_by_cpu(3)
        .iter()
        .map(|p| format!("{}({}) {:.1}%", p.name, p.pid, p.cpu_percent))
        .collect();
    if !top.is_empty() {
        line.push_str(" | top: ");
        line.push_str(&top.join(", "));
    }

    line
}
