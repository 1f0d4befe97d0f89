use std::io::{self, Write};
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// vt100 cursor-to-line-start plus clear-to-end, so each progress line
/// overwrites the previous one in place.
pub(super) fn clear_line() {
    print!("\r\x1b[2K");
}

/// Throughput and ETA reporting across a scan. The first update only
/// records the start timestamp; later updates are rate-capped to one
/// line per half second. `finish` bypasses the cap and prints the
/// permanent summary line.
///
/// The throughput shown is the cumulative average over the whole run,
/// not a windowed rate, so the ETA inherits any early slow period.
pub(super) struct ProgressMeter {
    total_bytes: u64,
    start: Option<Instant>,
    last_report: Instant,
}

impl ProgressMeter {
    pub(super) fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            start: None,
            last_report: Instant::now(),
        }
    }

    pub(super) fn update(&mut self, bytes: u64) {
        if let Some(line) = self.line_at(Instant::now(), bytes, false) {
            clear_line();
            print!("{line}");
            let _ = io::stdout().flush();
        }
    }

    /// If no update preceded this call (a zero-length device), it only
    /// records the start timestamp and stays silent, matching the
    /// original tool's behavior.
    pub(super) fn finish(&mut self, bytes: u64) {
        if let Some(line) = self.line_at(Instant::now(), bytes, true) {
            clear_line();
            println!("{line}");
        }
    }

    /// Rendering core with the clock passed in, so the sampling cap and
    /// the zero-rate guard are testable without sleeping.
    fn line_at(&mut self, now: Instant, bytes: u64, final_report: bool) -> Option<String> {
        let Some(start) = self.start else {
            self.start = Some(now);
            self.last_report = now;
            return None;
        };

        if !final_report && now.duration_since(self.last_report) < REPORT_INTERVAL {
            return None;
        }
        self.last_report = now;

        let elapsed = now.duration_since(start).as_secs_f64();
        if elapsed == 0.0 {
            return None;
        }

        let mib_done = bytes / 1024 / 1024;
        let rate = mib_done as f64 / elapsed;
        if rate == 0.0 {
            // Nothing measurable yet; emitting would divide by zero below.
            return None;
        }

        if final_report {
            let secs = elapsed as u64;
            let millis = ((elapsed - elapsed.floor()) * 1000.0) as u64;
            Some(format!(
                "Finished, time {:02}:{:02}.{:03}, {:4} MiB written, speed {:5.1} MiB/s",
                secs / 60,
                secs % 60,
                millis,
                mib_done,
                rate
            ))
        } else {
            let percent = if self.total_bytes == 0 {
                100.0
            } else {
                bytes as f64 / self.total_bytes as f64 * 100.0
            };
            let total_mib = self.total_bytes / 1024 / 1024;
            let eta = (total_mib as f64 / rate - elapsed).max(0.0) as u64;
            Some(format!(
                "Progress: {:5.1}%, ETA {:02}:{:02}, {:4} MiB written, speed {:5.1} MiB/s",
                percent,
                eta / 60,
                eta % 60,
                mib_done,
                rate
            ))
        }
    }
}
