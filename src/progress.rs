use std::io::{self, Write};
use std::time::Duration;

/// Operator-facing console output for a training run.
pub struct ConsoleProgress {
    enabled: bool,
    line_len: usize,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            line_len: 70,
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "> WARNING: {}", msg.as_ref());
    }

    /// Print a block of lines framed by a `=== TITLE ===` header.
    pub fn banner(&self, title: &str, lines: &[String]) {
        if !self.enabled {
            return;
        }
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "\n=========== {title} ===========\n");
        for line in lines {
            let _ = writeln!(stderr, "{line}");
        }
        let _ = writeln!(stderr);
    }

    /// Open a step line; `step_end` completes it on the same line.
    pub fn step_begin(&self, current: usize, total: usize, description: &str) {
        if !self.enabled {
            return;
        }
        let msg = format!("INFO: ({current} of {total}) {description}... ");
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "{msg:<width$}", width = self.line_len);
        let _ = stderr.flush();
    }

    pub fn step_end(&self, elapsed: Duration, ok: bool) {
        if !self.enabled {
            return;
        }
        let status = if ok { "DONE" } else { "FAILED" };
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{status} (in {})", pretty_time(elapsed));
    }
}

/// `1d 2h 3m 4s`; a unit shows up only once the elapsed time exceeds it.
pub fn pretty_time(elapsed: Duration) -> String {
    let mut secs = elapsed.as_secs();
    let mut parts: Vec<String> = Vec::new();

    if secs > 86_400 {
        let d = secs / 86_400;
        secs -= d * 86_400;
        parts.push(format!("{d}d"));
    }
    if secs > 3_600 {
        let h = secs / 3_600;
        secs -= h * 3_600;
        parts.push(format!("{h}h"));
    }
    if secs > 60 {
        let m = secs / 60;
        secs -= m * 60;
        parts.push(format!("{m}m"));
    }
    parts.push(format!("{secs}s"));
    parts.join(" ")
}
