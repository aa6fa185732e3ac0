//! Scope-bound timers: each variant captures a start marker when it is
//! constructed and writes exactly one completion report when it is dropped,
//! on every exit path out of the enclosing scope. Construction never fails
//! and a failed sink write never turns a drop into a panic.

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use tickscope_clock::{format_cycles, read_cycles, Instant, TickDuration};

// Destination for completion reports. Fixed streams in production; tests
// swap in a shared buffer to assert on the emitted lines.
enum Sink {
    Stderr,
    Stdout,
    #[cfg(test)]
    Capture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>),
}

impl Sink {
    // Reporting is best effort; the write result is discarded.
    fn write_line(&self, args: fmt::Arguments) {
        match self {
            Sink::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{args}");
            }
            Sink::Stdout => {
                let _ = writeln!(io::stdout().lock(), "{args}");
            }
            #[cfg(test)]
            Sink::Capture(buf) => {
                if let Ok(mut buf) = buf.lock() {
                    let _ = writeln!(buf, "{args}");
                }
            }
        }
    }
}

/// Logs the wall time spent in a scope to stderr, as the message followed
/// directly by the elapsed duration.
pub struct ElapsedTimer {
    message: String,
    sink: Sink,
    start: Instant,
}

impl ElapsedTimer {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_sink(message, Sink::Stderr)
    }

    fn with_sink(message: impl Into<String>, sink: Sink) -> Self {
        let message = message.into();
        // Keep the allocation above out of the measurement.
        let start = Instant::now();
        ElapsedTimer {
            message,
            sink,
            start,
        }
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        let elapsed = TickDuration::from(Instant::now() - self.start);
        self.sink
            .write_line(format_args!("{}{}", self.message, elapsed));
    }
}

/// Counts raw cycles across a scope and logs the delta to stdout.
pub struct PrecisionTimer {
    message: String,
    sink: Sink,
    start: u64,
}

impl PrecisionTimer {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_sink(message, Sink::Stdout)
    }

    fn with_sink(message: impl Into<String>, sink: Sink) -> Self {
        PrecisionTimer {
            message: message.into(),
            sink,
            start: read_cycles(),
        }
    }
}

impl Drop for PrecisionTimer {
    fn drop(&mut self) {
        let delta = read_cycles().saturating_sub(self.start);
        self.sink
            .write_line(format_args!("{}: {}", self.message, delta));
    }
}

/// Counts raw cycles across a scope and writes both the delta and its
/// human-readable rendering to a caller-supplied writer.
pub struct FormattedPrecisionTimer<W: Write> {
    message: String,
    out: W,
    start: u64,
}

impl<W: Write> FormattedPrecisionTimer<W> {
    pub fn new(message: impl Into<String>, out: W) -> Self {
        FormattedPrecisionTimer {
            message: message.into(),
            out,
            start: read_cycles(),
        }
    }
}

impl<W: Write> Drop for FormattedPrecisionTimer<W> {
    fn drop(&mut self) {
        let delta = read_cycles().saturating_sub(self.start);
        let _ = writeln!(
            self.out,
            "{}: {} ticks {}",
            self.message,
            delta,
            format_cycles(delta)
        );
    }
}

/// Brackets a scope with `enter <label>` and `leave <label> -> <elapsed>`
/// lines on stderr. The only variant that writes at construction time.
pub struct FuncTimer {
    label: &'static str,
    sink: Sink,
    start: Instant,
}

impl FuncTimer {
    pub fn new(label: &'static str) -> Self {
        Self::with_sink(label, Sink::Stderr)
    }

    fn with_sink(label: &'static str, sink: Sink) -> Self {
        let start = Instant::now();
        sink.write_line(format_args!("enter {label}"));
        FuncTimer { label, sink, start }
    }
}

impl Drop for FuncTimer {
    fn drop(&mut self) {
        let elapsed = TickDuration::from(Instant::now() - self.start);
        self.sink
            .write_line(format_args!("leave {} -> {}", self.label, elapsed));
    }
}

const BANNER: &str = "=========================================================";

/// Session-level logger: banner lines on stderr with the wall timestamp,
/// the unix time, the process id and the cycle-counted elapsed time.
/// Silent unless constructed verbose. The closing report carries a `!`
/// attention prefix unless [`TimeLogger::mark_success`] was called.
pub struct TimeLogger {
    message: String,
    verbose: bool,
    ok: bool,
    sink: Sink,
    begin: DateTime<Local>,
    begin_cycles: u64,
}

impl TimeLogger {
    pub fn new(message: impl Into<String>, verbose: bool) -> Self {
        Self::with_sink(message, verbose, Sink::Stderr)
    }

    fn with_sink(message: impl Into<String>, verbose: bool, sink: Sink) -> Self {
        let logger = TimeLogger {
            message: message.into(),
            verbose,
            ok: false,
            sink,
            begin: Local::now(),
            begin_cycles: read_cycles(),
        };
        if logger.verbose {
            logger.sink.write_line(format_args!("{BANNER}"));
            logger
                .sink
                .write_line(format_args!("{}", logger.opening_line()));
        }
        logger
    }

    /// Whole seconds since construction. Callable at any time before the
    /// logger is dropped; never decreases.
    pub fn elapsed_time(&self) -> f64 {
        Local::now().timestamp().saturating_sub(self.begin.timestamp()) as f64
    }

    /// Marks the session as successful, dropping the `!` prefix from the
    /// closing report.
    pub fn mark_success(&mut self) {
        self.ok = true;
    }

    fn opening_line(&self) -> String {
        format!(
            "{} started: {} ({}) ({})",
            self.message,
            self.begin.format("%c"),
            self.begin.timestamp(),
            std::process::id()
        )
    }

    fn closing_line(&self, end: DateTime<Local>, end_cycles: u64) -> String {
        let prefix = if self.ok { "" } else { "!" };
        let delta = end_cycles.saturating_sub(self.begin_cycles);
        format!(
            "{}{} ended: {} ({}) ({}) (took {}s = {})",
            prefix,
            self.message,
            end.format("%c"),
            end.timestamp(),
            std::process::id(),
            end.timestamp().saturating_sub(self.begin.timestamp()),
            format_cycles(delta)
        )
    }
}

impl Drop for TimeLogger {
    fn drop(&mut self) {
        if !self.verbose {
            return;
        }
        let end = Local::now();
        let end_cycles = read_cycles();
        self.sink
            .write_line(format_args!("{}", self.closing_line(end, end_cycles)));
        let prefix = if self.ok { "" } else { "!" };
        self.sink.write_line(format_args!("{prefix}{BANNER}"));
    }
}
