//! Progress display for a provisioning run.

use dialoguer::console::{style, truncate_str, Term};
use std::time::{Duration, Instant};

/// Receives every line of provisioning output as it arrives.
pub trait ProgressSink: Send {
    fn update(&mut self, line: &str);

    /// Show an error message on its own line.
    fn print_error(&mut self, message: &str);

    /// Finish the display. Further calls are no-ops.
    fn close(&mut self);
}

/// Used with `--verbose`, where the log layer already echoes everything.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _line: &str) {}
    fn print_error(&mut self, _message: &str) {}
    fn close(&mut self) {}
}

const APPLYING: &str = "Applying configuration version";

/// Single-line progress bar redrawn in place on stdout.
pub struct ProgressBar {
    term: Term,
    started: Instant,
    lines: usize,
    phase: &'static str,
    resource: Option<String>,
    closed: bool,
}

impl ProgressBar {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            started: Instant::now(),
            lines: 0,
            phase: "Preparing",
            resource: None,
            closed: false,
        }
    }

    fn status(&self) -> String {
        let elapsed = Duration::from_secs(self.started.elapsed().as_secs());
        let mut status = format!(
            "[{}] {} ({} lines)",
            humantime::format_duration(elapsed),
            self.phase,
            self.lines
        );
        if let Some(resource) = &self.resource {
            status.push_str(": ");
            status.push_str(resource);
        }
        status
    }

    fn redraw(&self) {
        if !self.term.is_term() {
            return;
        }
        let (_, width) = self.term.size();
        let status = self.status();
        let line = truncate_str(&status, width.saturating_sub(1) as usize, "...");
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&line);
    }
}

/// The resource a log line talks about, e.g. `/Stage[main]/Web/Service[nginx]`.
pub(crate) fn resource_of(line: &str) -> Option<&str> {
    let start = line.find("/Stage[")?;
    let rest = &line[start..];
    let end = rest
        .find(|c: char| c == ':' || c.is_whitespace())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

impl ProgressSink for ProgressBar {
    fn update(&mut self, line: &str) {
        if self.closed {
            return;
        }
        self.lines += 1;
        if line.contains(APPLYING) {
            self.phase = "Applying";
        }
        if let Some(resource) = resource_of(line) {
            self.resource = Some(resource.to_string());
        }
        self.redraw();
    }

    fn print_error(&mut self, message: &str) {
        if self.closed {
            return;
        }
        let _ = self.term.clear_line();
        let _ = self.term.write_line(&style(message).red().to_string());
        self.redraw();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.phase = "Done";
        self.resource = None;
        let _ = self.term.clear_line();
        let _ = self.term.write_line(&self.status());
    }
}

/// Records every call, in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Update(String),
    Error(String),
    Close,
}

#[cfg(test)]
impl ProgressSink for RecordingSink {
    fn update(&mut self, line: &str) {
        self.events.push(SinkEvent::Update(line.to_string()));
    }

    fn print_error(&mut self, message: &str) {
        self.events.push(SinkEvent::Error(message.to_string()));
    }

    fn close(&mut self) {
        self.events.push(SinkEvent::Close);
    }
}
