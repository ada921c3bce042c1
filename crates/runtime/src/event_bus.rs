use tracing::{debug, error, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Structured diagnostic event.
///
/// `kind` is a stable machine-readable tag (e.g. `"degenerate_extent"`);
/// `message` is for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// 0-based emission order within the bus.
    pub seq: u64,
    pub severity: Severity,
    pub kind: &'static str,
    pub message: String,
}

/// Records diagnostics in emission order and mirrors each one to `tracing`.
#[derive(Debug, Default)]
pub struct EventBus {
    next_seq: u64,
    events: Vec<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, severity: Severity, kind: &'static str, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => debug!(kind, "{message}"),
            Severity::Info => info!(kind, "{message}"),
            Severity::Warning => warn!(kind, "{message}"),
            Severity::Error => error!(kind, "{message}"),
        }
        self.events.push(Event {
            seq: self.next_seq,
            severity,
            kind,
            message,
        });
        self.next_seq += 1;
    }

    pub fn warn(&mut self, kind: &'static str, message: impl Into<String>) {
        self.emit(Severity::Warning, kind, message);
    }

    pub fn error(&mut self, kind: &'static str, message: impl Into<String>) {
        self.emit(Severity::Error, kind, message);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, Severity};

    #[test]
    fn records_events_in_order() {
        let mut bus = EventBus::new();
        bus.warn("a", "first");
        bus.error("b", "second");
        assert_eq!(bus.events().len(), 2);
        assert_eq!(bus.events()[0].seq, 0);
        assert_eq!(bus.events()[1].seq, 1);
        assert_eq!(bus.events()[1].severity, Severity::Error);
        assert_eq!(bus.count_kind("a"), 1);
    }

    #[test]
    fn drain_clears_events_but_keeps_numbering() {
        let mut bus = EventBus::new();
        bus.warn("k", "m");
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.events().is_empty());

        bus.emit(Severity::Info, "k", "n");
        assert_eq!(bus.events()[0].seq, 1);
    }
}
