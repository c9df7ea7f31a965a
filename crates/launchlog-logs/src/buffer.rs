use std::sync::Arc;

use parking_lot::RwLock;

use launchlog_types::{ClassifiedLine, Severity};

/// Default console size
pub const DEFAULT_MAX_LINES: usize = 1000;

const DEFAULT_OVERFLOW_MESSAGE: &str = "OVERFLOW";

/// Circular storage behind a [`LogBuffer`]
#[derive(Debug)]
struct Ring {
    /// Slots, `capacity` long once filled
    items: Vec<ClassifiedLine>,
    capacity: usize,
    /// Oldest line
    head: usize,
    /// Occupied slots
    count: usize,
    suspended: bool,
    stop_on_overflow: bool,
    overflow_message: String,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity: capacity.max(1),
            head: 0,
            count: 0,
            suspended: false,
            stop_on_overflow: false,
            overflow_message: DEFAULT_OVERFLOW_MESSAGE.to_string(),
        }
    }

    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % self.capacity
    }

    fn put(&mut self, index: usize, line: ClassifiedLine) {
        if index < self.items.len() {
            self.items[index] = line;
        } else {
            self.items.push(line);
        }
    }

    fn append(&mut self, mut severity: Severity, mut text: String) {
        if self.suspended {
            return;
        }

        if self.count == self.capacity {
            if self.stop_on_overflow {
                // the overflow marker already took the last slot
                return;
            }
            self.head = (self.head + 1) % self.capacity;
            self.count -= 1;
        } else if self.count == self.capacity - 1 && self.stop_on_overflow {
            severity = Severity::Fatal;
            text = self.overflow_message.clone();
            tracing::warn!(capacity = self.capacity, "console overflow, ingestion stopped");
        }

        let index = self.slot(self.count);
        self.put(index, ClassifiedLine::new(severity, text));
        self.count += 1;
    }

    /// Turning the stop policy on over a full buffer stops ingestion right
    /// away, so the newest line gives way to the overflow marker
    fn set_stop_on_overflow(&mut self, stop: bool) {
        let was_stopping = self.stop_on_overflow;
        self.stop_on_overflow = stop;
        if stop && !was_stopping && self.count == self.capacity {
            let index = self.slot(self.count - 1);
            let marker = ClassifiedLine::new(Severity::Fatal, self.overflow_message.clone());
            self.put(index, marker);
            tracing::warn!(capacity = self.capacity, "console overflow, ingestion stopped");
        }
    }

    fn iter(&self) -> impl Iterator<Item = &ClassifiedLine> {
        (0..self.count).map(|offset| &self.items[self.slot(offset)])
    }

    fn linearize(&mut self) -> Vec<ClassifiedLine> {
        let lines: Vec<ClassifiedLine> = self.iter().cloned().collect();
        self.items.clear();
        self.head = 0;
        self.count = 0;
        lines
    }

    fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }
        let lines = self.linearize();
        let skip = lines.len().saturating_sub(capacity);
        self.capacity = capacity;
        self.items = lines.into_iter().skip(skip).collect();
        self.count = self.items.len();
    }
}

/// Bounded console log shared between the pipeline and its observers.
///
/// Clones share the same storage. Once full the buffer either wraps around,
/// evicting the oldest line, or, with `stop_on_overflow`, stores the overflow
/// message in its last slot and ignores everything after that.
#[derive(Clone)]
pub struct LogBuffer {
    ring: Arc<RwLock<Ring>>,
}

impl LogBuffer {
    /// Create a new log buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(RwLock::new(Ring::new(capacity))),
        }
    }

    pub fn with_stop_on_overflow(self, stop: bool) -> Self {
        self.set_stop_on_overflow(stop);
        self
    }

    pub fn with_overflow_message(self, message: impl Into<String>) -> Self {
        self.set_overflow_message(message);
        self
    }

    /// Store a line, subject to suspension and the overflow policy
    pub fn append(&self, severity: Severity, text: impl Into<String>) {
        self.ring.write().append(severity, text.into());
    }

    /// Pause or resume ingestion. Stored lines are kept.
    pub fn suspend(&self, suspend: bool) {
        self.ring.write().suspended = suspend;
    }

    pub fn suspended(&self) -> bool {
        self.ring.read().suspended
    }

    /// Empty the buffer, keeping capacity and policy
    pub fn clear(&self) {
        let mut ring = self.ring.write();
        ring.items.clear();
        ring.head = 0;
        ring.count = 0;
    }

    /// Export all lines as newline-joined text
    pub fn to_plain_text(&self) -> String {
        self.ring
            .read()
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Get all lines, oldest first
    pub fn lines(&self) -> Vec<ClassifiedLine> {
        self.ring.read().iter().cloned().collect()
    }

    /// Get the last N lines
    pub fn tail(&self, n: usize) -> Vec<ClassifiedLine> {
        let ring = self.ring.read();
        let start = ring.count.saturating_sub(n);
        ring.iter().skip(start).cloned().collect()
    }

    /// Get lines matching a predicate
    pub fn filtered<F>(&self, predicate: F) -> Vec<ClassifiedLine>
    where
        F: Fn(&ClassifiedLine) -> bool,
    {
        self.ring
            .read()
            .iter()
            .filter(|line| predicate(line))
            .cloned()
            .collect()
    }

    /// Severity of the newest line, for continuation-line classification
    pub fn previous_level(&self) -> Severity {
        let ring = self.ring.read();
        match ring.count {
            0 => Severity::Unknown,
            n => ring.items[ring.slot(n - 1)].severity,
        }
    }

    /// Line count per severity
    pub fn level_counts(&self) -> LevelCounts {
        let mut counts = LevelCounts::default();
        for line in self.ring.read().iter() {
            counts.add(line.severity);
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.ring.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_lines(&self) -> usize {
        self.ring.read().capacity
    }

    /// Change the capacity, keeping the newest lines that still fit
    pub fn set_max_lines(&self, max_lines: usize) {
        self.ring.write().resize(max_lines);
    }

    pub fn stop_on_overflow(&self) -> bool {
        self.ring.read().stop_on_overflow
    }

    pub fn set_stop_on_overflow(&self, stop: bool) {
        self.ring.write().set_stop_on_overflow(stop);
    }

    pub fn set_overflow_message(&self, message: impl Into<String>) {
        self.ring.write().overflow_message = message.into();
    }

    /// Whether ingestion stopped because the buffer filled up
    pub fn is_overflow(&self) -> bool {
        let ring = self.ring.read();
        ring.stop_on_overflow && ring.count >= ring.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.read();
        f.debug_struct("LogBuffer")
            .field("capacity", &ring.capacity)
            .field("count", &ring.count)
            .field("suspended", &ring.suspended)
            .field("stop_on_overflow", &ring.stop_on_overflow)
            .finish()
    }
}

/// Counts per severity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub unknown: usize,
    pub stdout: usize,
    pub stderr: usize,
    pub launcher: usize,
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub message: usize,
    pub warning: usize,
    pub error: usize,
    pub fatal: usize,
}

impl LevelCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Unknown => self.unknown += 1,
            Severity::StdOut => self.stdout += 1,
            Severity::StdErr => self.stderr += 1,
            Severity::Launcher => self.launcher += 1,
            Severity::Trace => self.trace += 1,
            Severity::Debug => self.debug += 1,
            Severity::Info => self.info += 1,
            Severity::Message => self.message += 1,
            Severity::Warning => self.warning += 1,
            Severity::Error => self.error += 1,
            Severity::Fatal => self.fatal += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unknown
            + self.stdout
            + self.stderr
            + self.launcher
            + self.trace
            + self.debug
            + self.info
            + self.message
            + self.warning
            + self.error
            + self.fatal
    }
}
