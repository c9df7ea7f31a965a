use chrono::Local;

use launchlog_logs::level;
use launchlog_logs::{LogBuffer, LogEvent, LogParser, ParsedItem, PrivacyFilter};
use launchlog_types::{Channel, Severity};

/// Routes raw step output into the log buffer.
///
/// stdout and stderr each get their own parser so an event interleaved on
/// one channel does not break one on the other. Every stored line passes
/// through the privacy filter first.
#[derive(Debug)]
pub struct LaunchConsole {
    buffer: LogBuffer,
    censor: PrivacyFilter,
    stdout: LogParser,
    stderr: LogParser,
}

impl LaunchConsole {
    pub fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            censor: PrivacyFilter::new(),
            stdout: LogParser::new(),
            stderr: LogParser::new(),
        }
    }

    pub fn with_censor(mut self, censor: PrivacyFilter) -> Self {
        self.censor = censor;
        self
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn censor(&self) -> &PrivacyFilter {
        &self.censor
    }

    pub fn set_censor(&mut self, censor: PrivacyFilter) {
        self.censor = censor;
    }

    pub fn on_log_lines(&mut self, lines: &[String], level: Severity) {
        for line in lines {
            self.on_log_line(line, level);
        }
    }

    /// Classify and store one raw line.
    ///
    /// Channel lines go through that channel's parser; anything else is
    /// stored at `level` unless it carries its own level marker.
    pub fn on_log_line(&mut self, line: &str, level: Severity) {
        let Some(channel) = Channel::from_severity(level) else {
            let mut text = line.to_string();
            let marked = level::from_line(&mut text);
            let severity = if marked.is_known() { marked } else { level };
            self.store(severity, &text);
            return;
        };

        let parser = self.parser(channel);
        parser.append_line(line);
        let items = parser.parse_available();
        let error = parser.error().cloned();

        for item in items {
            self.store_item(item, channel);
        }

        if let Some(err) = error {
            tracing::warn!(?channel, error = %err, "dropping malformed log4j event");
            self.store(
                Severity::Error,
                &format!("[Log4j Parse Error] Failed to parse log4j log event: {}", err.message),
            );
            let rest = self.parser(channel).take_pending();
            self.store_plain(&rest, channel);
        }
    }

    /// End of output: whatever the parsers still hold is plain text
    pub fn flush(&mut self) {
        for channel in [Channel::Stdout, Channel::Stderr] {
            if let Some(item) = self.parser(channel).flush() {
                self.store_item(item, channel);
            }
        }
    }

    fn parser(&mut self, channel: Channel) -> &mut LogParser {
        match channel {
            Channel::Stdout => &mut self.stdout,
            Channel::Stderr => &mut self.stderr,
        }
    }

    fn store_item(&mut self, item: ParsedItem, channel: Channel) {
        match item {
            ParsedItem::Structured(event) => {
                let text = render_event(&event);
                self.store(event.severity, &text);
            }
            ParsedItem::PlainText { message } => self.store_plain(&message, channel),
            ParsedItem::Partial { .. } => {}
        }
    }

    fn store_plain(&mut self, message: &str, channel: Channel) {
        for line in message.split('\n').filter(|line| !line.is_empty()) {
            let mut text = line.strip_suffix('\r').unwrap_or(line).to_string();

            let mut severity = level::from_line(&mut text);
            if severity == Severity::Unknown {
                severity = level::guess_level(&text, self.buffer.previous_level());
            }
            if severity == Severity::Unknown {
                severity = channel.severity();
            }
            self.store(severity, &text);
        }
    }

    fn store(&self, severity: Severity, text: &str) {
        self.buffer.append(severity, self.censor.censor(text));
    }
}

/// `[HH:MM:SS] [thread/LEVEL] [logger]: message`, in local time
fn render_event(event: &LogEvent) -> String {
    format!(
        "[{}] [{}/{}] [{}]: {}",
        event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        event.thread,
        event.severity_text,
        event.logger,
        event.message
    )
}
