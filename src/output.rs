use std::io::Write;

use anyhow::{Context, Result};

use launchlog_logs::{LogBuffer, LogFilter};
use launchlog_types::{ClassifiedLine, Severity};

/// Which stored lines to print, and how
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Hide levelled lines below this severity
    #[arg(long, value_name = "LEVEL")]
    pub min_level: Option<Severity>,

    /// Only print lines matching this regex (case-insensitive)
    #[arg(long, value_name = "REGEX")]
    pub grep: Option<String>,

    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,
}

impl OutputArgs {
    pub fn filter(&self) -> Result<LogFilter> {
        let pattern = self.grep.as_deref().unwrap_or("");
        let filter = LogFilter::new_case_insensitive(pattern)
            .with_context(|| format!("Invalid --grep pattern '{}'", pattern))?;
        Ok(match self.min_level {
            Some(level) => filter.with_min_level(level),
            None => filter,
        })
    }

    pub fn print(&self, buffer: &LogBuffer, filter: &LogFilter) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in buffer.filtered(|line| filter.matches(line)) {
            writeln!(out, "{}", self.render(&line)?)?;
        }
        out.flush()?;

        let counts = buffer.level_counts();
        tracing::info!(
            lines = counts.total(),
            errors = counts.error + counts.fatal,
            warnings = counts.warning,
            overflow = buffer.is_overflow(),
            filtered = !filter.is_empty(),
            "console summary"
        );
        Ok(())
    }

    fn render(&self, line: &ClassifiedLine) -> Result<String> {
        if self.json {
            Ok(serde_json::to_string(line)?)
        } else {
            Ok(format!("[{}] {}", line.severity.short(), line.text))
        }
    }
}
