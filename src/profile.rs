//! Launch profiles.
//!
//! A profile is a TOML file describing the console, the privacy rules, the
//! variables available to commands and the steps to run:
//!
//! ```toml
//! [console]
//! max_lines = 100000
//! stop_on_overflow = true
//!
//! [[censor]]
//! original = "hunter2"
//! replacement = "<PASSWORD>"
//!
//! [env]
//! INST_NAME = "survival"
//!
//! [[steps]]
//! kind = "print"
//! lines = ["Launching..."]
//!
//! [[steps]]
//! kind = "command"
//! name = "game"
//! command = "java -jar ${INST_NAME}.jar"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use launchlog_launch::steps::{CommandStep, TextPrint};
use launchlog_launch::{LaunchConsole, LaunchPipeline, LogBuffer, PrivacyFilter, Severity, Step};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Applied in file order
    #[serde(default)]
    pub censor: Vec<CensorRule>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// `[console]` section
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_stop_on_overflow")]
    pub stop_on_overflow: bool,
    /// Defaults to a message naming `max_lines`
    #[serde(default)]
    pub overflow_message: Option<String>,
}

fn default_max_lines() -> usize { 100_000 }
fn default_stop_on_overflow() -> bool { true }

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            stop_on_overflow: default_stop_on_overflow(),
            overflow_message: None,
        }
    }
}

impl ConsoleConfig {
    /// Build the log buffer, with command line overrides applied
    pub fn buffer(&self, max_lines: Option<usize>, stop_on_overflow: Option<bool>) -> LogBuffer {
        let max_lines = max_lines.unwrap_or(self.max_lines);
        let message = self.overflow_message.clone().unwrap_or_else(|| {
            format!(
                "Stopped watching the game log because the log length surpassed {} lines.",
                max_lines
            )
        });
        LogBuffer::new(max_lines)
            .with_stop_on_overflow(stop_on_overflow.unwrap_or(self.stop_on_overflow))
            .with_overflow_message(message)
    }
}

/// One `[[censor]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct CensorRule {
    pub original: String,
    pub replacement: String,
}

/// One `[[steps]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepConfig {
    Print {
        #[serde(default)]
        lines: Vec<String>,
        #[serde(default = "default_print_level")]
        level: Severity,
    },
    Command {
        #[serde(default = "default_command_name")]
        name: String,
        command: String,
        #[serde(default)]
        wait_for_ready: bool,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
}

fn default_print_level() -> Severity { Severity::Launcher }
fn default_command_name() -> String { "command".to_string() }

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid profile {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn privacy_filter(&self) -> PrivacyFilter {
        self.censor
            .iter()
            .map(|rule| (rule.original.as_str(), rule.replacement.as_str()))
            .collect()
    }

    /// A pipeline with every configured step, logging into `buffer`
    pub fn build_pipeline(&self, buffer: LogBuffer) -> Result<LaunchPipeline> {
        let console = LaunchConsole::new(buffer).with_censor(self.privacy_filter());
        let mut pipeline = LaunchPipeline::new(console);
        for step in &self.steps {
            pipeline.append_step(self.build_step(step))?;
        }
        Ok(pipeline)
    }

    fn build_step(&self, config: &StepConfig) -> Box<dyn Step> {
        match config {
            StepConfig::Print { lines, level } => Box::new(TextPrint::new(lines.clone(), *level)),
            StepConfig::Command {
                name,
                command,
                wait_for_ready,
                working_dir,
            } => {
                let mut step = CommandStep::new(name.clone(), command.clone())
                    .with_env(self.env.clone())
                    .wait_for_ready(*wait_for_ready);
                if let Some(dir) = working_dir {
                    step = step.with_working_dir(dir.clone());
                }
                Box::new(step)
            }
        }
    }
}
