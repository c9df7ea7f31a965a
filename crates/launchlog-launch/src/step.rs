use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use launchlog_types::Severity;

/// How a step ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Message from a running step to its pipeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepEvent {
    /// Raw output lines. `level` is the channel severity for process output
    /// or a fixed severity for lines the step makes up itself.
    Lines {
        step: usize,
        lines: Vec<String>,
        level: Severity,
    },
    /// The step is blocked until the pipeline is told to proceed
    ReadyForLaunch { step: usize },
    Finished { step: usize, outcome: StepOutcome },
}

/// A step's connection to the pipeline that started it.
///
/// Cheap to clone; all clones share one completion flag, so the first
/// `succeed`/`fail` wins and later ones are ignored.
#[derive(Clone, Debug)]
pub struct StepContext {
    index: usize,
    tx: mpsc::UnboundedSender<StepEvent>,
    completed: Arc<AtomicBool>,
}

impl StepContext {
    pub fn new(index: usize, tx: mpsc::UnboundedSender<StepEvent>) -> Self {
        Self {
            index,
            tx,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn log_line(&self, line: impl Into<String>, level: Severity) {
        self.log_lines(vec![line.into()], level);
    }

    pub fn log_lines(&self, lines: Vec<String>, level: Severity) {
        if lines.is_empty() {
            return;
        }
        self.send(StepEvent::Lines {
            step: self.index,
            lines,
            level,
        });
    }

    /// Ask the pipeline to wait for `proceed()`
    pub fn ready_for_launch(&self) {
        self.send(StepEvent::ReadyForLaunch { step: self.index });
    }

    pub fn succeed(&self) {
        self.complete(StepOutcome::Succeeded);
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.complete(StepOutcome::Failed(reason.into()));
    }

    fn complete(&self, outcome: StepOutcome) {
        if self.completed.swap(true, Ordering::SeqCst) {
            tracing::debug!(step = self.index, ?outcome, "step already completed");
            return;
        }
        self.send(StepEvent::Finished {
            step: self.index,
            outcome,
        });
    }

    fn send(&self, event: StepEvent) {
        // The pipeline is gone; nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// One unit of a launch.
///
/// `start` kicks the work off and returns; the step reports lines and its
/// single completion through the [`StepContext`], either right away or later
/// from a background task.
pub trait Step: Send {
    fn name(&self) -> &str;

    fn start(&mut self, ctx: StepContext);

    /// Continue after [`StepContext::ready_for_launch`]
    fn proceed(&mut self) {}

    fn can_abort(&self) -> bool {
        false
    }

    /// Try to stop the step. On success the step still reports completion.
    fn abort(&mut self) -> bool {
        false
    }

    /// Clean up once the pipeline is over. Called for every started step,
    /// newest first.
    fn finalize(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_completion_is_delivered_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = StepContext::new(2, tx);
        let other = ctx.clone();

        ctx.fail("first");
        other.succeed();
        ctx.fail("third");

        assert_eq!(
            rx.try_recv().unwrap(),
            StepEvent::Finished {
                step: 2,
                outcome: StepOutcome::Failed("first".to_string())
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_line_batches_are_skipped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = StepContext::new(0, tx);
        ctx.log_lines(Vec::new(), Severity::Launcher);
        ctx.log_line("hello", Severity::Launcher);

        assert_eq!(
            rx.try_recv().unwrap(),
            StepEvent::Lines {
                step: 0,
                lines: vec!["hello".to_string()],
                level: Severity::Launcher
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_pipeline_dropped_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let ctx = StepContext::new(0, tx);
        ctx.log_line("nobody hears this", Severity::Info);
        ctx.succeed();
        assert!(ctx.completed.load(Ordering::SeqCst));
    }
}
