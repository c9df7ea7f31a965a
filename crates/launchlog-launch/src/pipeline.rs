use tokio::sync::mpsc;

use launchlog_logs::LogBuffer;
use launchlog_types::{PipelineEvent, PipelineOutcome, PipelineState};

use crate::console::LaunchConsole;
use crate::error::LaunchError;
use crate::step::{Step, StepContext, StepEvent, StepOutcome};

const ABORTED: &str = "Aborted";

/// Sequential launch state machine.
///
/// Steps run strictly one after another. Step output flows into the
/// [`LaunchConsole`]; step completions drive the transitions. When the
/// pipeline ends, every step that was started is finalized, newest first.
pub struct LaunchPipeline {
    steps: Vec<Box<dyn Step>>,
    /// Index of the step that was started last
    current: Option<usize>,
    /// The current step's completion has been handled
    current_done: bool,
    state: PipelineState,
    outcome: Option<PipelineOutcome>,
    /// Abort was requested while a step could not be aborted
    abort_pending: bool,
    console: LaunchConsole,
    events_tx: mpsc::UnboundedSender<StepEvent>,
    pub(crate) events_rx: mpsc::UnboundedReceiver<StepEvent>,
    observers: Vec<mpsc::UnboundedSender<PipelineEvent>>,
}

impl LaunchPipeline {
    pub fn new(console: LaunchConsole) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            steps: Vec::new(),
            current: None,
            current_done: false,
            state: PipelineState::NotStarted,
            outcome: None,
            abort_pending: false,
            console,
            events_tx,
            events_rx,
            observers: Vec::new(),
        }
    }

    /// A pipeline with a fresh console around `buffer`
    pub fn with_buffer(buffer: LogBuffer) -> Self {
        Self::new(LaunchConsole::new(buffer))
    }

    pub fn append_step(&mut self, step: Box<dyn Step>) -> Result<(), LaunchError> {
        self.ensure_not_started()?;
        self.steps.push(step);
        Ok(())
    }

    pub fn prepend_step(&mut self, step: Box<dyn Step>) -> Result<(), LaunchError> {
        self.ensure_not_started()?;
        self.steps.insert(0, step);
        Ok(())
    }

    fn ensure_not_started(&self) -> Result<(), LaunchError> {
        if self.state == PipelineState::NotStarted {
            Ok(())
        } else {
            Err(LaunchError::AlreadyStarted)
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Final result, once the pipeline is over and the last step's
    /// completion has been handled
    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn console_mut(&mut self) -> &mut LaunchConsole {
        &mut self.console
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    fn emit(&mut self, event: PipelineEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn start(&mut self) -> Result<(), LaunchError> {
        self.ensure_not_started()?;
        self.state = PipelineState::Running;
        tracing::info!(steps = self.steps.len(), "launch started");
        self.emit(PipelineEvent::Started);

        if self.steps.is_empty() {
            self.emit(PipelineEvent::Succeeded);
            self.finish(PipelineState::Finished, PipelineOutcome::Succeeded);
        } else {
            self.start_step(0);
        }
        Ok(())
    }

    fn start_step(&mut self, index: usize) {
        self.current = Some(index);
        self.current_done = false;

        let name = self.steps[index].name().to_string();
        tracing::debug!(index, step = %name, "starting step");
        self.emit(PipelineEvent::StepChanged { index, name });

        let ctx = StepContext::new(index, self.events_tx.clone());
        self.steps[index].start(ctx);
    }

    /// Let a waiting step continue
    pub fn proceed(&mut self) -> bool {
        if self.state != PipelineState::Waiting {
            return false;
        }
        let Some(index) = self.current else {
            return false;
        };
        self.state = PipelineState::Running;
        self.steps[index].proceed();
        true
    }

    pub fn can_abort(&self) -> bool {
        match self.state {
            PipelineState::NotStarted => true,
            PipelineState::Running | PipelineState::Waiting => self
                .current
                .is_some_and(|index| self.steps[index].can_abort()),
            PipelineState::Finished | PipelineState::Failed | PipelineState::Aborted => false,
        }
    }

    /// Request an abort. Returns false when the current step refuses; the
    /// request then stays pending until that step completes.
    pub fn abort(&mut self) -> bool {
        if self.state.is_terminal() {
            return true;
        }
        if self.state == PipelineState::NotStarted {
            tracing::info!("launch aborted before start");
            self.state = PipelineState::Aborted;
            self.outcome = Some(PipelineOutcome::Aborted(ABORTED.to_string()));
            self.emit(PipelineEvent::Failed {
                reason: ABORTED.to_string(),
            });
            return true;
        }

        let Some(index) = self.current else {
            return false;
        };
        if !self.steps[index].can_abort() {
            tracing::info!(index, "step cannot be aborted, abort deferred");
            self.abort_pending = true;
            return false;
        }
        if self.steps[index].abort() {
            tracing::info!(index, "launch aborted");
            self.state = PipelineState::Aborted;
            self.emit(PipelineEvent::Aborted);
            true
        } else {
            false
        }
    }

    /// Apply one event from a step
    pub fn handle_event(&mut self, event: StepEvent) {
        match event {
            StepEvent::Lines { lines, level, .. } => self.console.on_log_lines(&lines, level),
            StepEvent::ReadyForLaunch { step } => {
                if self.current == Some(step) && self.state == PipelineState::Running {
                    self.state = PipelineState::Waiting;
                    self.emit(PipelineEvent::AwaitingProceed { index: step });
                }
            }
            StepEvent::Finished { step, outcome } => {
                if self.current != Some(step) || self.current_done {
                    tracing::debug!(step, "ignoring stale step completion");
                    return;
                }
                self.current_done = true;
                self.on_step_finished(step, outcome);
            }
        }
    }

    /// Handle every queued step event, including those raised while handling.
    /// Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn on_step_finished(&mut self, index: usize, outcome: StepOutcome) {
        tracing::debug!(index, ?outcome, "step finished");

        if self.state == PipelineState::Aborted {
            let reason = match outcome {
                StepOutcome::Failed(reason) => reason,
                StepOutcome::Succeeded => ABORTED.to_string(),
            };
            self.finalize_started();
            self.emit(PipelineEvent::Failed {
                reason: reason.clone(),
            });
            self.finish(PipelineState::Aborted, PipelineOutcome::Aborted(reason));
            return;
        }

        match outcome {
            StepOutcome::Succeeded if self.abort_pending => {
                self.fail(ABORTED.to_string());
            }
            StepOutcome::Succeeded if index + 1 == self.steps.len() => {
                self.finalize_started();
                self.emit(PipelineEvent::Succeeded);
                self.finish(PipelineState::Finished, PipelineOutcome::Succeeded);
            }
            StepOutcome::Succeeded => {
                self.state = PipelineState::Running;
                self.start_step(index + 1);
            }
            StepOutcome::Failed(reason) => self.fail(reason),
        }
    }

    fn fail(&mut self, reason: String) {
        self.finalize_started();
        self.emit(PipelineEvent::Failed {
            reason: reason.clone(),
        });
        self.finish(PipelineState::Failed, PipelineOutcome::Failed(reason));
    }

    fn finalize_started(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        for index in (0..=current).rev() {
            tracing::debug!(index, "finalizing step");
            self.steps[index].finalize();
        }
    }

    fn finish(&mut self, state: PipelineState, outcome: PipelineOutcome) {
        match &outcome {
            PipelineOutcome::Succeeded => tracing::info!("launch succeeded"),
            PipelineOutcome::Failed(reason) => tracing::warn!(%reason, "launch failed"),
            PipelineOutcome::Aborted(reason) => tracing::info!(%reason, "launch aborted"),
        }
        self.state = state;
        self.outcome = Some(outcome);
        self.console.flush();
    }
}

impl std::fmt::Debug for LaunchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchPipeline")
            .field("steps", &self.steps.len())
            .field("current", &self.current)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish()
    }
}
