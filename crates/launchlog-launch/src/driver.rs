use tokio::sync::{mpsc, oneshot};

use launchlog_types::{PipelineOutcome, PipelineState};

use crate::pipeline::LaunchPipeline;

/// Request from outside the delivery path. Each carries its reply.
#[derive(Debug)]
pub enum Control {
    Proceed(oneshot::Sender<bool>),
    Abort(oneshot::Sender<bool>),
    CanAbort(oneshot::Sender<bool>),
}

/// Cloneable remote control for a running pipeline
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<Control>,
}

impl PipelineHandle {
    /// A handle plus the receiving end to pass to [`LaunchPipeline::run`]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Control>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub async fn proceed(&self) -> bool {
        self.request(Control::Proceed).await.unwrap_or(false)
    }

    /// Abort the launch. A pipeline that already ended counts as aborted.
    pub async fn abort(&self) -> bool {
        self.request(Control::Abort).await.unwrap_or(true)
    }

    pub async fn can_abort(&self) -> bool {
        self.request(Control::CanAbort).await.unwrap_or(false)
    }

    /// `None` when the pipeline is no longer running
    async fn request(&self, make: fn(oneshot::Sender<bool>) -> Control) -> Option<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).ok()?;
        reply_rx.await.ok()
    }
}

enum Wake {
    Step(Option<crate::step::StepEvent>),
    Control(Option<Control>),
}

impl LaunchPipeline {
    /// Drive the pipeline until it is over.
    ///
    /// Starts it if needed, then handles step events and control requests
    /// in arrival order until the pipeline is terminal and the active step's
    /// completion has been handled.
    pub async fn run(mut self, mut control: mpsc::UnboundedReceiver<Control>) -> PipelineOutcome {
        if self.state() == PipelineState::NotStarted {
            if let Err(err) = self.start() {
                return PipelineOutcome::Failed(err.to_string());
            }
        }
        self.pump();

        let mut control_open = true;
        while !self.is_done() {
            let wake = tokio::select! {
                event = self.events_rx.recv() => Wake::Step(event),
                request = control.recv(), if control_open => Wake::Control(request),
            };

            match wake {
                Wake::Step(Some(event)) => {
                    self.handle_event(event);
                    self.pump();
                }
                // Unreachable while we hold a sender ourselves
                Wake::Step(None) => break,
                Wake::Control(Some(request)) => {
                    self.apply(request);
                    self.pump();
                }
                Wake::Control(None) => control_open = false,
            }
        }

        self.outcome()
            .cloned()
            .unwrap_or_else(|| PipelineOutcome::Failed("launch ended unexpectedly".to_string()))
    }

    fn apply(&mut self, request: Control) {
        // A dropped reply receiver just means the caller stopped waiting
        let _ = match request {
            Control::Proceed(reply) => reply.send(self.proceed()),
            Control::Abort(reply) => reply.send(self.abort()),
            Control::CanAbort(reply) => reply.send(self.can_abort()),
        };
    }
}
