//! Pipeline behaviour driven through scripted steps

use std::sync::{Arc, Mutex};

use launchlog_launch::{
    LaunchError, LaunchPipeline, LogBuffer, PipelineEvent, PipelineOutcome, PipelineState,
    Severity, Step, StepContext, StepEvent, StepOutcome,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Script {
    Succeed,
    Fail(&'static str),
    /// Never completes on its own
    Hold,
    WaitForProceed,
}

type Slot = Arc<Mutex<Option<StepContext>>>;

struct ScriptedStep {
    name: String,
    script: Script,
    abortable: bool,
    lines: Vec<(String, Severity)>,
    journal: Journal,
    slot: Slot,
}

impl ScriptedStep {
    fn new(name: &str, script: Script, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            script,
            abortable: true,
            lines: Vec::new(),
            journal: journal.clone(),
            slot: Slot::default(),
        }
    }

    fn not_abortable(mut self) -> Self {
        self.abortable = false;
        self
    }

    fn printing(mut self, line: &str, level: Severity) -> Self {
        self.lines.push((line.to_string(), level));
        self
    }

    fn slot(&self) -> Slot {
        Arc::clone(&self.slot)
    }

    fn boxed(self) -> Box<dyn Step> {
        Box::new(self)
    }
}

impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, ctx: StepContext) {
        self.journal.push(format!("start {}", self.name));
        for (line, level) in &self.lines {
            ctx.log_line(line.clone(), *level);
        }
        match self.script {
            Script::Succeed => ctx.succeed(),
            Script::Fail(reason) => ctx.fail(reason),
            Script::Hold => *self.slot.lock().unwrap() = Some(ctx),
            Script::WaitForProceed => {
                ctx.ready_for_launch();
                *self.slot.lock().unwrap() = Some(ctx);
            }
        }
    }

    fn proceed(&mut self) {
        self.journal.push(format!("proceed {}", self.name));
        if let Some(ctx) = self.slot.lock().unwrap().take() {
            ctx.succeed();
        }
    }

    fn can_abort(&self) -> bool {
        self.abortable
    }

    fn abort(&mut self) -> bool {
        self.journal.push(format!("abort {}", self.name));
        if let Some(ctx) = self.slot.lock().unwrap().take() {
            ctx.fail("Aborted by test");
        }
        true
    }

    fn finalize(&mut self) {
        self.journal.push(format!("finalize {}", self.name));
    }
}

fn pipeline() -> LaunchPipeline {
    LaunchPipeline::with_buffer(LogBuffer::new(100))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn step_changed(index: usize, name: &str) -> PipelineEvent {
    PipelineEvent::StepChanged {
        index,
        name: name.to_string(),
    }
}

#[test]
fn test_failing_step_finalizes_started_steps_in_reverse() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::Succeed, &journal).boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("b", Script::Succeed, &journal).boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("c", Script::Fail("boom"), &journal).boxed()).unwrap();
    let mut events = pipeline.subscribe();

    pipeline.start().unwrap();
    pipeline.pump();

    assert_eq!(
        journal.entries(),
        vec!["start a", "start b", "start c", "finalize c", "finalize b", "finalize a"]
    );
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(pipeline.outcome(), Some(&PipelineOutcome::Failed("boom".to_string())));
    assert_eq!(
        drain(&mut events),
        vec![
            PipelineEvent::Started,
            step_changed(0, "a"),
            step_changed(1, "b"),
            step_changed(2, "c"),
            PipelineEvent::Failed {
                reason: "boom".to_string()
            },
        ]
    );
}

#[test]
fn test_failure_at_k_finalizes_exactly_k_plus_one_steps() {
    for fail_at in 0..4 {
        let journal = Journal::default();
        let mut pipeline = pipeline();
        for index in 0..4 {
            let script = if index == fail_at {
                Script::Fail("nope")
            } else {
                Script::Succeed
            };
            let name = index.to_string();
            pipeline.append_step(ScriptedStep::new(&name, script, &journal).boxed()).unwrap();
        }

        pipeline.start().unwrap();
        pipeline.pump();

        let expected: Vec<String> = (0..=fail_at).rev().map(|i| format!("finalize {}", i)).collect();
        assert_eq!(journal.matching("finalize"), expected, "failing step {}", fail_at);
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }
}

#[test]
fn test_all_steps_succeed() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::Succeed, &journal).boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("b", Script::Succeed, &journal).boxed()).unwrap();
    let mut events = pipeline.subscribe();

    pipeline.start().unwrap();
    pipeline.pump();

    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert_eq!(pipeline.outcome(), Some(&PipelineOutcome::Succeeded));
    assert_eq!(journal.matching("finalize"), vec!["finalize b", "finalize a"]);
    assert_eq!(drain(&mut events).last(), Some(&PipelineEvent::Succeeded));
}

#[test]
fn test_empty_pipeline_succeeds_immediately() {
    let mut pipeline = pipeline();
    let mut events = pipeline.subscribe();
    pipeline.start().unwrap();

    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert!(pipeline.is_done());
    assert_eq!(
        drain(&mut events),
        vec![PipelineEvent::Started, PipelineEvent::Succeeded]
    );
}

#[test]
fn test_steps_cannot_be_added_after_start() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("b", Script::Hold, &journal).boxed()).unwrap();
    pipeline.prepend_step(ScriptedStep::new("a", Script::Succeed, &journal).boxed()).unwrap();
    pipeline.start().unwrap();
    pipeline.pump();

    assert_eq!(journal.entries(), vec!["start a", "start b"]);
    assert!(matches!(
        pipeline.append_step(ScriptedStep::new("c", Script::Succeed, &journal).boxed()),
        Err(LaunchError::AlreadyStarted)
    ));
    assert!(matches!(
        pipeline.prepend_step(ScriptedStep::new("c", Script::Succeed, &journal).boxed()),
        Err(LaunchError::AlreadyStarted)
    ));
    assert!(matches!(pipeline.start(), Err(LaunchError::AlreadyStarted)));
}

#[test]
fn test_abort_before_start() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::Succeed, &journal).boxed()).unwrap();
    let mut events = pipeline.subscribe();

    assert!(pipeline.can_abort());
    assert!(pipeline.abort());

    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert_eq!(pipeline.outcome(), Some(&PipelineOutcome::Aborted("Aborted".to_string())));
    assert_eq!(
        drain(&mut events),
        vec![PipelineEvent::Failed {
            reason: "Aborted".to_string()
        }]
    );
    assert!(matches!(pipeline.start(), Err(LaunchError::AlreadyStarted)));
    assert!(journal.entries().is_empty());
}

#[test]
fn test_abort_running_step() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::Succeed, &journal).boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("b", Script::Hold, &journal).boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("c", Script::Succeed, &journal).boxed()).unwrap();
    let mut events = pipeline.subscribe();

    pipeline.start().unwrap();
    pipeline.pump();
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert!(pipeline.can_abort());

    assert!(pipeline.abort());
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    // the step's completion is still outstanding
    assert!(!pipeline.is_done());

    pipeline.pump();
    assert!(pipeline.is_done());
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert_eq!(
        pipeline.outcome(),
        Some(&PipelineOutcome::Aborted("Aborted by test".to_string()))
    );
    assert_eq!(
        journal.entries(),
        vec!["start a", "start b", "abort b", "finalize b", "finalize a"]
    );

    let events = drain(&mut events);
    assert_eq!(
        &events[events.len() - 2..],
        &[
            PipelineEvent::Aborted,
            PipelineEvent::Failed {
                reason: "Aborted by test".to_string()
            }
        ]
    );
}

#[test]
fn test_abort_is_deferred_for_non_abortable_step() {
    let journal = Journal::default();
    let step = ScriptedStep::new("a", Script::Hold, &journal).not_abortable();
    let slot = step.slot();
    let mut pipeline = pipeline();
    pipeline.append_step(step.boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("b", Script::Succeed, &journal).boxed()).unwrap();

    pipeline.start().unwrap();
    pipeline.pump();

    assert!(!pipeline.can_abort());
    assert!(!pipeline.abort());
    assert_eq!(pipeline.state(), PipelineState::Running);

    // the step finishes fine, but the pending abort wins
    slot.lock().unwrap().take().unwrap().succeed();
    pipeline.pump();

    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(pipeline.outcome(), Some(&PipelineOutcome::Failed("Aborted".to_string())));
    assert_eq!(journal.entries(), vec!["start a", "finalize a"]);
}

#[test]
fn test_terminal_pipeline_ignores_abort() {
    let mut pipeline = pipeline();
    pipeline.start().unwrap();

    assert!(!pipeline.can_abort());
    assert!(pipeline.abort());
    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert_eq!(pipeline.outcome(), Some(&PipelineOutcome::Succeeded));
}

#[test]
fn test_proceed_releases_waiting_step() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::WaitForProceed, &journal).boxed()).unwrap();
    pipeline.append_step(ScriptedStep::new("b", Script::Succeed, &journal).boxed()).unwrap();
    let mut events = pipeline.subscribe();

    assert!(!pipeline.proceed());
    pipeline.start().unwrap();
    pipeline.pump();

    assert_eq!(pipeline.state(), PipelineState::Waiting);
    assert!(drain(&mut events).contains(&PipelineEvent::AwaitingProceed { index: 0 }));

    assert!(pipeline.proceed());
    assert!(!pipeline.proceed());
    pipeline.pump();

    assert_eq!(pipeline.state(), PipelineState::Finished);
    assert_eq!(
        journal.entries(),
        vec!["start a", "proceed a", "start b", "finalize b", "finalize a"]
    );
}

#[test]
fn test_abort_while_waiting() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::WaitForProceed, &journal).boxed()).unwrap();

    pipeline.start().unwrap();
    pipeline.pump();
    assert_eq!(pipeline.state(), PipelineState::Waiting);

    assert!(pipeline.abort());
    pipeline.pump();
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert!(pipeline.is_done());
}

#[test]
fn test_stale_completion_is_ignored() {
    let journal = Journal::default();
    let mut pipeline = pipeline();
    pipeline.append_step(ScriptedStep::new("a", Script::Hold, &journal).boxed()).unwrap();
    pipeline.start().unwrap();
    pipeline.pump();

    pipeline.handle_event(StepEvent::Finished {
        step: 7,
        outcome: StepOutcome::Failed("not mine".to_string()),
    });
    assert_eq!(pipeline.state(), PipelineState::Running);
    assert!(!pipeline.is_done());
}

#[test]
fn test_step_output_reaches_the_buffer() {
    let journal = Journal::default();
    let buffer = LogBuffer::new(100);
    let mut pipeline = LaunchPipeline::with_buffer(buffer.clone());
    pipeline
        .append_step(
            ScriptedStep::new("a", Script::Succeed, &journal)
                .printing("Launching...", Severity::Launcher)
                .printing("!![ERROR]!Could not find java", Severity::StdOut)
                .printing("hello", Severity::StdOut)
                .boxed(),
        )
        .unwrap();

    pipeline.start().unwrap();
    pipeline.pump();

    let lines: Vec<(Severity, String)> = buffer
        .lines()
        .into_iter()
        .map(|line| (line.severity, line.text))
        .collect();
    assert_eq!(
        lines,
        vec![
            (Severity::Launcher, "Launching...".to_string()),
            (Severity::Error, "Could not find java".to_string()),
            (Severity::StdOut, "hello".to_string()),
        ]
    );
}
