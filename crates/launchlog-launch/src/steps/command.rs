use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use launchlog_logs::LineSplitter;
use launchlog_types::Severity;

use crate::error::LaunchError;
use crate::step::{Step, StepContext};
use crate::vars::expand_variables;

const READ_CHUNK: usize = 8 * 1024;

/// Runs an external command and streams its output.
///
/// The command line is split like a shell would and `$VAR`/`${VAR}` are
/// expanded per argument from the step's environment, which is also passed
/// to the child. Exit code 0 succeeds; anything else fails the step.
#[derive(Debug)]
pub struct CommandStep {
    name: String,
    command: String,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    wait_for_ready: bool,
    cancel: CancellationToken,
    /// Held while waiting for `proceed()`
    ctx: Option<StepContext>,
    task: Option<JoinHandle<()>>,
}

impl CommandStep {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            env: HashMap::new(),
            working_dir: None,
            wait_for_ready: false,
            cancel: CancellationToken::new(),
            ctx: None,
            task: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Hold the pipeline in Waiting until `proceed()` before spawning
    pub fn wait_for_ready(mut self, wait: bool) -> Self {
        self.wait_for_ready = wait;
        self
    }

    /// Split and expand the command line
    pub fn argv(&self) -> Result<Vec<String>, LaunchError> {
        let words = shell_words::split(&self.command).map_err(|e| LaunchError::InvalidCommand {
            command: self.command.clone(),
            reason: e.to_string(),
        })?;
        if words.is_empty() {
            return Err(LaunchError::InvalidCommand {
                command: self.command.clone(),
                reason: "command is empty".to_string(),
            });
        }
        Ok(words
            .iter()
            .map(|word| expand_variables(word, &self.env))
            .collect())
    }

    fn launch(&mut self, ctx: StepContext) {
        match self.spawn(&ctx) {
            Ok(child) => {
                let cancel = self.cancel.clone();
                self.task = Some(tokio::spawn(supervise(child, ctx, cancel)));
            }
            Err(err) => {
                tracing::warn!(step = %self.name, error = %err, "could not launch command");
                ctx.log_line(err.to_string(), Severity::Error);
                ctx.fail(err.to_string());
            }
        }
    }

    fn spawn(&self, ctx: &StepContext) -> Result<Child, LaunchError> {
        let argv = self.argv()?;
        let program = argv[0].clone();

        // tokio::spawn below needs a runtime
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(LaunchError::NoRuntime(program));
        }

        let mut command = Command::new(&program);
        command
            .args(&argv[1..])
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        ctx.log_line(format!("Launching: {}", shell_words::join(&argv)), Severity::Launcher);
        tracing::info!(step = %self.name, %program, "spawning command");

        command
            .spawn()
            .map_err(|source| LaunchError::Spawn { program, source })
    }
}

impl Step for CommandStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, ctx: StepContext) {
        if self.wait_for_ready {
            ctx.log_line("Waiting for the go-ahead to launch", Severity::Launcher);
            ctx.ready_for_launch();
            self.ctx = Some(ctx);
        } else {
            self.launch(ctx);
        }
    }

    fn proceed(&mut self) {
        if self.task.is_some() {
            return;
        }
        if let Some(ctx) = self.ctx.take() {
            self.launch(ctx);
        }
    }

    fn can_abort(&self) -> bool {
        true
    }

    fn abort(&mut self) -> bool {
        if let Some(ctx) = self.ctx.take() {
            ctx.fail("Aborted before launch");
        }
        self.cancel.cancel();
        true
    }

    fn finalize(&mut self) {
        // No-op once the child has exited
        self.cancel.cancel();
    }
}

enum Exit {
    Status(std::io::Result<ExitStatus>),
    Cancelled,
}

async fn supervise(mut child: Child, ctx: StepContext, cancel: CancellationToken) {
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward(out, ctx.clone(), Severity::StdOut)));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward(err, ctx.clone(), Severity::StdErr)));

    let exit = tokio::select! {
        status = child.wait() => Exit::Status(status),
        _ = cancel.cancelled() => Exit::Cancelled,
    };

    let exit = match exit {
        Exit::Cancelled => {
            if let Err(err) = child.kill().await {
                tracing::warn!(error = %err, "failed to kill child process");
            }
            Exit::Cancelled
        }
        status => status,
    };

    // Let the readers drain what the child wrote before it exited
    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    match exit {
        Exit::Cancelled => {
            ctx.log_line("Process killed", Severity::Launcher);
            ctx.fail("Aborted by user");
        }
        Exit::Status(Ok(status)) if status.success() => {
            ctx.log_line("Process exited with code 0", Severity::Launcher);
            ctx.succeed();
        }
        Exit::Status(Ok(status)) => {
            let reason = match status.code() {
                Some(code) => format!("Process exited with code {}", code),
                None => "Process was terminated by a signal".to_string(),
            };
            ctx.log_line(reason.clone(), Severity::Launcher);
            ctx.fail(reason);
        }
        Exit::Status(Err(err)) => ctx.fail(format!("Failed to wait for process: {}", err)),
    }
}

/// Pump one output pipe into the context, line by line
async fn forward<R>(mut reader: R, ctx: StepContext, level: Severity)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => ctx.log_lines(splitter.push(&buf[..n]), level),
            Err(err) => {
                tracing::debug!(error = %err, "output pipe closed");
                break;
            }
        }
    }

    if let Some(rest) = splitter.finish() {
        ctx.log_line(rest, level);
    }
}
