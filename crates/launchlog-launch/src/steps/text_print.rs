use launchlog_types::Severity;

use crate::step::{Step, StepContext};

/// Prints fixed lines at a fixed severity, then succeeds
#[derive(Debug)]
pub struct TextPrint {
    lines: Vec<String>,
    level: Severity,
    ctx: Option<StepContext>,
}

impl TextPrint {
    pub fn new(lines: Vec<String>, level: Severity) -> Self {
        Self {
            lines,
            level,
            ctx: None,
        }
    }

    pub fn line(line: impl Into<String>, level: Severity) -> Self {
        Self::new(vec![line.into()], level)
    }
}

impl Step for TextPrint {
    fn name(&self) -> &str {
        "print"
    }

    fn start(&mut self, ctx: StepContext) {
        ctx.log_lines(self.lines.clone(), self.level);
        ctx.succeed();
        self.ctx = Some(ctx);
    }

    fn can_abort(&self) -> bool {
        true
    }

    fn abort(&mut self) -> bool {
        if let Some(ctx) = &self.ctx {
            ctx.fail("Aborted.");
        }
        true
    }
}
