//! Launch orchestration for launchlog
//!
//! A [`LaunchPipeline`] runs an ordered list of [`Step`]s one after another.
//! Every line a step prints goes through the [`LaunchConsole`]: parsed,
//! classified, censored and stored in a bounded [`LogBuffer`].
//!
//! The pipeline itself is a synchronous state machine; [`LaunchPipeline::run`]
//! drives it on a tokio runtime and [`PipelineHandle`] controls it from
//! outside.

mod console;
mod driver;
mod error;
mod pipeline;
mod step;
pub mod steps;
mod vars;

pub use console::LaunchConsole;
pub use driver::{Control, PipelineHandle};
pub use error::LaunchError;
pub use pipeline::LaunchPipeline;
pub use step::{Step, StepContext, StepEvent, StepOutcome};
pub use vars::expand_variables;

pub use launchlog_logs::{LogBuffer, PrivacyFilter};
pub use launchlog_types::{PipelineEvent, PipelineOutcome, PipelineState, Severity};
