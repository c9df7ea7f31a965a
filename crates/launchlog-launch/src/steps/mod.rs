//! Built-in steps

mod command;
mod text_print;

pub use command::CommandStep;
pub use text_print::TextPrint;
