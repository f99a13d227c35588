//! External process execution for chatpipe.
//!
//! All subprocess invocations (the audio normalizer, CLI recognizers) go
//! through [`CommandSpec`] and a [`ProcessRunner`], which enforce
//! argv-style execution: arguments cross the boundary as discrete
//! elements, never as shell strings.

mod command_spec;
mod error;
mod process;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use process::{ProcessOutput, ProcessRunner, TokioRunner};
