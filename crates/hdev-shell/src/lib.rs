//! Interactive shell subprocess runner (spec §4.F).
//!
//! Spawns the operator's command with stdin detached (redirected to the null
//! device — otherwise the child could swallow keystrokes meant for the
//! timeout prompt), streams stdout/stderr into bounded, timestamped buffers,
//! and polls for completion every 500 ms. Once `initial_timeout` elapses
//! without the process finishing, the operator is offered Continue / Kill /
//! Background (spec §4.F, fixed to the async three-choice version per
//! spec §9's "Open questions").

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod buffer;
mod prompter;
mod runner;

pub use buffer::StreamBuffer;
pub use prompter::{NullShellPrompter, ShellTimeoutChoice, ShellTimeoutPrompter};
pub use runner::{ShellError, ShellRunner};
