//! The Agent Loop (spec §4.I) and Agent Context (spec §4.J): the engine
//! that drives LLM streaming calls, dispatches tool invocations, and
//! persists session state between turns.
//!
//! Grounded in `heare/developer/agent.py`'s `run_agent`/`process_response`
//! and `astrid-runtime`'s `runtime/{mod,execution,tool_execution}.rs` for
//! how a long-running turn loop is broken into named states in Rust.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod agent_loop;
mod context;
mod error;
mod mentions;
mod persistence;
mod session;
mod system_prompt;

pub use agent_loop::{AgentLoop, AgentLoopDeps, TurnOutcome};
pub use context::{AgentContext, ModelUsage, UsageSummary};
pub use error::{RuntimeError, RuntimeResult};
pub use mentions::inline_mentions;
pub use persistence::{PersistedSession, SessionStore};
pub use session::{Session, UsageLogEntry};
pub use system_prompt::assemble_system_prompt;
