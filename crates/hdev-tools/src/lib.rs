//! Built-in tool declarations, the registry that holds them, and the
//! parallel batch dispatcher that invokes them (spec §4.G "Tool
//! Registry & Dispatcher").

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod context;
mod declaration;
mod dispatcher;
mod error;
mod registry;
mod tools;

pub use context::ToolContext;
pub use declaration::ToolDeclaration;
pub use dispatcher::{invoke_agent_tools, DispatchError, ToolCallRequest, ToolResultBlock};
pub use error::ToolError;
pub use registry::{RegisteredTool, ToolRegistry};
pub use tools::{BashTool, CreateSymlinkTool, EditFileTool, ListDirectoryTool, ReadFileTool, WriteFileTool};
