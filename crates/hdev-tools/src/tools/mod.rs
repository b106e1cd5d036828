//! Built-in tool implementations.

mod bash;
mod create_symlink;
mod edit_file;
mod list_directory;
mod read_file;
mod write_file;

pub use bash::BashTool;
pub use create_symlink::CreateSymlinkTool;
pub use edit_file::EditFileTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;
