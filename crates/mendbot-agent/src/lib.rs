pub mod claude;
pub mod codex;
pub mod event;

pub use claude::ClaudeBackend;
pub use codex::CodexBackend;
