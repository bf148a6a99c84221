mod builtins;
mod dispatcher;
mod launcher;
mod pipeline;
mod redirect;

pub use dispatcher::shell_command_dispatcher;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
pub const EXIT_NOT_FOUND: i32 = 127;
// 被信号杀死的进程返回 128 + 信号值
pub const SIGNAL_STATUS_BASE: i32 = 128;
