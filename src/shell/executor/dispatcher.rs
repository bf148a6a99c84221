use log::{debug, error, warn};

use super::builtins;
use super::pipeline::{self, Outcome};
use super::EXIT_FAILURE;
use crate::shell::error::ShellError;
use crate::shell::parser::{self, ast::Command};

/// 派发一条已解析的命令：内建命令在当前进程里执行，其余交给管道
pub fn dispatch(
    chain: &Command,
    last_rv: i32,
    should_exit: &mut bool,
) -> Result<Outcome, ShellError> {
    if let Some(builtin) = builtins::lookup(chain.program()) {
        debug!("执行内建命令: {}", builtin.name);
        let status = (builtin.handler)(&chain.argv, last_rv, should_exit);
        return Ok(Outcome::from_status(status));
    }

    debug!("执行外部命令: {}", chain);
    match pipeline::run(chain) {
        Err(err) if !err.is_fatal() => {
            warn!("命令没有启动: {}", err);
            eprintln!("{}", err);
            Ok(Outcome::failed(err))
        }
        result => result,
    }
}

/// REPL 每读到一行调用一次。
///
/// 空行原样返回 `last_rv`，解析错误返回失败但不创建任何进程。
/// 只有致命错误（无法创建管道/进程、waitpid 失败）才会返回 `Err`。
pub fn shell_command_dispatcher(
    input: &str,
    last_rv: i32,
    should_exit: &mut bool,
) -> Result<i32, ShellError> {
    let chain = match parser::parse(input) {
        Ok(Some(chain)) => chain,
        Ok(None) => return Ok(last_rv),
        Err(err) => {
            let err = ShellError::from(err);
            warn!("{}", err);
            eprintln!("{}", err);
            return Ok(EXIT_FAILURE);
        }
    };

    // chain 在这里离开作用域，无论成功失败都会被释放
    let outcome = match dispatch(&chain, last_rv, should_exit) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("致命错误: {}", err);
            return Err(err);
        }
    };
    if !outcome.ran() {
        debug!("命令未能启动，返回 {}", outcome.status);
    }
    Ok(outcome.status)
}
