use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    #[error("missing command")]
    MissingCommand,
    #[error("missing file name after redirection")]
    MissingRedirectTarget,
    #[error("more than one input redirection")]
    DuplicateInput,
    #[error("more than one output redirection")]
    DuplicateOutput,
    #[error("input redirection is only allowed on the first command of a pipeline")]
    InputNotFirst,
    #[error("output redirection is only allowed on the last command of a pipeline")]
    OutputBeforePipe,
    #[error("'{0}' is not supported")]
    Unsupported(char),
    #[error("NUL byte in input")]
    NulByte,
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Input parse error: {0}")]
    Parse(#[from] ParseError),

    /// 创建管道或子进程失败，shell 无法继续
    #[error("cannot {action}: {errno}")]
    Resource { action: &'static str, errno: Errno },

    #[error("{path}: {errno}")]
    Redirection { path: String, errno: Errno },

    #[error("{program}: {}", exec_reason(.errno))]
    Exec { program: String, errno: Errno },

    /// 进程表状态不一致，shell 无法继续
    #[error("waitpid({pid}) failed: {errno}")]
    Wait { pid: i32, errno: Errno },
}

impl ShellError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Resource { .. } | ShellError::Wait { .. })
    }
}

fn exec_reason(errno: &Errno) -> &'static str {
    match *errno {
        Errno::ENOENT => "command not found",
        errno => errno.desc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        let resource = ShellError::Resource {
            action: "fork",
            errno: Errno::EAGAIN,
        };
        let wait = ShellError::Wait {
            pid: 42,
            errno: Errno::ECHILD,
        };
        let exec = ShellError::Exec {
            program: "nope".to_string(),
            errno: Errno::ENOENT,
        };
        let parse = ShellError::from(ParseError::MissingCommand);

        assert!(resource.is_fatal());
        assert!(wait.is_fatal());
        assert!(!exec.is_fatal());
        assert!(!parse.is_fatal());
    }

    #[test]
    fn test_messages() {
        let exec = ShellError::Exec {
            program: "nonexistent_binary".to_string(),
            errno: Errno::ENOENT,
        };
        assert_eq!(exec.to_string(), "nonexistent_binary: command not found");

        let parse = ShellError::from(ParseError::Unsupported('&'));
        assert_eq!(parse.to_string(), "Input parse error: '&' is not supported");
    }
}
