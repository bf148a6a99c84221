use std::ffi::{CStr, CString};
use std::os::fd::RawFd;

use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, FdFlag, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::shell::error::ParseError;
use crate::shell::parser::ast::{Command, Output};

/// 子进程里打开失败的文件和原因
#[derive(Debug, PartialEq, Eq)]
pub struct RedirectFailure<'a> {
    pub path: &'a CStr,
    pub errno: Errno,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

#[derive(Debug)]
pub struct OutputFile {
    path: CString,
    mode: WriteMode,
}

/// 一个阶段的文件重定向。路径在 fork 之前转换成 C 字符串，
/// 子进程里只剩 open/dup2/close 三个系统调用
#[derive(Debug, Default)]
pub struct Redirections {
    input: Option<CString>,
    output: Option<OutputFile>,
}

impl Redirections {
    pub fn for_stage(stage: &Command) -> Result<Self, ParseError> {
        let input = stage.input_filename.as_deref().map(c_path).transpose()?;
        let output = match &stage.output {
            Output::Truncate(path) => Some(OutputFile::new(path, WriteMode::Truncate)?),
            Output::Append(path) => Some(OutputFile::new(path, WriteMode::Append)?),
            // 管道由 pipeline 负责连接
            Output::Stdout | Output::Pipe(_) => None,
        };
        Ok(Self { input, output })
    }

    pub fn resolve_input(&self) -> Result<(), RedirectFailure<'_>> {
        let Some(path) = &self.input else {
            return Ok(());
        };
        let fd = fcntl::open(path.as_c_str(), OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
            .map_err(|errno| RedirectFailure { path, errno })?;
        bind(fd, libc::STDIN_FILENO).map_err(|errno| RedirectFailure { path, errno })
    }

    pub fn resolve_output(&self) -> Result<(), RedirectFailure<'_>> {
        let Some(output) = &self.output else {
            return Ok(());
        };
        let fd = output.open().map_err(|errno| RedirectFailure {
            path: &output.path,
            errno,
        })?;
        bind(fd, libc::STDOUT_FILENO).map_err(|errno| RedirectFailure {
            path: &output.path,
            errno,
        })
    }
}

impl OutputFile {
    fn new(path: &str, mode: WriteMode) -> Result<Self, ParseError> {
        Ok(Self {
            path: c_path(path)?,
            mode,
        })
    }

    fn open(&self) -> nix::Result<RawFd> {
        let mode_flag = match self.mode {
            WriteMode::Truncate => OFlag::O_TRUNC,
            WriteMode::Append => OFlag::O_APPEND,
        };
        fcntl::open(
            self.path.as_c_str(),
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_CLOEXEC | mode_flag,
            Mode::from_bits_truncate(0o666),
        )
    }
}

/// 让 `target` 指向 fd 并在 exec 后保留，原 fd 不关闭
///
/// shell 启动时 0/1 已被关闭的话，新打开的 fd 可能正好落在目标上，
/// 这时 dup2 什么也不做，需要手动清掉 `FD_CLOEXEC`。
pub fn attach(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd == target {
        fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map(drop)
    } else {
        unistd::dup2(fd, target).map(drop)
    }
}

/// 把 fd 绑定到标准流上并关闭原 fd
pub fn bind(fd: RawFd, target: RawFd) -> nix::Result<()> {
    let result = attach(fd, target);
    if fd != target {
        let _ = unistd::close(fd);
    }
    result
}

fn c_path(path: &str) -> Result<CString, ParseError> {
    CString::new(path).map_err(|_| ParseError::NulByte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::os::fd::FromRawFd;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    #[allow(clippy::unwrap_used)]
    fn write_through(output: &OutputFile, text: &str) {
        let fd = output.open().unwrap();
        let mut file = unsafe { File::from_raw_fd(fd) };
        file.write_all(text.as_bytes()).unwrap();
    }

    #[allow(clippy::unwrap_used)]
    fn output_file(path: &Path, mode: WriteMode) -> OutputFile {
        OutputFile::new(path.to_str().unwrap(), mode).unwrap()
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_truncate_discards_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "old content that is long\n").unwrap();

        write_through(&output_file(&path, WriteMode::Truncate), "new\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_append_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "first\n").unwrap();

        let output = output_file(&path, WriteMode::Append);
        write_through(&output, "second\n");
        write_through(&output, "third\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\nthird\n");
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_output_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("created.txt");

        write_through(&output_file(&path, WriteMode::Truncate), "");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert!(path.exists());
        assert_eq!(mode & 0o111, 0);
        assert_eq!(mode & !0o666 & 0o777, 0);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_open_failure_reports_errno() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.txt");
        assert_eq!(
            output_file(&path, WriteMode::Append).open(),
            Err(Errno::ENOENT)
        );
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_missing_input_fails_without_binding() {
        let mut stage = Command::new(vec!["cat".to_string()]);
        stage.input_filename = Some("/nonexistent/zakopipe/input.txt".to_string());
        let redirections = Redirections::for_stage(&stage).unwrap();

        let failure = redirections.resolve_input().unwrap_err();
        assert_eq!(failure.errno, Errno::ENOENT);
        assert_eq!(
            failure.path.to_str().unwrap(),
            "/nonexistent/zakopipe/input.txt"
        );
    }

    #[test]
    fn test_pipe_and_stdout_need_no_files() {
        let mut stage = Command::new(vec!["ls".to_string()]);
        stage.output = Output::Pipe(Box::new(Command::new(vec!["wc".to_string()])));
        let redirections = Redirections::for_stage(&stage);

        assert!(matches!(
            redirections,
            Ok(Redirections {
                input: None,
                output: None
            })
        ));
    }

    #[test]
    fn test_nul_byte_in_path() {
        let mut stage = Command::new(vec!["ls".to_string()]);
        stage.output = Output::Truncate("bad\0name".to_string());
        assert_eq!(
            Redirections::for_stage(&stage).map(drop),
            Err(ParseError::NulByte)
        );
    }

    #[allow(clippy::unwrap_used)]
    fn inherits_across_exec(fd: RawFd) -> bool {
        let flags = fcntl::fcntl(fd, FcntlArg::F_GETFD).unwrap();
        !FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC)
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_bind_onto_itself_clears_cloexec() {
        let dir = tempfile::tempdir().unwrap();
        let fd = output_file(&dir.path().join("out.txt"), WriteMode::Truncate)
            .open()
            .unwrap();
        assert!(!inherits_across_exec(fd));

        bind(fd, fd).unwrap();
        assert!(inherits_across_exec(fd));
        unistd::close(fd).unwrap();
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_bind_moves_fd_onto_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let source = output_file(&path, WriteMode::Truncate).open().unwrap();
        let target = output_file(&dir.path().join("other.txt"), WriteMode::Truncate)
            .open()
            .unwrap();

        bind(source, target).unwrap();
        assert!(inherits_across_exec(target));

        let mut file = unsafe { File::from_raw_fd(target) };
        file.write_all(b"moved\n").unwrap();
        drop(file);
        assert_eq!(fs::read_to_string(&path).unwrap(), "moved\n");
    }
}
