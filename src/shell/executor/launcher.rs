use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{OwnedFd, RawFd};

use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use super::redirect::{attach, RedirectFailure, Redirections};
use super::{EXIT_FAILURE, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, SIGNAL_STATUS_BASE};
use crate::shell::error::{ParseError, ShellError};
use crate::shell::parser::ast::{Command, OutputType};

// 子进程通过状态管道回报的失败类型
const REPORT_PIPE: u8 = 1;
const REPORT_INPUT: u8 = 2;
const REPORT_OUTPUT: u8 = 3;
const REPORT_EXEC: u8 = 4;

/// fork 之前准备好的阶段，子进程不需要再分配内存
pub struct PreparedStage {
    argv: Vec<CString>,
    program: String,
    command_line: String,
    output_type: OutputType,
    input: Option<String>,
    output: Option<String>,
    redirections: Redirections,
}

impl PreparedStage {
    pub fn new(stage: &Command) -> Result<Self, ParseError> {
        let argv = stage
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseError::NulByte)?;

        Ok(Self {
            argv,
            program: stage.program().to_string(),
            command_line: shell_words::join(&stage.argv),
            output_type: stage.output_type(),
            input: stage.input_filename.clone(),
            output: stage.output_filename().map(str::to_string),
            redirections: Redirections::for_stage(stage)?,
        })
    }

    fn c_program(&self) -> &CStr {
        self.argv.first().map(CString::as_c_str).unwrap_or_default()
    }
}

/// 管道连接到该阶段标准输入输出的 fd
#[derive(Debug, Default, Clone, Copy)]
pub struct StageIo {
    pub stdin: Option<RawFd>,
    pub stdout: Option<RawFd>,
}

pub struct Child {
    pid: Pid,
    program: String,
    input: Option<String>,
    output: Option<String>,
    report: File,
}

impl Child {
    pub fn pid(&self) -> Pid {
        self.pid
    }
}

#[derive(Debug)]
pub struct Reaped {
    pub pid: Pid,
    pub status: i32,
    pub failure: Option<ShellError>,
}

/// fork 一个子进程执行该阶段，父进程立即返回不阻塞。
///
/// `pipe_fds` 是整条管道的所有管道 fd，子进程在 exec 之前全部关闭。
pub fn spawn(stage: &PreparedStage, io: StageIo, pipe_fds: &[RawFd]) -> Result<Child, ShellError> {
    let (report_read, report_write) =
        unistd::pipe2(OFlag::O_CLOEXEC).map_err(|errno| ShellError::Resource {
            action: "create status pipe",
            errno,
        })?;

    // SAFETY: 子进程只做 dup2/open/close/execvp/write/_exit
    match unsafe { unistd::fork() } {
        Err(errno) => Err(ShellError::Resource {
            action: "fork",
            errno,
        }),
        Ok(ForkResult::Child) => {
            drop(report_read);
            run_child(stage, io, pipe_fds, report_write)
        }
        Ok(ForkResult::Parent { child }) => {
            drop(report_write);
            debug!(
                "启动子进程 {}: {} ({:?})",
                child, stage.command_line, stage.output_type
            );
            Ok(Child {
                pid: child,
                program: stage.program.clone(),
                input: stage.input.clone(),
                output: stage.output.clone(),
                report: File::from(report_read),
            })
        }
    }
}

/// 等待子进程结束并转换成 shell 的退出码
pub fn reap(mut child: Child) -> Result<Reaped, ShellError> {
    let failure = child.launch_failure();

    let status = loop {
        match waitpid(child.pid, None) {
            Ok(WaitStatus::Exited(_, code)) => break code,
            Ok(WaitStatus::Signaled(_, signal, _)) => break SIGNAL_STATUS_BASE + signal as i32,
            Ok(other) => debug!("忽略子进程状态: {:?}", other),
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                return Err(ShellError::Wait {
                    pid: child.pid.as_raw(),
                    errno,
                })
            }
        }
    };

    debug!("回收子进程 {} ({}): {}", child.pid, child.program, status);
    Ok(Reaped {
        pid: child.pid,
        status,
        failure,
    })
}

impl Child {
    // exec 成功时状态管道被 CLOEXEC 关闭，读到的是空记录
    fn launch_failure(&mut self) -> Option<ShellError> {
        let mut record = Vec::with_capacity(5);
        if let Err(e) = self.report.read_to_end(&mut record) {
            warn!("读取子进程 {} 状态失败: {}", self.pid, e);
            return None;
        }

        let (&tag, raw) = record.split_first()?;
        let errno = Errno::from_raw(i32::from_le_bytes(<[u8; 4]>::try_from(raw).ok()?));
        let redirection = |path: &Option<String>| ShellError::Redirection {
            path: path.clone().unwrap_or_default(),
            errno,
        };

        match tag {
            REPORT_PIPE => Some(ShellError::Redirection {
                path: "<pipe>".to_string(),
                errno,
            }),
            REPORT_INPUT => Some(redirection(&self.input)),
            REPORT_OUTPUT => Some(redirection(&self.output)),
            REPORT_EXEC => Some(ShellError::Exec {
                program: self.program.clone(),
                errno,
            }),
            _ => {
                warn!("子进程 {} 状态记录无法识别: {:?}", self.pid, record);
                None
            }
        }
    }
}

// 子进程：连接管道 -> 重定向 -> exec，任何一步失败都直接退出
fn run_child(stage: &PreparedStage, io: StageIo, pipe_fds: &[RawFd], report: OwnedFd) -> ! {
    let mut report = File::from(report);

    if let Err(errno) = wire_pipes(io, pipe_fds) {
        write_stderr(&[b"zakopipe: pipe: ", errno.desc().as_bytes(), b"\n"]);
        fail(&mut report, REPORT_PIPE, errno, EXIT_FAILURE);
    }

    if let Err(failure) = stage.redirections.resolve_input() {
        redirect_failed(&mut report, REPORT_INPUT, failure);
    }
    if let Err(failure) = stage.redirections.resolve_output() {
        redirect_failed(&mut report, REPORT_OUTPUT, failure);
    }

    let program = stage.c_program();
    let errno = match unistd::execvp(program, &stage.argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    write_stderr(&exec_diagnostic(program, errno));
    let code = match errno {
        Errno::ENOENT => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    };
    fail(&mut report, REPORT_EXEC, errno, code)
}

fn wire_pipes(io: StageIo, pipe_fds: &[RawFd]) -> nix::Result<()> {
    if let Some(fd) = io.stdin {
        attach(fd, libc::STDIN_FILENO)?;
    }
    if let Some(fd) = io.stdout {
        attach(fd, libc::STDOUT_FILENO)?;
    }
    for &fd in pipe_fds.iter().filter(|&&fd| fd > libc::STDERR_FILENO) {
        let _ = unistd::close(fd);
    }
    Ok(())
}

fn redirect_failed(report: &mut File, tag: u8, failure: RedirectFailure<'_>) -> ! {
    write_stderr(&[
        failure.path.to_bytes(),
        b": ",
        failure.errno.desc().as_bytes(),
        b"\n",
    ]);
    fail(report, tag, failure.errno, EXIT_FAILURE)
}

fn exec_diagnostic(program: &CStr, errno: Errno) -> [&[u8]; 4] {
    let reason = match errno {
        Errno::ENOENT => "command not found",
        errno => errno.desc(),
    };
    [program.to_bytes(), b": ", reason.as_bytes(), b"\n"]
}

fn fail(report: &mut File, tag: u8, errno: Errno, code: i32) -> ! {
    let mut record = [0u8; 5];
    record[0] = tag;
    record[1..].copy_from_slice(&(errno as i32).to_le_bytes());
    let _ = report.write_all(&record);
    // SAFETY: 直接结束子进程，不执行 atexit 也不刷新从父进程继承的缓冲区
    unsafe { libc::_exit(code) }
}

// 不经过 std 的 stderr 锁，fork 之后其他线程可能正持有它
fn write_stderr(parts: &[&[u8]]) {
    for part in parts {
        // SAFETY: 缓冲区在调用期间有效
        let _ = unsafe { libc::write(libc::STDERR_FILENO, part.as_ptr().cast(), part.len()) };
    }
}
