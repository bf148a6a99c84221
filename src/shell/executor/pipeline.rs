use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::{debug, warn};
use nix::fcntl::OFlag;
use nix::unistd;

use super::launcher::{self, PreparedStage, StageIo};
use super::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::shell::error::ShellError;
use crate::shell::parser::ast::Command;

/// 一次派发的结果：最后一个阶段的退出码，以及它没能启动时的原因
#[derive(Debug)]
pub struct Outcome {
    pub status: i32,
    pub failure: Option<ShellError>,
}

impl Outcome {
    pub fn from_status(status: i32) -> Self {
        Self {
            status,
            failure: None,
        }
    }

    pub fn failed(failure: ShellError) -> Self {
        Self {
            status: EXIT_FAILURE,
            failure: Some(failure),
        }
    }

    /// 最后一个阶段确实 exec 成功了（退出码仍可能非零）
    pub fn ran(&self) -> bool {
        self.failure.is_none()
    }
}

/// 执行整条管道：先 fork 所有阶段，再按顺序回收
pub fn run(chain: &Command) -> Result<Outcome, ShellError> {
    let stages = chain
        .stages()
        .map(PreparedStage::new)
        .collect::<Result<Vec<_>, _>>()?;

    let pipes = (1..stages.len())
        .map(|_| {
            unistd::pipe2(OFlag::O_CLOEXEC).map_err(|errno| ShellError::Resource {
                action: "create pipe",
                errno,
            })
        })
        .collect::<Result<Vec<(OwnedFd, OwnedFd)>, _>>()?;
    let pipe_fds: Vec<RawFd> = pipes
        .iter()
        .flat_map(|(read, write)| [read.as_raw_fd(), write.as_raw_fd()])
        .collect();

    let mut children = Vec::with_capacity(stages.len());
    for (index, stage) in stages.iter().enumerate() {
        let io = StageIo {
            stdin: index
                .checked_sub(1)
                .and_then(|prev| pipes.get(prev))
                .map(|(read, _)| read.as_raw_fd()),
            stdout: pipes.get(index).map(|(_, write)| write.as_raw_fd()),
        };

        match launcher::spawn(stage, io, &pipe_fds) {
            Ok(child) => {
                debug!("阶段 {} -> pid {}", index, child.pid());
                children.push(child);
            }
            Err(err) => {
                // 已经启动的阶段仍然要回收，避免留下僵尸进程
                drop(pipes);
                for child in children {
                    let _ = launcher::reap(child);
                }
                return Err(err);
            }
        }
    }

    // 父进程不持有任何管道端，关闭后读端才能看到 EOF
    drop(pipes);

    let mut outcome = Outcome::from_status(EXIT_SUCCESS);
    for child in children {
        let reaped = launcher::reap(child)?;
        if let Some(failure) = &reaped.failure {
            warn!("阶段 {} 启动失败: {}", reaped.pid, failure);
        }
        outcome = Outcome {
            status: reaped.status,
            failure: reaped.failure,
        };
    }
    Ok(outcome)
}
