use std::path::PathBuf;

use log::{debug, error, warn};
pub use rustyline::error::ReadlineError;
use rustyline::history::{FileHistory, History};
use rustyline::{CompletionType, Config as RLConfig, Editor};

use crate::utils::config::Config;

/// 带历史记录的行编辑器，历史文件路径来自配置
pub struct LineEditor {
    history_file: PathBuf,
    editor: Editor<(), FileHistory>,
}

impl LineEditor {
    pub fn new(config: &Config) -> Result<Self, ReadlineError> {
        let rl_config = RLConfig::builder()
            .history_ignore_space(true)
            .history_ignore_dups(true)?
            .completion_type(CompletionType::List)
            .edit_mode(config.get_edit_mode())
            .build();

        Ok(Self {
            history_file: config.history_file.clone(),
            editor: Editor::with_config(rl_config)?,
        })
    }

    pub fn load_history(&mut self) {
        if !self.history_file.exists() {
            debug!("还没有管道历史: {}", self.history_file.display());
            return;
        }
        match self.editor.load_history(&self.history_file) {
            Ok(()) => debug!("载入 {} 条管道历史", self.editor.history().len()),
            Err(err) => warn!(
                "管道历史读取失败: {} {}",
                self.history_file.display(),
                err
            ),
        }
    }

    pub fn read_line(&mut self, prompt: &str) -> Result<String, ReadlineError> {
        self.editor.readline(prompt)
    }

    /// 记下一行输入，空行不记，返回是否真的写进了历史
    pub fn remember(&mut self, line: &str) -> Result<bool, ReadlineError> {
        let line = line.trim_end();
        if line.trim_start().is_empty() {
            return Ok(false);
        }
        self.editor.add_history_entry(line)
    }

    pub fn save_history(&mut self) {
        match self.editor.save_history(&self.history_file) {
            Ok(()) => debug!("管道历史已写入 {}", self.history_file.display()),
            Err(err) => error!("管道历史写入失败: {}", err),
        }
    }
}
