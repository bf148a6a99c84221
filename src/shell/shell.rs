use log::{debug, error, warn};
use std::error::Error;
use std::io::Write;

use crate::shell::executor::{shell_command_dispatcher, EXIT_SUCCESS};
use crate::shell::readline::{LineEditor, ReadlineError};
use crate::utils::config::Config;
use crate::utils::theme::{load_theme, Theme};

pub struct Shell {
    theme: Theme,
    readline: LineEditor,
    last_status: i32,
}

impl Shell {
    pub fn new(config: &Config) -> Result<Self, ReadlineError> {
        Ok(Self {
            theme: load_theme(&config.theme),
            readline: LineEditor::new(config)?,
            last_status: EXIT_SUCCESS,
        })
    }

    /// 运行 REPL，返回最后一条命令的返回值
    pub fn run(&mut self) -> Result<i32, Box<dyn Error>> {
        debug!("初始化 ZakoPipe...");
        self.readline.load_history();

        println!("{}", self.theme.welcome_message);
        debug!("ZakoPipe 准备就绪...");

        let result = self.run_loop();
        self.readline.save_history();

        debug!("退出 ZakoPipe...");
        result.map(|()| self.last_status)
    }

    fn run_loop(&mut self) -> Result<(), Box<dyn Error>> {
        loop {
            std::io::stdout().flush()?;

            match self.readline.read_line(&self.theme.prompt) {
                Ok(line) => {
                    if self.handle_input(&line)? {
                        println!("{}", self.theme.exit_message);
                        break;
                    }
                }
                Err(ReadlineError::Eof) => {
                    warn!("接收到 EOF 信号，退出 ZakoPipe...");
                    println!("\n{}", self.theme.exit_message);
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C 只丢弃当前行
                    debug!("接收到中断信号...");
                }
                Err(err) => {
                    error!("发生错误: {}", err);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    // 返回 true 表示 shell 应该退出
    fn handle_input(&mut self, line: &str) -> Result<bool, Box<dyn Error>> {
        let is_empty = line.trim().is_empty();
        self.readline.remember(line)?;

        let mut should_exit = false;
        let status = shell_command_dispatcher(line, self.last_status, &mut should_exit)?;
        if status != EXIT_SUCCESS && !should_exit && !is_empty {
            eprintln!("{}", self.theme.status_line(status));
        }
        self.last_status = status;
        Ok(should_exit)
    }
}
