use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

pub struct Config {
    pub name: String,
    pub config_dir: PathBuf,
    pub theme: String,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/zakopipe")
        } else {
            PathBuf::from("tmp")
        }
    }

    fn default() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: env!("CARGO_PKG_NAME").to_string(),
            theme: String::from("default"),
            history_file: config_dir.join(".zakopipe_history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            logger_dir: config_dir.join("logs"),
            config_dir,
        }
    }

    pub fn new() -> Self {
        // 优先加载环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        // 默认配置
        let mut config = Config::default();

        // 从环境变量加载配置
        if let Ok(theme) = env::var("ZAKOPIPE_THEME") {
            config.theme = theme;
        }

        if let Ok(editor) = env::var("ZAKOPIPE_EDITOR") {
            config.editor_mode = editor;
        }

        if let Ok(history) = env::var("ZAKOPIPE_HISTORY") {
            config.history_file = PathBuf::from(history);
        }

        if let Ok(level) = env::var("ZAKOPIPE_LOG_LEVEL") {
            config.logger_level = level;
        }

        if let Ok(dir) = env::var("ZAKOPIPE_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }

        config
    }

    /// 确保历史文件和日志目录存在
    pub fn ensure_dirs(&self) -> io::Result<()> {
        if let Some(parent) = self.history_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.logger_dir)
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}
