use colored::Colorize;

pub struct Theme {
    pub prompt: String,
    pub error_symbol: String,
    pub welcome_message: String,
    pub exit_message: String,
    pub error_style: Box<dyn Fn(String) -> String>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            prompt: "雑魚| ".bright_cyan().to_string(),
            error_symbol: "✗".red().to_string(),
            welcome_message: "哼～管道接好了吗？全部一起跑哦～"
                .bright_magenta()
                .to_string(),
            exit_message: "哼！这就走了吗？真是个没用的废物呢！"
                .bright_blue()
                .to_string(),
            error_style: Box::new(|s| s.bright_red().to_string()),
        }
    }
}

impl Theme {
    /// 非零返回值时显示的状态行
    pub fn status_line(&self, status: i32) -> String {
        format!(
            "{} {}",
            self.error_symbol,
            (self.error_style)(format!("返回值 {}，失败了呢～", status))
        )
    }
}

pub fn load_theme(theme_name: &str) -> Theme {
    match theme_name {
        "default" => Theme::default(),
        "dark" => Theme {
            prompt: "雑魚～➤ ".bright_purple().to_string(),
            error_symbol: "✗".red().to_string(),
            welcome_message: "啊啦～这不是变态先生吗？又来接管道了呢～"
                .bright_magenta()
                .to_string(),
            exit_message: "切～这就受不了了吗？真是个废物呢！"
                .bright_purple()
                .to_string(),
            error_style: Box::new(|s| s.red().to_string()),
        },
        _ => Theme::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_theme_falls_back() {
        colored::control::set_override(false);
        let theme = load_theme("neon");
        assert_eq!(theme.prompt, "雑魚| ");
        assert_eq!(load_theme("dark").prompt, "雑魚～➤ ");
    }

    #[test]
    fn test_status_line_mentions_status() {
        colored::control::set_override(false);
        let line = load_theme("default").status_line(127);
        assert!(line.contains("127"));
        assert!(line.starts_with("✗"));
    }
}
