use std::fmt;

/// 管道中的一个阶段，`output` 为 [`Output::Pipe`] 时拥有下一个阶段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    pub input_filename: Option<String>,
    pub output: Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Stdout,
    Truncate(String),
    Append(String),
    Pipe(Box<Command>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    ToCallerStdout,
    ToFileTruncate,
    ToFileAppend,
    ToNextStage,
}

impl Command {
    pub fn new(argv: Vec<String>) -> Self {
        debug_assert!(!argv.is_empty(), "argv must contain a program name");
        Self {
            argv,
            input_filename: None,
            output: Output::Stdout,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn output_type(&self) -> OutputType {
        match self.output {
            Output::Stdout => OutputType::ToCallerStdout,
            Output::Truncate(_) => OutputType::ToFileTruncate,
            Output::Append(_) => OutputType::ToFileAppend,
            Output::Pipe(_) => OutputType::ToNextStage,
        }
    }

    pub fn output_filename(&self) -> Option<&str> {
        match &self.output {
            Output::Truncate(path) | Output::Append(path) => Some(path),
            Output::Stdout | Output::Pipe(_) => None,
        }
    }

    pub fn next_stage(&self) -> Option<&Command> {
        match &self.output {
            Output::Pipe(next) => Some(next),
            _ => None,
        }
    }

    /// 从头到尾遍历整条管道
    pub fn stages(&self) -> Stages<'_> {
        Stages { next: Some(self) }
    }
}

pub struct Stages<'a> {
    next: Option<&'a Command>,
}

impl<'a> Iterator for Stages<'a> {
    type Item = &'a Command;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next_stage();
        Some(current)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_words::join(&self.argv))?;
        if let Some(input) = &self.input_filename {
            write!(f, " < {}", shell_words::quote(input))?;
        }
        match &self.output {
            Output::Stdout => Ok(()),
            Output::Truncate(path) => write!(f, " > {}", shell_words::quote(path)),
            Output::Append(path) => write!(f, " >> {}", shell_words::quote(path)),
            Output::Pipe(next) => write!(f, " | {}", next),
        }
    }
}
