use super::ast::{Command, Output};
use super::lexer::{Lexer, RedirectOp, Token};
use crate::shell::error::ParseError;

/// 解析一整行输入；空行返回 `Ok(None)`
pub fn parse(input: &str) -> Result<Option<Command>, ParseError> {
    Parser::new(input)?.parse_pipeline()
}

// 解析过程中的单个阶段，重定向还没有和管道合并
#[derive(Default)]
struct SimpleCommand {
    argv: Vec<String>,
    input: Option<String>,
    output: Option<(RedirectOp, String)>,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    fn next_token(&mut self) -> Result<(), ParseError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    pub fn parse_pipeline(&mut self) -> Result<Option<Command>, ParseError> {
        if self.current_token == Token::EOF {
            return Ok(None);
        }

        let mut commands = Vec::new();
        loop {
            commands.push(self.parse_simple_command()?);

            match &self.current_token {
                Token::Pipe => self.next_token()?,
                Token::EOF => break,
                Token::Unsupported(c) => return Err(ParseError::Unsupported(*c)),
                // parse_simple_command 只会停在管道、EOF 或不支持的符号上
                other => unreachable!("unexpected token after command: {:?}", other),
            }
        }

        Self::link(commands).map(Some)
    }

    fn parse_simple_command(&mut self) -> Result<SimpleCommand, ParseError> {
        let mut command = SimpleCommand::default();

        loop {
            match &self.current_token {
                Token::EOF | Token::Pipe | Token::Unsupported(_) => break,
                Token::Redirect(op) => {
                    let op = *op;
                    let filename = self.parse_redirection()?;
                    match op {
                        RedirectOp::Input => {
                            if command.input.replace(filename).is_some() {
                                return Err(ParseError::DuplicateInput);
                            }
                        }
                        RedirectOp::Output | RedirectOp::Append => {
                            if command.output.replace((op, filename)).is_some() {
                                return Err(ParseError::DuplicateOutput);
                            }
                        }
                    }
                }
                Token::Word(word) => {
                    command.argv.push(word.clone());
                    self.next_token()?;
                }
            }
        }

        if command.argv.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        Ok(command)
    }

    fn parse_redirection(&mut self) -> Result<String, ParseError> {
        self.next_token()?; // 跳过重定向操作符

        match &self.current_token {
            Token::Word(filename) => {
                let filename = filename.clone();
                self.next_token()?;
                Ok(filename)
            }
            _ => Err(ParseError::MissingRedirectTarget),
        }
    }

    // 从最后一个阶段往前，把阶段串成单链表
    fn link(commands: Vec<SimpleCommand>) -> Result<Command, ParseError> {
        let count = commands.len();
        let mut next: Option<Command> = None;

        for (index, simple) in commands.into_iter().enumerate().rev() {
            if simple.input.is_some() && index != 0 {
                return Err(ParseError::InputNotFirst);
            }
            if simple.output.is_some() && index + 1 != count {
                return Err(ParseError::OutputBeforePipe);
            }

            let output = match (next.take(), simple.output) {
                (Some(stage), _) => Output::Pipe(Box::new(stage)),
                (None, Some((RedirectOp::Append, path))) => Output::Append(path),
                (None, Some((_, path))) => Output::Truncate(path),
                (None, None) => Output::Stdout,
            };
            let mut stage = Command::new(simple.argv);
            stage.input_filename = simple.input;
            stage.output = output;
            next = Some(stage);
        }

        next.ok_or(ParseError::MissingCommand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::ast::OutputType;

    #[allow(clippy::unwrap_used)]
    fn parse_ok(input: &str) -> Command {
        parse(input).unwrap().unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("   \t "), Ok(None));
    }

    #[test]
    fn test_simple_command() {
        let cmd = parse_ok("ls -l");
        assert_eq!(cmd.argv, vec!["ls", "-l"]);
        assert_eq!(cmd.input_filename, None);
        assert_eq!(cmd.output_type(), OutputType::ToCallerStdout);
    }

    #[test]
    fn test_pipeline() {
        let cmd = parse_ok("cat < in.txt | grep foo | wc -l >> out.txt");
        assert_eq!(cmd.input_filename.as_deref(), Some("in.txt"));

        let stages: Vec<&Command> = cmd.stages().collect();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[1].argv, vec!["grep", "foo"]);
        assert_eq!(stages[0].output_type(), OutputType::ToNextStage);
        assert_eq!(stages[1].output_type(), OutputType::ToNextStage);
        assert_eq!(stages[2].output_type(), OutputType::ToFileAppend);
        assert_eq!(stages[2].output_filename(), Some("out.txt"));
    }

    #[test]
    fn test_chain_matches_built_stages() {
        let mut wc = Command::new(vec!["wc".to_string(), "-l".to_string()]);
        wc.output = Output::Truncate("count.txt".to_string());
        let mut cat = Command::new(vec!["cat".to_string()]);
        cat.input_filename = Some("in.txt".to_string());
        cat.output = Output::Pipe(Box::new(wc));

        assert_eq!(parse_ok("cat < in.txt | wc -l > count.txt"), cat);
    }

    #[test]
    fn test_redirection() {
        let cmd = parse_ok("> output.txt echo hello");
        assert_eq!(cmd.argv, vec!["echo", "hello"]);
        assert_eq!(cmd.output, Output::Truncate("output.txt".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("| wc"), Err(ParseError::MissingCommand));
        assert_eq!(parse("ls |"), Err(ParseError::MissingCommand));
        assert_eq!(parse("ls | | wc"), Err(ParseError::MissingCommand));
        assert_eq!(parse("> out.txt"), Err(ParseError::MissingCommand));
        assert_eq!(parse("echo >"), Err(ParseError::MissingRedirectTarget));
        assert_eq!(parse("echo > | wc"), Err(ParseError::MissingRedirectTarget));
        assert_eq!(parse("cat < a < b"), Err(ParseError::DuplicateInput));
        assert_eq!(parse("echo > a >> b"), Err(ParseError::DuplicateOutput));
        assert_eq!(parse("ls | wc < in.txt"), Err(ParseError::InputNotFirst));
        assert_eq!(parse("ls > out.txt | wc"), Err(ParseError::OutputBeforePipe));
        assert_eq!(parse("sleep 10 &"), Err(ParseError::Unsupported('&')));
        assert_eq!(parse("ls; pwd"), Err(ParseError::Unsupported(';')));
        assert_eq!(parse("echo \"abc"), Err(ParseError::UnterminatedQuote('"')));
    }
}
