use std::iter::Peekable;
use std::str::Chars;

use crate::shell::error::ParseError;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Word(String),
    Pipe,
    Redirect(RedirectOp),
    // `&` 和 `;`：后台执行和命令序列都不支持
    Unsupported(char),
    EOF,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum RedirectOp {
    Input,  // <
    Output, // >
    Append, // >>
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();

        let token = match self.peek_char() {
            None => Token::EOF,
            Some(c) => match c {
                '|' => {
                    self.read_char();
                    Token::Pipe
                }
                ';' | '&' => {
                    self.read_char();
                    Token::Unsupported(c)
                }
                '<' => {
                    self.read_char();
                    Token::Redirect(RedirectOp::Input)
                }
                '>' => {
                    self.read_char();
                    if self.peek_char() == Some('>') {
                        self.read_char();
                        Token::Redirect(RedirectOp::Append)
                    } else {
                        Token::Redirect(RedirectOp::Output)
                    }
                }
                _ => self.read_word()?,
            },
        };
        Ok(token)
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.read_char();
        }
    }

    // 一个单词可以由普通字符和引号片段拼接而成，例如 a"b c"d
    fn read_word(&mut self) -> Result<Token, ParseError> {
        let mut word = String::new();

        while let Some(c) = self.peek_char() {
            match c {
                c if c.is_whitespace() || ";<>|&".contains(c) => break,
                '\0' => return Err(ParseError::NulByte),
                '"' | '\'' => self.read_quoted(&mut word)?,
                _ => {
                    self.read_char();
                    word.push(c);
                }
            }
        }

        Ok(Token::Word(word))
    }

    fn read_quoted(&mut self, word: &mut String) -> Result<(), ParseError> {
        let quote = self.read_char().unwrap_or_default();
        let mut escaped = false;

        while let Some(c) = self.read_char() {
            match (escaped, c) {
                (_, '\0') => return Err(ParseError::NulByte),
                (true, _) => {
                    word.push(c);
                    escaped = false;
                }
                (false, '\\') => escaped = true,
                (false, c) if c == quote => return Ok(()),
                (false, c) => word.push(c),
            }
        }

        Err(ParseError::UnterminatedQuote(quote))
    }
}
