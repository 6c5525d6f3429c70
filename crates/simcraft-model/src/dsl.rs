//! The inline model DSL.
//!
//! Block form, whitespace-insensitive, trailing commas tolerated:
//!
//! ```text
//! processes {
//!     source "source1" { trigger_mode: Automatic }
//!     pool "pool1" { capacity: 3.0, overflow: Block }
//!     stepper "stepper" { dt: 1.0 }
//! }
//! connections {
//!     "source1.out" -> "pool1.in" { id: "c1", flow_rate: 1.0 }
//! }
//! ```
//!
//! Endpoints are `"id"` or `"id.port"`; omitted ports and flow rates take
//! the kernel defaults, and an omitted connection id becomes
//! `conn_<source>_<target>`.

use simcraft_core::process::TriggerMode;
use simcraft_core::record::{ConnectionRecord, ProcessKind, ProcessRecord};

use crate::{ModelDocument, ModelError};

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(f64),
    LBrace,
    RBrace,
    Colon,
    Comma,
    Arrow,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Str(text) => format!("string \"{text}\""),
            TokenKind::Number(value) => format!("number {value}"),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Arrow => "'->'".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> char {
        let c = self.chars.next().expect("bump past end of input");
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn error(&self, line: usize, column: usize, message: String) -> ModelError {
        ModelError::Parse {
            line,
            column,
            message,
        }
    }

    fn number(&mut self, first: Option<char>, line: usize, column: usize) -> Result<TokenKind, ModelError> {
        let mut text = String::new();
        if let Some(first) = first {
            text.push(first);
        }
        while let Some(d) = self.peek() {
            if d.is_ascii_digit() || d == '.' {
                text.push(self.bump());
            } else {
                break;
            }
        }
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error(line, column, format!("malformed number '{text}'")))?;
        Ok(TokenKind::Number(value))
    }
}

fn lex(input: &str) -> Result<Vec<Token>, ModelError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();

    while let Some(c) = lexer.peek() {
        let (line, column) = (lexer.line, lexer.column);

        if c.is_whitespace() {
            lexer.bump();
            continue;
        }

        let kind = match c {
            '{' => {
                lexer.bump();
                TokenKind::LBrace
            }
            '}' => {
                lexer.bump();
                TokenKind::RBrace
            }
            ':' => {
                lexer.bump();
                TokenKind::Colon
            }
            ',' => {
                lexer.bump();
                TokenKind::Comma
            }
            '-' => {
                lexer.bump();
                if lexer.peek() == Some('>') {
                    lexer.bump();
                    TokenKind::Arrow
                } else {
                    lexer.number(Some('-'), line, column)?
                }
            }
            '"' => {
                lexer.bump();
                let mut text = String::new();
                loop {
                    match lexer.peek() {
                        Some('"') => {
                            lexer.bump();
                            break;
                        }
                        Some(_) => text.push(lexer.bump()),
                        None => {
                            return Err(lexer.error(
                                line,
                                column,
                                "unterminated string".to_string(),
                            ))
                        }
                    }
                }
                TokenKind::Str(text)
            }
            d if d.is_ascii_digit() => lexer.number(None, line, column)?,
            a if a.is_alphabetic() || a == '_' => {
                let mut text = String::new();
                while let Some(a) = lexer.peek() {
                    if a.is_alphanumeric() || a == '_' {
                        text.push(lexer.bump());
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(text)
            }
            other => {
                return Err(lexer.error(
                    line,
                    column,
                    format!("unexpected character '{other}'"),
                ))
            }
        };

        tokens.push(Token { kind, line, column });
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, ModelError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.eof("unexpected end of input"))?;
        self.position += 1;
        Ok(token)
    }

    fn eof(&self, message: &str) -> ModelError {
        let (line, column) = self
            .tokens
            .last()
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        ModelError::Parse {
            line,
            column,
            message: message.to_string(),
        }
    }

    fn error(&self, token: &Token, message: String) -> ModelError {
        ModelError::Parse {
            line: token.line,
            column: token.column,
            message,
        }
    }

    fn expect(&mut self, expected: &TokenKind, context: &str) -> Result<Token, ModelError> {
        let token = self.next()?;
        if &token.kind == expected {
            Ok(token)
        } else {
            Err(self.error(
                &token,
                format!(
                    "expected {} {context}, found {}",
                    expected.describe(),
                    token.kind.describe()
                ),
            ))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ModelError> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Ident(name) if name == keyword => Ok(()),
            other => Err(self.error(
                &token,
                format!("expected '{keyword}', found {}", other.describe()),
            )),
        }
    }

    /// `field: value` pairs up to the closing brace, commas optional.
    fn fields(&mut self) -> Result<Vec<(Token, String, Token)>, ModelError> {
        self.expect(&TokenKind::LBrace, "to open a block")?;
        let mut fields = Vec::new();
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::RBrace => break,
                TokenKind::Comma => continue,
                TokenKind::Ident(ref name) => {
                    let name = name.clone();
                    self.expect(&TokenKind::Colon, "after field name")?;
                    let value = self.next()?;
                    match value.kind {
                        TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::Str(_) => {
                            fields.push((token, name, value));
                        }
                        ref other => {
                            return Err(self.error(
                                &value,
                                format!("expected a field value, found {}", other.describe()),
                            ))
                        }
                    }
                }
                ref other => {
                    return Err(self.error(
                        &token,
                        format!("expected a field name or '}}', found {}", other.describe()),
                    ))
                }
            }
        }
        Ok(fields)
    }

    fn number(&self, field: &str, value: &Token) -> Result<f64, ModelError> {
        match value.kind {
            TokenKind::Number(number) => Ok(number),
            ref other => Err(self.error(
                value,
                format!("{field} expects a number, found {}", other.describe()),
            )),
        }
    }

    fn name(&self, field: &str, value: &Token) -> Result<String, ModelError> {
        match &value.kind {
            TokenKind::Ident(name) => Ok(name.clone()),
            TokenKind::Str(text) => Ok(text.clone()),
            other => Err(self.error(
                value,
                format!("{field} expects a name, found {}", other.describe()),
            )),
        }
    }

    fn process(&mut self, kind: ProcessKind) -> Result<ProcessRecord, ModelError> {
        let id_token = self.next()?;
        let id = match &id_token.kind {
            TokenKind::Str(id) => id.clone(),
            other => {
                return Err(self.error(
                    &id_token,
                    format!("expected a quoted process id, found {}", other.describe()),
                ))
            }
        };

        let mut record = ProcessRecord::new(&id, kind);
        for (name_token, name, value) in self.fields()? {
            match name.as_str() {
                "trigger_mode" => {
                    let mode = self.name("trigger_mode", &value)?;
                    record.trigger_mode = Some(match mode.as_str() {
                        "Passive" => TriggerMode::Passive,
                        "Interactive" => TriggerMode::Interactive,
                        "Automatic" => TriggerMode::Automatic,
                        "Enabling" => TriggerMode::Enabling,
                        other => {
                            return Err(self.error(
                                &value,
                                format!("unknown trigger mode '{other}'"),
                            ))
                        }
                    });
                }
                "action" => record.action = Some(self.name("action", &value)?),
                "overflow" => {
                    let policy = self.name("overflow", &value)?;
                    record.overflow = Some(match policy.as_str() {
                        "Block" => simcraft_core::process::OverflowPolicy::Block,
                        "Drain" => simcraft_core::process::OverflowPolicy::Drain,
                        other => {
                            return Err(self.error(
                                &value,
                                format!("unknown overflow policy '{other}'"),
                            ))
                        }
                    });
                }
                "capacity" => record.capacity = Some(self.number("capacity", &value)?),
                "release_amount" => {
                    record.release_amount = Some(self.number("release_amount", &value)?)
                }
                "dt" => record.dt = Some(self.number("dt", &value)?),
                "initial_resources" => {
                    record.initial_resources = Some(self.number("initial_resources", &value)?)
                }
                other => {
                    return Err(self.error(
                        &name_token,
                        format!("unknown field '{other}' for {kind}"),
                    ))
                }
            }
        }
        Ok(record)
    }

    fn connection(&mut self, source_token: Token) -> Result<ConnectionRecord, ModelError> {
        let source = match &source_token.kind {
            TokenKind::Str(text) => text.clone(),
            other => {
                return Err(self.error(
                    &source_token,
                    format!("expected a quoted endpoint, found {}", other.describe()),
                ))
            }
        };
        self.expect(&TokenKind::Arrow, "between endpoints")?;
        let target_token = self.next()?;
        let target = match &target_token.kind {
            TokenKind::Str(text) => text.clone(),
            other => {
                return Err(self.error(
                    &target_token,
                    format!("expected a quoted endpoint, found {}", other.describe()),
                ))
            }
        };

        let (source_id, source_port) = split_endpoint(&source);
        let (target_id, target_port) = split_endpoint(&target);

        let mut record = ConnectionRecord::new(
            &format!("conn_{source_id}_{target_id}"),
            source_id,
            target_id,
        );
        record.source_port = source_port.map(str::to_string);
        record.target_port = target_port.map(str::to_string);

        for (name_token, name, value) in self.fields()? {
            match name.as_str() {
                "id" => record.id = self.name("id", &value)?,
                "flow_rate" => record.flow_rate = Some(self.number("flow_rate", &value)?),
                other => {
                    return Err(self.error(
                        &name_token,
                        format!("unknown field '{other}' for a connection"),
                    ))
                }
            }
        }
        Ok(record)
    }
}

/// Split an `"id.port"` endpoint at the first dot.
fn split_endpoint(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once('.') {
        Some((id, port)) => (id, Some(port)),
        None => (endpoint, None),
    }
}

/// Parse the inline DSL into a model document.
pub fn parse(input: &str) -> Result<ModelDocument, ModelError> {
    let mut parser = Parser {
        tokens: lex(input)?,
        position: 0,
    };
    let mut document = ModelDocument::default();

    parser.expect_keyword("processes")?;
    parser.expect(&TokenKind::LBrace, "to open the processes block")?;
    loop {
        let token = parser.next()?;
        match &token.kind {
            TokenKind::RBrace => break,
            TokenKind::Ident(kind_name) => {
                let kind = match kind_name.as_str() {
                    "source" => ProcessKind::Source,
                    "pool" => ProcessKind::Pool,
                    "drain" => ProcessKind::Drain,
                    "delay" => ProcessKind::Delay,
                    "stepper" => ProcessKind::Stepper,
                    other => {
                        return Err(parser.error(
                            &token,
                            format!("unknown process kind '{other}'"),
                        ))
                    }
                };
                let record = parser.process(kind)?;
                document.processes.push(record);
            }
            other => {
                return Err(parser.error(
                    &token,
                    format!("expected a process kind or '}}', found {}", other.describe()),
                ))
            }
        }
    }

    parser.expect_keyword("connections")?;
    parser.expect(&TokenKind::LBrace, "to open the connections block")?;
    loop {
        let token = parser.next()?;
        match &token.kind {
            TokenKind::RBrace => break,
            TokenKind::Str(_) => {
                let record = parser.connection(token.clone())?;
                document.connections.push(record);
            }
            other => {
                return Err(parser.error(
                    &token,
                    format!("expected an endpoint or '}}', found {}", other.describe()),
                ))
            }
        }
    }

    if let Some(extra) = parser.peek() {
        return Err(ModelError::Parse {
            line: extra.line,
            column: extra.column,
            message: format!("unexpected trailing {}", extra.kind.describe()),
        });
    }

    Ok(document)
}

// ===========================================================================
// Tests
// ===========================================================================
