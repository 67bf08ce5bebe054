//! Lexer and recursive-descent parser.

use super::ast::{CompareOp, Condition, Operand, SetOperand, SetValue, Update, UpdateAction};
use thiserror::Error;

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unresolved attribute name placeholder {0}")]
    UnresolvedName(String),

    #[error("unresolved attribute value placeholder {0}")]
    UnresolvedValue(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}

pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Value(String),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Dot,
    LBracket,
    RBracket,
}

fn tokenize(src: &str) -> ExpressionResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' | ':' | '_' | 'a'..='z' | 'A'..='Z' => {
                chars.next();
                let mut end = start + c.len_utf8();
                while let Some(&(i, n)) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = i + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &src[start..end];
                if (c == '#' || c == ':') && word.len() == 1 {
                    return Err(ExpressionError::Syntax(format!(
                        "empty placeholder at offset {}",
                        start
                    )));
                }
                tokens.push(if c == ':' {
                    Token::Value(word.to_string())
                } else {
                    Token::Name(word.to_string())
                });
            }
            '0'..='9' => {
                return Err(ExpressionError::Unsupported(format!(
                    "literal at offset {}; use a :placeholder",
                    start
                )))
            }
            _ => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '.' => Token::Dot,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '=' => Token::Op(CompareOp::Eq),
                    '<' => match chars.peek().map(|&(_, n)| n) {
                        Some('>') => {
                            chars.next();
                            Token::Op(CompareOp::Ne)
                        }
                        Some('=') => {
                            chars.next();
                            Token::Op(CompareOp::Le)
                        }
                        _ => Token::Op(CompareOp::Lt),
                    },
                    '>' => match chars.peek().map(|&(_, n)| n) {
                        Some('=') => {
                            chars.next();
                            Token::Op(CompareOp::Ge)
                        }
                        _ => Token::Op(CompareOp::Gt),
                    },
                    other => {
                        return Err(ExpressionError::Syntax(format!(
                            "unexpected character '{}' at offset {}",
                            other, start
                        )))
                    }
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

const RESERVED: &[&str] = &[
    "AND", "OR", "NOT", "BETWEEN", "IN", "SET", "REMOVE", "ADD", "DELETE",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> ExpressionResult<Self> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Syntax("empty expression".to_string()));
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_call(&self, function: &str) -> bool {
        self.at_keyword(function) && self.peek_at(1) == Some(&Token::LParen)
    }

    fn expect(&mut self, expected: Token) -> ExpressionResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(unexpected(other, &format!("{:?}", expected))),
        }
    }

    fn expect_end(&self) -> ExpressionResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExpressionError::Syntax(format!(
                "unexpected trailing {:?}",
                token
            ))),
        }
    }

    // Conditions

    fn condition(&mut self) -> ExpressionResult<Condition> {
        let mut left = self.conjunction()?;
        while self.eat_keyword("OR") {
            let right = self.conjunction()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> ExpressionResult<Condition> {
        let mut left = self.negation()?;
        while self.eat_keyword("AND") {
            let right = self.negation()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn negation(&mut self) -> ExpressionResult<Condition> {
        if self.eat_keyword("NOT") {
            return Ok(Condition::Not(Box::new(self.negation()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> ExpressionResult<Condition> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.condition()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        if self.at_call("attribute_exists") || self.at_call("attribute_not_exists") {
            let exists = self.at_keyword("attribute_exists");
            self.pos += 2;
            let path = self.path()?;
            self.expect(Token::RParen)?;
            return Ok(if exists {
                Condition::AttributeExists(path)
            } else {
                Condition::AttributeNotExists(path)
            });
        }

        if self.at_call("begins_with") || self.at_call("contains") {
            let begins = self.at_keyword("begins_with");
            self.pos += 2;
            let subject = self.operand()?;
            self.expect(Token::Comma)?;
            let argument = self.operand()?;
            self.expect(Token::RParen)?;
            return Ok(if begins {
                Condition::BeginsWith(subject, argument)
            } else {
                Condition::Contains(subject, argument)
            });
        }

        let value = self.operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.next();
            let right = self.operand()?;
            return Ok(Condition::Compare {
                left: value,
                op,
                right,
            });
        }

        if self.eat_keyword("BETWEEN") {
            let low = self.operand()?;
            if !self.eat_keyword("AND") {
                return Err(unexpected(self.peek().cloned(), "AND"));
            }
            let high = self.operand()?;
            return Ok(Condition::Between { value, low, high });
        }

        if self.eat_keyword("IN") {
            self.expect(Token::LParen)?;
            let mut list = vec![self.operand()?];
            while self.peek() == Some(&Token::Comma) {
                self.next();
                list.push(self.operand()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Condition::In { value, list });
        }

        Err(unexpected(self.peek().cloned(), "comparison"))
    }

    fn operand(&mut self) -> ExpressionResult<Operand> {
        if self.at_call("size") {
            self.pos += 2;
            let path = self.path()?;
            self.expect(Token::RParen)?;
            return Ok(Operand::Size(path));
        }
        match self.peek() {
            Some(Token::Value(v)) => {
                let v = v.clone();
                self.next();
                Ok(Operand::Value(v))
            }
            _ => Ok(Operand::Path(self.path()?)),
        }
    }

    fn path(&mut self) -> ExpressionResult<String> {
        match self.next() {
            Some(Token::Name(name)) => {
                if RESERVED.iter().any(|r| name.eq_ignore_ascii_case(r)) {
                    return Err(ExpressionError::Syntax(format!(
                        "reserved word {} used as attribute name",
                        name
                    )));
                }
                if matches!(self.peek(), Some(Token::Dot) | Some(Token::LBracket)) {
                    return Err(ExpressionError::Unsupported(format!(
                        "nested attribute path under {}",
                        name
                    )));
                }
                Ok(name)
            }
            other => Err(unexpected(other, "attribute name")),
        }
    }

    // Updates

    fn update(&mut self) -> ExpressionResult<Update> {
        let mut update = Update::default();
        let mut seen: Vec<&'static str> = Vec::new();

        while self.peek().is_some() {
            let clause = match self.peek() {
                Some(Token::Name(n)) if n.eq_ignore_ascii_case("SET") => "SET",
                Some(Token::Name(n)) if n.eq_ignore_ascii_case("REMOVE") => "REMOVE",
                Some(Token::Name(n)) if n.eq_ignore_ascii_case("ADD") => "ADD",
                Some(Token::Name(n)) if n.eq_ignore_ascii_case("DELETE") => {
                    return Err(ExpressionError::Unsupported(
                        "DELETE clause (no set types)".to_string(),
                    ))
                }
                other => return Err(unexpected(other.cloned(), "SET, REMOVE or ADD")),
            };
            if seen.contains(&clause) {
                return Err(ExpressionError::Syntax(format!(
                    "{} clause appears more than once",
                    clause
                )));
            }
            seen.push(clause);
            self.next();

            loop {
                let action = match clause {
                    "SET" => {
                        let path = self.path()?;
                        self.expect(Token::Op(CompareOp::Eq))?;
                        UpdateAction::Set {
                            path,
                            value: self.set_value()?,
                        }
                    }
                    "REMOVE" => UpdateAction::Remove { path: self.path()? },
                    _ => UpdateAction::Add {
                        path: self.path()?,
                        value: self.operand()?,
                    },
                };
                update.actions.push(action);

                if self.peek() == Some(&Token::Comma) {
                    self.next();
                } else {
                    break;
                }
            }
        }

        Ok(update)
    }

    fn set_value(&mut self) -> ExpressionResult<SetValue> {
        let first = self.set_operand()?;
        match self.peek() {
            Some(Token::Plus) => {
                self.next();
                Ok(SetValue::Plus(first, self.set_operand()?))
            }
            Some(Token::Minus) => {
                self.next();
                Ok(SetValue::Minus(first, self.set_operand()?))
            }
            _ => Ok(SetValue::Single(first)),
        }
    }

    fn set_operand(&mut self) -> ExpressionResult<SetOperand> {
        if self.at_call("if_not_exists") {
            self.pos += 2;
            let path = self.path()?;
            self.expect(Token::Comma)?;
            let fallback = self.operand()?;
            self.expect(Token::RParen)?;
            return Ok(SetOperand::IfNotExists(path, fallback));
        }
        if self.at_call("list_append") {
            self.pos += 2;
            let first = self.set_operand()?;
            self.expect(Token::Comma)?;
            let second = self.set_operand()?;
            self.expect(Token::RParen)?;
            return Ok(SetOperand::ListAppend(Box::new(first), Box::new(second)));
        }
        Ok(SetOperand::Operand(self.operand()?))
    }

    // Projections

    fn projection(&mut self) -> ExpressionResult<Vec<String>> {
        let mut paths = vec![self.path()?];
        while self.peek() == Some(&Token::Comma) {
            self.next();
            paths.push(self.path()?);
        }
        Ok(paths)
    }
}

fn unexpected(found: Option<Token>, expected: &str) -> ExpressionError {
    match found {
        Some(token) => ExpressionError::Syntax(format!("expected {}, found {:?}", expected, token)),
        None => ExpressionError::Syntax(format!("expected {}, found end of expression", expected)),
    }
}

/// Parse a condition, filter or key condition expression.
pub fn parse_condition(src: &str) -> ExpressionResult<Condition> {
    let mut parser = Parser::new(src)?;
    let condition = parser.condition()?;
    parser.expect_end()?;
    Ok(condition)
}

pub fn parse_update(src: &str) -> ExpressionResult<Update> {
    let mut parser = Parser::new(src)?;
    let update = parser.update()?;
    parser.expect_end()?;
    Ok(update)
}

/// Parse a comma-separated projection into attribute paths.
pub fn parse_projection(src: &str) -> ExpressionResult<Vec<String>> {
    let mut parser = Parser::new(src)?;
    let paths = parser.projection()?;
    parser.expect_end()?;
    Ok(paths)
}
