//! Condition expression parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr       := and ("or" and)*
//! and        := unary ("and" unary)*
//! unary      := "not" unary | primary
//! primary    := "(" expr ")" | "true" | "false" | comparison
//! comparison := operand (op literal)?
//! operand    := path ("%" number)?
//! ```

use super::ast::{CompareOp, Expression, Literal, Operand};
use crate::sdk::error::GraphError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Op(CompareOp),
    Percent,
    LParen,
    RParen,
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, GraphError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(GraphError::Condition(format!(
            "unexpected {:?} in '{}'",
            token, input
        ))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, GraphError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| {
                        GraphError::Condition(format!("unterminated string in '{}'", input))
                    })?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CompareOp::Eq, 2),
                    ('!', Some('=')) => (CompareOp::NotEq, 2),
                    ('>', Some('=')) => (CompareOp::Gte, 2),
                    ('<', Some('=')) => (CompareOp::Lte, 2),
                    ('>', _) => (CompareOp::Gt, 1),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => {
                        return Err(GraphError::Condition(format!(
                            "unexpected '{}' in '{}'",
                            c, input
                        )))
                    }
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| {
                    GraphError::Condition(format!("invalid number '{}' in '{}'", text, input))
                })?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word == "contains" {
                    tokens.push(Token::Op(CompareOp::Contains));
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
            other => {
                return Err(GraphError::Condition(format!(
                    "unexpected '{}' in '{}'",
                    other, input
                )))
            }
        }
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expression, GraphError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, GraphError> {
        let mut left = self.unary()?;
        while self.eat_keyword("and") {
            let right = self.unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, GraphError> {
        if self.eat_keyword("not") {
            return Ok(Expression::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, GraphError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(GraphError::Condition(format!(
                        "expected ')', found {:?}",
                        other
                    ))),
                }
            }
            Some(Token::Ident(word)) if word == "true" => Ok(Expression::True),
            Some(Token::Ident(word)) if word == "false" => Ok(Expression::False),
            Some(Token::Ident(path)) => self.comparison(path),
            other => Err(GraphError::Condition(format!(
                "expected a field, '(' or boolean, found {:?}",
                other
            ))),
        }
    }

    fn comparison(&mut self, path: String) -> Result<Expression, GraphError> {
        let mut left = Operand::path(path);

        if matches!(self.peek(), Some(Token::Percent)) {
            self.pos += 1;
            match self.next() {
                Some(Token::Number(n)) if n != 0.0 => left.modulo = Some(n),
                other => {
                    return Err(GraphError::Condition(format!(
                        "expected a non-zero number after '%', found {:?}",
                        other
                    )))
                }
            }
        }

        let op = match self.peek() {
            Some(Token::Op(op)) => *op,
            _ => return Ok(Expression::Truthy(left)),
        };
        self.pos += 1;

        let right = self.literal()?;
        Ok(Expression::Compare { left, op, right })
    }

    fn literal(&mut self) -> Result<Literal, GraphError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::String(s)),
            Some(Token::Number(n)) => Ok(Literal::Number(n)),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Literal::Boolean(true)),
                "false" => Ok(Literal::Boolean(false)),
                "null" => Ok(Literal::Null),
                _ => Err(GraphError::Condition(format!(
                    "expected a literal, found '{}' (quote strings)",
                    word
                ))),
            },
            other => Err(GraphError::Condition(format!(
                "expected a literal, found {:?}",
                other
            ))),
        }
    }
}
