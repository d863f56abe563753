//! Expression parser.
//!
//! Tokenizer plus recursive descent parser for a Python-like expression
//! subset. Errors carry the byte offset of the offending token.
//!
//! Precedence, lowest first:
//! conditional, `or`, `and`, `not`, comparisons, `+ -`, `* / // %`,
//! unary `+ -`, `**`, postfix (call, attribute, subscript).

use crate::domain::error::ParseError;
use crate::domain::expr::{BinaryOp, BoolOp, CmpOp, Expr, Literal, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

const OPERATORS: [&str; 22] = [
    "**", "//", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "<", ">", "(", ")", "[",
    "]", ",", ".", "=", ":", "!",
];

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let pos = self.pos;
            let Some(ch) = self.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    pos,
                });
                return Ok(tokens);
            };

            let token = if ch.is_ascii_digit()
                || (ch == '.' && self.remaining()[1..].starts_with(|c: char| c.is_ascii_digit()))
            {
                self.number()?
            } else if ch == '\'' || ch == '"' {
                self.string(ch)?
            } else if ch.is_alphabetic() || ch == '_' {
                self.identifier()
            } else {
                self.operator()?
            };
            tokens.push(Spanned { token, pos });
        }
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let mut is_float = false;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' {
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                self.advance();
            } else if (ch == 'e' || ch == 'E') && self.pos > start {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ParseError {
                    message: format!("invalid number: {}", text),
                    position: start,
                })
        } else {
            text.parse::<i64>().map(Token::Int).map_err(|_| ParseError {
                message: format!("invalid integer: {}", text),
                position: start,
            })
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(ch) if ch == quote => return Ok(Token::Str(value)),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => value.push(other),
                    None => break,
                },
                Some(ch) => value.push(ch),
                None => break,
            }
        }
        Err(ParseError {
            message: "unterminated string literal".to_string(),
            position: start,
        })
    }

    fn identifier(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Token::Ident(self.input[start..self.pos].to_string())
    }

    fn operator(&mut self) -> Result<Token, ParseError> {
        let remaining = self.remaining();
        for op in OPERATORS {
            if remaining.starts_with(op) {
                self.pos += op.len();
                return Ok(Token::Op(op));
            }
        }
        let found = self.peek().map(|c| c.to_string()).unwrap_or_default();
        Err(ParseError {
            message: format!("unexpected character '{}'", found),
            position: self.pos,
        })
    }
}

const RESERVED: [&str; 10] = [
    "and", "or", "not", "in", "is", "if", "else", "True", "False", "None",
];

/// Nesting limit for parentheses, unary operators and sub-expressions.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            index: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[i].token
    }

    fn pos(&self) -> usize {
        self.tokens[self.index].pos
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].token.clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn describe(token: &Token) -> String {
        match token {
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Str(s) => format!("'{}'", s),
            Token::Ident(s) => s.clone(),
            Token::Op(op) => op.to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            position: self.pos(),
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == keyword)
    }

    fn consume_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ParseError> {
        if self.consume_op(op) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected '{}', found {}",
                op,
                Self::describe(self.peek())
            )))
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let body = self.parse_or()?;
        if self.consume_keyword("if") {
            let test = self.parse_or()?;
            if !self.consume_keyword("else") {
                return Err(self.error(format!(
                    "expected 'else', found {}",
                    Self::describe(self.peek())
                )));
            }
            let orelse = self.parse_expression()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_and()?;
        let mut values = vec![first];
        while self.consume_keyword("or") {
            values.push(self.parse_and()?);
        }
        Ok(Self::fold_bool(BoolOp::Or, values))
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_not()?;
        let mut values = vec![first];
        while self.consume_keyword("and") {
            values.push(self.parse_not()?);
        }
        Ok(Self::fold_bool(BoolOp::And, values))
    }

    fn fold_bool(op: BoolOp, mut values: Vec<Expr>) -> Expr {
        if values.len() == 1 {
            values.remove(0)
        } else {
            Expr::BoolOp { op, values }
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword("not") {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let (op, width) = match (self.peek(), self.peek_at(1)) {
            (Token::Op("<"), _) => (CmpOp::Lt, 1),
            (Token::Op("<="), _) => (CmpOp::Le, 1),
            (Token::Op(">"), _) => (CmpOp::Gt, 1),
            (Token::Op(">="), _) => (CmpOp::Ge, 1),
            (Token::Op("=="), _) => (CmpOp::Eq, 1),
            (Token::Op("!="), _) => (CmpOp::Ne, 1),
            (Token::Ident(s), _) if s == "in" => (CmpOp::In, 1),
            (Token::Ident(s), Token::Ident(n)) if s == "is" && n == "not" => (CmpOp::IsNot, 2),
            (Token::Ident(s), _) if s == "is" => (CmpOp::Is, 1),
            (Token::Ident(s), Token::Ident(n)) if s == "not" && n == "in" => (CmpOp::NotIn, 2),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push((op, self.parse_arith()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinaryOp::Add,
                Token::Op("-") => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinaryOp::Mul,
                Token::Op("/") => BinaryOp::Div,
                Token::Op("//") => BinaryOp::FloorDiv,
                Token::Op("%") => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Op("+") => Some(UnaryOp::Plus),
            Token::Op("-") => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::parse_factor)?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.consume_op("**") {
            // Right-associative, binds tighter than a unary minus on its left.
            let exponent = self.nested(Self::parse_factor)?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.consume_op(".") {
                match self.advance() {
                    Token::Ident(attr) if !RESERVED.contains(&attr.as_str()) => {
                        expr = Expr::Attribute {
                            value: Box::new(expr),
                            attr,
                        };
                    }
                    other => {
                        return Err(ParseError {
                            message: format!(
                                "expected attribute name, found {}",
                                Self::describe(&other)
                            ),
                            position: self.tokens[self.index.saturating_sub(1)].pos,
                        });
                    }
                }
            } else if self.consume_op("(") {
                let (args, keywords) = self.parse_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    keywords,
                };
            } else if self.consume_op("[") {
                let index = self.parse_expression()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if self.consume_op(")") {
            return Ok((args, keywords));
        }
        loop {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Ident(name), Token::Op("=")) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                keywords.push((name, self.parse_expression()?));
            } else {
                if !keywords.is_empty() {
                    return Err(self.error(
                        "positional argument follows keyword argument".to_string(),
                    ));
                }
                args.push(self.parse_expression()?);
            }

            if self.consume_op(")") {
                return Ok((args, keywords));
            }
            self.expect_op(",")?;
            if self.consume_op(")") {
                return Ok((args, keywords));
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        match self.advance() {
            Token::Int(v) => Ok(Expr::Literal(Literal::Int(v))),
            Token::Float(v) => Ok(Expr::Literal(Literal::Float(v))),
            Token::Str(mut s) => {
                // Adjacent string literals concatenate.
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Literal::Str(s)))
            }
            Token::Ident(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Literal::Bool(true))),
                "False" => Ok(Expr::Literal(Literal::Bool(false))),
                "None" => Ok(Expr::Literal(Literal::None)),
                kw if RESERVED.contains(&kw) => Err(ParseError {
                    message: format!("unexpected keyword '{}'", kw),
                    position: pos,
                }),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                let inner = self.parse_expression()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => {
                let mut items = Vec::new();
                if !self.consume_op("]") {
                    loop {
                        items.push(self.parse_expression()?);
                        if self.consume_op("]") {
                            break;
                        }
                        self.expect_op(",")?;
                        if self.consume_op("]") {
                            break;
                        }
                    }
                }
                Ok(Expr::List(items))
            }
            other => Err(ParseError {
                message: format!("expected expression, found {}", Self::describe(&other)),
                position: pos,
            }),
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek(), Token::Eof) {
            return Err(self.error("empty expression".to_string()));
        }
        let expr = self.parse_expression()?;
        if !matches!(self.peek(), Token::Eof) {
            return Err(self.error(format!(
                "unexpected input after expression: {}",
                Self::describe(self.peek())
            )));
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens).parse()
}
