//! `#if` expression parsing and evaluation
//!
//! Conditions are parsed once, when the file's tree is built, and evaluated
//! against each context's symbol table. The grammar is the C preprocessor
//! constant-expression grammar: integer arithmetic with C precedence,
//! short-circuit `&&`/`||`, the ternary operator and `defined`.

use super::symbols::{parse_integer_literal, SymbolTable};
use thiserror::Error;

/// Errors that make a condition undecidable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid integer literal '{0}'")]
    InvalidNumber(String),

    #[error("invalid character literal '{0}'")]
    InvalidChar(String),

    #[error("'defined' requires a macro name")]
    InvalidDefined,

    #[error("division by zero")]
    DivisionByZero,

    #[error("shift by {0} is out of range")]
    ShiftOutOfRange(i64),

    #[error("'{0}' is used as a function-like macro but is not defined")]
    UndefinedFunction(String),

    #[error("'{0}' is used as a function-like macro but is object-like")]
    NotFunctionLike(String),

    #[error("function-like macro '{0}' cannot be expanded in a condition")]
    UnexpandedCall(String),
}

/// Builtins that query the toolchain. No compiler is consulted, and
/// includes are opaque, so these are always 0.
const TOOLCHAIN_QUERIES: &[&str] = &[
    "__has_include",
    "__has_include_next",
    "__has_feature",
    "__has_extension",
    "__has_builtin",
    "__has_attribute",
    "__has_cpp_attribute",
    "__has_c_attribute",
    "__has_declspec_attribute",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    fn from_punct(p: &str) -> Option<Self> {
        Some(match p {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&" => BinaryOp::BitAnd,
            "^" => BinaryOp::BitXor,
            "|" => BinaryOp::BitOr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Binding strength, higher binds tighter
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 10,
        }
    }
}

/// Parsed condition expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Ident(String),
    Defined(String),
    /// `NAME(...)`; the argument text is kept only for messages
    Call { name: String, args: String },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Preprocessing number, converted when used as an operand
    Number(String),
    Ident(String),
    Char(String),
    Punct(&'static str),
    /// Anything else: string literals, `.`, `#`; only valid in call arguments
    Other(String),
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Number(s) | Token::Ident(s) | Token::Char(s) | Token::Other(s) => s.clone(),
            Token::Punct(p) => p.to_string(),
        }
    }
}

const PUNCTUATORS: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "(", ")", "!", "~", "*", "/", "%", "+", "-",
    "<", ">", "&", "^", "|", "?", ":", ",",
];

fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.' || chars[i] == '\'')
            {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            // Character literal with an encoding prefix, e.g. L'a'
            if chars.get(i) == Some(&'\'') && matches!(word.as_str(), "L" | "u" | "U" | "u8") {
                let (lit, end) = read_quoted(&chars, i, '\'');
                tokens.push(Token::Char(lit));
                i = end;
            } else {
                tokens.push(Token::Ident(word));
            }
            continue;
        }

        if c == '\'' || c == '"' {
            let (lit, end) = read_quoted(&chars, i, c);
            tokens.push(if c == '\'' { Token::Char(lit) } else { Token::Other(lit) });
            i = end;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        if let Some(p) = PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) {
            tokens.push(Token::Punct(*p));
            i += p.len();
            continue;
        }

        tokens.push(Token::Other(c.to_string()));
        i += 1;
    }

    tokens
}

/// Read a quoted literal starting at `start`; returns the literal body
/// without prefix or quotes, and the index after the closing quote.
fn read_quoted(chars: &[char], start: usize, quote: char) -> (String, usize) {
    let mut i = start + 1;
    let mut body = String::new();
    while i < chars.len() && chars[i] != quote {
        if chars[i] == '\\' && i + 1 < chars.len() {
            body.push(chars[i]);
            i += 1;
        }
        body.push(chars[i]);
        i += 1;
    }
    (body, (i + 1).min(chars.len()))
}

fn char_value(body: &str) -> Result<i64, ExprError> {
    let invalid = || ExprError::InvalidChar(body.to_string());
    let mut chars = body.chars();
    let value = match chars.next().ok_or_else(invalid)? {
        '\\' => {
            let escaped = chars.next().ok_or_else(invalid)?;
            match escaped {
                'n' => 10,
                't' => 9,
                'r' => 13,
                'a' => 7,
                'b' => 8,
                'f' => 12,
                'v' => 11,
                'x' => {
                    let hex: String = chars.by_ref().collect();
                    return i64::from_str_radix(&hex, 16).map_err(|_| invalid());
                }
                '0'..='7' => {
                    let oct: String = std::iter::once(escaped).chain(chars.by_ref()).collect();
                    return i64::from_str_radix(&oct, 8).map_err(|_| invalid());
                }
                other => other as i64,
            }
        }
        c => c as i64,
    };
    if chars.next().is_some() {
        return Err(invalid());
    }
    Ok(value)
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
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExprError> {
        match self.next() {
            Some(Token::Punct(p)) if p == punct => Ok(()),
            Some(other) => Err(ExprError::UnexpectedToken(other.text())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    /// conditional = binary ('?' conditional ':' conditional)?
    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_binary(1)?;
        if self.eat("?") {
            let then = self.parse_conditional()?;
            self.expect(":")?;
            let otherwise = self.parse_conditional()?;
            return Ok(Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        Ok(cond)
    }

    /// Precedence climbing over left-associative binary operators
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(p)) => match BinaryOp::from_punct(p) {
                    Some(op) if op.precedence() >= min_prec => op,
                    _ => break,
                },
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_binary(op.precedence() + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Some(Token::Punct("!")) => UnaryOp::Not,
            Some(Token::Punct("-")) => UnaryOp::Neg,
            Some(Token::Punct("+")) => UnaryOp::Plus,
            Some(Token::Punct("~")) => UnaryOp::BitNot,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.parse_unary()?)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(text)) => parse_integer_literal(&text)
                .map(Expr::Number)
                .ok_or(ExprError::InvalidNumber(text)),
            Some(Token::Char(body)) => char_value(&body).map(Expr::Number),
            Some(Token::Punct("(")) => {
                let inner = self.parse_conditional()?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "defined" => self.parse_defined(),
            Some(Token::Ident(name)) => {
                if self.eat("(") {
                    let args = self.skip_call_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.text())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    /// defined NAME | defined ( NAME )
    fn parse_defined(&mut self) -> Result<Expr, ExprError> {
        let parens = self.eat("(");
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(ExprError::InvalidDefined),
        };
        if parens {
            self.expect(")").map_err(|_| ExprError::InvalidDefined)?;
        }
        Ok(Expr::Defined(name))
    }

    /// Consume balanced call arguments after `(`; returns their text
    fn skip_call_args(&mut self) -> Result<String, ExprError> {
        let mut depth = 1;
        let mut parts = Vec::new();
        while let Some(token) = self.next() {
            match token {
                Token::Punct("(") => depth += 1,
                Token::Punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(parts.join(" "));
                    }
                }
                _ => {}
            }
            parts.push(token.text());
        }
        Err(ExprError::UnexpectedEnd)
    }
}

/// Parse the text of an `#if`/`#elif` condition
pub fn parse_expression(text: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_conditional()?;
    match parser.next() {
        None => Ok(expr),
        Some(extra) => Err(ExprError::UnexpectedToken(extra.text())),
    }
}

fn truth(value: bool) -> i64 {
    value as i64
}

impl Expr {
    /// Evaluate against a symbol table.
    ///
    /// Defined identifiers take their numeric value, undefined ones are 0.
    /// Operands skipped by `&&`, `||` and `?:` are not evaluated, so errors
    /// inside them do not surface.
    pub fn evaluate(&self, symbols: &SymbolTable) -> Result<i64, ExprError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Ident(name) => Ok(match symbols.get(name) {
                Some(def) => def.numeric_value(),
                None if name == "true" => 1,
                None => 0,
            }),
            Expr::Defined(name) => Ok(truth(symbols.is_defined(name))),
            Expr::Call { name, .. } => {
                if TOOLCHAIN_QUERIES.contains(&name.as_str()) {
                    return Ok(0);
                }
                Err(match symbols.get(name) {
                    None => ExprError::UndefinedFunction(name.clone()),
                    Some(def) if !def.is_function_like() => ExprError::NotFunctionLike(name.clone()),
                    Some(_) => ExprError::UnexpandedCall(name.clone()),
                })
            }
            Expr::Unary(op, operand) => {
                let v = operand.evaluate(symbols)?;
                Ok(match op {
                    UnaryOp::Not => truth(v == 0),
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Plus => v,
                    UnaryOp::BitNot => !v,
                })
            }
            Expr::Conditional(cond, then, otherwise) => {
                if cond.evaluate(symbols)? != 0 {
                    then.evaluate(symbols)
                } else {
                    otherwise.evaluate(symbols)
                }
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if lhs.evaluate(symbols)? == 0 {
                    return Ok(0);
                }
                Ok(truth(rhs.evaluate(symbols)? != 0))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if lhs.evaluate(symbols)? != 0 {
                    return Ok(1);
                }
                Ok(truth(rhs.evaluate(symbols)? != 0))
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.evaluate(symbols)?;
                let b = rhs.evaluate(symbols)?;
                apply_binary(*op, a, b)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, a: i64, b: i64) -> Result<i64, ExprError> {
    Ok(match op {
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Rem => a.wrapping_rem(b),
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Shl | BinaryOp::Shr => {
            let amount = u32::try_from(b)
                .ok()
                .filter(|n| *n < 64)
                .ok_or(ExprError::ShiftOutOfRange(b))?;
            if op == BinaryOp::Shl {
                a.wrapping_shl(amount)
            } else {
                a.wrapping_shr(amount)
            }
        }
        BinaryOp::Lt => truth(a < b),
        BinaryOp::Le => truth(a <= b),
        BinaryOp::Gt => truth(a > b),
        BinaryOp::Ge => truth(a >= b),
        BinaryOp::Eq => truth(a == b),
        BinaryOp::Ne => truth(a != b),
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::BitOr => a | b,
        BinaryOp::And => truth(a != 0 && b != 0),
        BinaryOp::Or => truth(a != 0 || b != 0),
    })
}
