//! Safe expression engine: a restricted grammar evaluated against a
//! name→value environment.
//!
//! The grammar covers literals, environment names, unary `+ - not`, binary
//! `+ - * / %`, chained comparisons (`a < b < c`), `is` / `is not`, `in` /
//! `not in`, short-circuit `and` / `or`, the conditional `A if C else B`, and
//! positional calls into the builtin table. Everything else — attribute
//! access, indexing, collection literals, comprehensions, assignment,
//! lambdas, keyword arguments — is rejected at parse time.
//!
//! Parsing bounds nesting depth so evaluation recursion is bounded by
//! construction. Apart from the clock builtins, evaluation is a pure function
//! of the expression text and the environment.

use std::collections::HashMap;

use crate::builtins;
use crate::error::ExprError;
use crate::value::Value;

/// Default cap on expression nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    BoolChain(BoolOp, Vec<Expr>),
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    In,
    NotIn,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Tok>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    return Err(ExprError::Disallowed("operator '**'".to_string()));
                }
                tokens.push(Tok::Star);
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    return Err(ExprError::Disallowed("operator '//'".to_string()));
                }
                tokens.push(Tok::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Tok::Percent);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::EqEq);
                } else {
                    return Err(ExprError::Disallowed("assignment".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::NotEq);
                } else {
                    return Err(ExprError::Syntax("unexpected character '!'".to_string()));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::LtEq);
                } else {
                    tokens.push(Tok::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::GtEq);
                } else {
                    tokens.push(Tok::Gt);
                }
            }
            '\'' | '"' => {
                tokens.push(Tok::Str(lex_string(&mut chars)?));
            }
            '0'..='9' => {
                tokens.push(lex_number(&mut chars)?);
            }
            '.' => {
                chars.next();
                if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                    // Leading-dot float literal such as `.5`.
                    let mut digits = String::from("0.");
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let parsed = digits
                        .parse::<f64>()
                        .map_err(|_| ExprError::Syntax(format!("invalid number '{digits}'")))?;
                    tokens.push(Tok::Float(parsed));
                } else {
                    return Err(ExprError::Disallowed("attribute access".to_string()));
                }
            }
            '[' | ']' => {
                return Err(ExprError::Disallowed(
                    "subscript or list literal".to_string(),
                ));
            }
            '{' | '}' => {
                return Err(ExprError::Disallowed("dict or set literal".to_string()));
            }
            ':' => {
                return Err(ExprError::Disallowed("colon construct".to_string()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Ident(ident));
            }
            other => {
                return Err(ExprError::Syntax(format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

fn lex_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, ExprError> {
    let quote = chars.next().expect("caller checked quote");
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => {
                    // Unknown escapes pass through verbatim, backslash included.
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ExprError::Syntax("unterminated string literal".to_string())),
            },
            Some(c) if c == quote => return Ok(out),
            Some(c) => out.push(c),
            None => return Err(ExprError::Syntax("unterminated string literal".to_string())),
        }
    }
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Tok, ExprError> {
    let mut text = String::new();
    let mut is_float = false;
    while let Some(&d) = chars.peek() {
        if d.is_ascii_digit() {
            text.push(d);
            chars.next();
        } else {
            break;
        }
    }
    if chars.peek() == Some(&'.') {
        let mut lookahead = chars.clone();
        lookahead.next();
        // A digit must follow the dot, else the dot is attribute access.
        if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            chars.next();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    text.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }
    if matches!(chars.peek(), Some(&'e') | Some(&'E')) {
        let mut lookahead = chars.clone();
        lookahead.next();
        let mut sign = None;
        if matches!(lookahead.peek(), Some(&'+') | Some(&'-')) {
            sign = lookahead.peek().copied();
            lookahead.next();
        }
        if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('e');
            chars.next();
            if let Some(sign) = sign {
                text.push(sign);
                chars.next();
            }
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    text.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }
    if is_float {
        text.parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| ExprError::Syntax(format!("invalid number '{text}'")))
    } else {
        text.parse::<i64>()
            .map(Tok::Int)
            .map_err(|_| ExprError::Syntax(format!("integer literal '{text}' out of range")))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

/// Parses an expression with the default nesting cap.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    parse_with_depth(source, DEFAULT_MAX_DEPTH)
}

pub fn parse_with_depth(source: &str, max_depth: usize) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    let expr = parser.parse_expression()?;
    if let Some(tok) = parser.peek() {
        return Err(ExprError::Syntax(format!(
            "unexpected trailing token {tok:?}"
        )));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(w)) if w == word)
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ExprError::Syntax(format!(
                "expression nesting exceeds depth limit {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_expression(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let body = self.parse_or()?;
        // `A if C else B` — the condition sits between the keywords.
        let expr = if self.eat_ident("if") {
            let condition = self.parse_or()?;
            if !self.eat_ident("else") {
                return Err(ExprError::Syntax(
                    "conditional expression is missing 'else'".to_string(),
                ));
            }
            let otherwise = self.parse_expression()?;
            Expr::Ternary {
                condition: Box::new(condition),
                then: Box::new(body),
                otherwise: Box::new(otherwise),
            }
        } else {
            body
        };
        self.leave();
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let first = self.parse_and()?;
        let mut operands = vec![first];
        while self.eat_ident("or") {
            operands.push(self.parse_and()?);
        }
        self.leave();
        Ok(if operands.len() == 1 {
            operands.pop().expect("one operand")
        } else {
            Expr::BoolChain(BoolOp::Or, operands)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let first = self.parse_not()?;
        let mut operands = vec![first];
        while self.eat_ident("and") {
            operands.push(self.parse_not()?);
        }
        self.leave();
        Ok(if operands.len() == 1 {
            operands.pop().expect("one operand")
        } else {
            Expr::BoolChain(BoolOp::And, operands)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let expr = if self.eat_ident("not") {
            Expr::Unary(UnaryOp::Not, Box::new(self.parse_not()?))
        } else {
            self.parse_comparison()?
        };
        self.leave();
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.parse_cmp_op() {
            rest.push((op, self.parse_additive()?));
        }
        self.leave();
        Ok(if rest.is_empty() {
            first
        } else {
            Expr::Compare {
                first: Box::new(first),
                rest,
            }
        })
    }

    fn parse_cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Some(Tok::EqEq) => Some(CmpOp::Eq),
            Some(Tok::NotEq) => Some(CmpOp::Ne),
            Some(Tok::Lt) => Some(CmpOp::Lt),
            Some(Tok::LtEq) => Some(CmpOp::Le),
            Some(Tok::Gt) => Some(CmpOp::Gt),
            Some(Tok::GtEq) => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            return Some(op);
        }
        if self.peek_ident("is") {
            self.pos += 1;
            return Some(if self.eat_ident("not") {
                CmpOp::IsNot
            } else {
                CmpOp::Is
            });
        }
        if self.peek_ident("in") {
            self.pos += 1;
            return Some(CmpOp::In);
        }
        // Only `not in` binds here; bare `not` belongs to parse_not.
        if self.peek_ident("not")
            && matches!(self.tokens.get(self.pos + 1), Some(Tok::Ident(w)) if w == "in")
        {
            self.pos += 2;
            return Some(CmpOp::NotIn);
        }
        None
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        self.leave();
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        self.leave();
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let expr = match self.peek() {
            Some(Tok::Minus) => {
                self.pos += 1;
                Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?))
            }
            Some(Tok::Plus) => {
                self.pos += 1;
                Expr::Unary(UnaryOp::Pos, Box::new(self.parse_unary()?))
            }
            _ => self.parse_primary()?,
        };
        self.leave();
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let expr = match self.next() {
            Some(Tok::Int(i)) => Expr::Literal(Value::Integer(i)),
            Some(Tok::Float(f)) => Expr::Literal(Value::Float(f)),
            Some(Tok::Str(s)) => Expr::Literal(Value::String(s)),
            Some(Tok::LParen) => {
                let inner = self.parse_expression()?;
                match self.next() {
                    Some(Tok::RParen) => inner,
                    _ => return Err(ExprError::Syntax("expected ')'".to_string())),
                }
            }
            Some(Tok::Ident(word)) => match word.as_str() {
                "true" | "True" => Expr::Literal(Value::Boolean(true)),
                "false" | "False" => Expr::Literal(Value::Boolean(false)),
                "null" | "None" => Expr::Literal(Value::Null),
                "lambda" => return Err(ExprError::Disallowed("lambda".to_string())),
                "for" => return Err(ExprError::Disallowed("comprehension".to_string())),
                "and" | "or" | "not" | "if" | "else" | "is" | "in" => {
                    return Err(ExprError::Syntax(format!("unexpected keyword '{word}'")));
                }
                _ => {
                    if self.peek() == Some(&Tok::LParen) {
                        self.pos += 1;
                        let args = self.parse_call_args()?;
                        Expr::Call {
                            function: word,
                            args,
                        }
                    } else {
                        Expr::Name(word)
                    }
                }
            },
            Some(other) => {
                return Err(ExprError::Syntax(format!("unexpected token {other:?}")));
            }
            None => return Err(ExprError::Syntax("unexpected end of expression".to_string())),
        };
        self.leave();
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Tok::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RParen) => return Ok(args),
                _ => return Err(ExprError::Syntax("expected ',' or ')' in call".to_string())),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Evaluates a parsed expression against the environment. Recursion is
/// bounded because parsing bounds the tree depth.
pub fn evaluate(expr: &Expr, env: &HashMap<String, Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownName(name.clone())),
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, env)?;
            eval_unary(*op, value)
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, env)?;
            let right = evaluate(right, env)?;
            eval_binary(*op, left, right)
        }
        Expr::BoolChain(op, operands) => {
            // `and`/`or` short-circuit and always yield a boolean.
            for operand in operands {
                let truthy = evaluate(operand, env)?.truthy();
                match op {
                    BoolOp::And if !truthy => return Ok(Value::Boolean(false)),
                    BoolOp::Or if truthy => return Ok(Value::Boolean(true)),
                    _ => {}
                }
            }
            Ok(Value::Boolean(matches!(op, BoolOp::And)))
        }
        Expr::Compare { first, rest } => {
            let mut left = evaluate(first, env)?;
            for (op, right_expr) in rest {
                let right = evaluate(right_expr, env)?;
                if !eval_compare(*op, &left, &right)? {
                    return Ok(Value::Boolean(false));
                }
                left = right;
            }
            Ok(Value::Boolean(true))
        }
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            if evaluate(condition, env)?.truthy() {
                evaluate(then, env)
            } else {
                evaluate(otherwise, env)
            }
        }
        Expr::Call { function, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(evaluate(arg, env)?);
            }
            builtins::call(function, &evaluated)
        }
    }
}

/// Parses and evaluates in one step.
pub fn eval_str(source: &str, env: &HashMap<String, Value>) -> Result<Value, ExprError> {
    evaluate(&parse(source)?, env)
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, ExprError> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!value.truthy())),
        UnaryOp::Neg => match value {
            Value::Null => Err(ExprError::NullArith),
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| ExprError::Arithmetic("integer overflow in negation".to_string())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Boolean(b) => Ok(Value::Integer(-i64::from(b))),
            other => Err(ExprError::Arithmetic(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        UnaryOp::Pos => match value {
            Value::Null => Err(ExprError::NullArith),
            Value::Integer(_) | Value::Float(_) => Ok(value),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(b))),
            other => Err(ExprError::Arithmetic(format!(
                "unary '+' is not defined for {}",
                other.type_name()
            ))),
        },
    }
}

fn eval_binary(op: BinOp, left: Value, right: Value) -> Result<Value, ExprError> {
    if left.is_null() || right.is_null() {
        return Err(ExprError::NullArith);
    }
    // String and list concatenation ride on `+`.
    if op == BinOp::Add {
        match (&left, &right) {
            (Value::String(a), Value::String(b)) => {
                return Ok(Value::String(format!("{a}{b}")));
            }
            (Value::List(a), Value::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                return Ok(Value::List(joined));
            }
            _ => {}
        }
    }

    let (left, right) = (coerce_numeric(left, op)?, coerce_numeric(right, op)?);
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => int_binary(op, a, b),
        (a, b) => {
            let (x, y) = (
                a.as_f64().expect("coerced numeric"),
                b.as_f64().expect("coerced numeric"),
            );
            float_binary(op, x, y)
        }
    }
}

fn coerce_numeric(value: Value, op: BinOp) -> Result<Value, ExprError> {
    match value {
        Value::Integer(_) | Value::Float(_) => Ok(value),
        Value::Boolean(b) => Ok(Value::Integer(i64::from(b))),
        other => Err(ExprError::Arithmetic(format!(
            "operator '{}' is not defined for {}",
            bin_symbol(op),
            other.type_name()
        ))),
    }
}

fn bin_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value, ExprError> {
    let checked = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            // True division: integer operands still produce a float.
            if b == 0 {
                return Err(ExprError::Arithmetic("division by zero".to_string()));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(ExprError::Arithmetic("modulo by zero".to_string()));
            }
            // The result takes the sign of the divisor.
            let r = a % b;
            let adjusted = if r != 0 && (r < 0) != (b < 0) { r + b } else { r };
            return Ok(Value::Integer(adjusted));
        }
    };
    checked
        .map(Value::Integer)
        .ok_or_else(|| ExprError::Arithmetic(format!("integer overflow in '{}'", bin_symbol(op))))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value, ExprError> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(ExprError::Arithmetic("division by zero".to_string()));
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ExprError::Arithmetic("modulo by zero".to_string()));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
    };
    Ok(Value::Float(result))
}

fn eval_compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Is | CmpOp::IsNot => {
            let same = match (left.is_null(), right.is_null()) {
                (true, true) => true,
                (true, false) | (false, true) => false,
                (false, false) => left.eq_value(right),
            };
            Ok(if op == CmpOp::Is { same } else { !same })
        }
        // Membership is structural, so a null left operand can still be
        // found in a list containing null.
        CmpOp::In | CmpOp::NotIn => {
            let contained = match right {
                Value::String(haystack) => match left {
                    Value::String(needle) => haystack.contains(needle.as_str()),
                    other => {
                        return Err(ExprError::Arithmetic(format!(
                            "'in <string>' requires a string operand, got {}",
                            other.type_name()
                        )));
                    }
                },
                Value::List(items) => items.iter().any(|item| item.eq_value(left)),
                other => {
                    return Err(ExprError::Arithmetic(format!(
                        "'in' requires a string or list operand, got {}",
                        other.type_name()
                    )));
                }
            };
            Ok(if op == CmpOp::In { contained } else { !contained })
        }
        // Every other comparison involving null is false.
        _ if left.is_null() || right.is_null() => Ok(false),
        CmpOp::Eq => Ok(left.eq_value(right)),
        CmpOp::Ne => Ok(!left.eq_value(right)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = left.compare_same_class(right).ok_or_else(|| {
                ExprError::Arithmetic(format!(
                    "cannot order {} and {}",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            })
        }
    }
}
