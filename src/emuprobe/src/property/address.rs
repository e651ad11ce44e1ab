//! Address expressions
//!
//! Mapper addresses are either literals (`0xD472`) or small arithmetic
//! expressions over runtime variables (`baseAddr + 0x4`, `(slot * 0x2C) + party`).
//! Expressions are parsed once when the property is created and evaluated
//! every time the address has to be resolved.

use crate::hook::Variables;
use crate::numbers::parse_number;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressExpr {
    Literal(u64),
    Variable(String),
    Binary(Box<AddressExpr>, Op, Box<AddressExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(u64),
    Ident(String),
    Op(Op),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Op(Op::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op(Op::Sub));
                i += 1;
            }
            '*' => {
                tokens.push(Token::Op(Op::Mul));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = parse_number(&text).ok_or_else(|| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

/// Deepest parenthesis nesting an expression may use
const MAX_DEPTH: usize = 32;

/// Longest expression, in tokens; bounds the depth of the parsed tree
const MAX_TOKENS: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
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

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<AddressExpr, String> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (Op::Add | Op::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = AddressExpr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    // term := factor ('*' factor)*
    fn term(&mut self) -> Result<AddressExpr, String> {
        let mut lhs = self.factor()?;
        while let Some(Token::Op(Op::Mul)) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = AddressExpr::Binary(Box::new(lhs), Op::Mul, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<AddressExpr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(AddressExpr::Literal(n)),
            Some(Token::Ident(name)) => Ok(AddressExpr::Variable(name)),
            Some(Token::Open) => {
                if self.depth == MAX_DEPTH {
                    return Err(format!("parentheses nested deeper than {}", MAX_DEPTH));
                }
                self.depth += 1;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("missing ')'".into()),
                }
            }
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of expression".into()),
        }
    }
}

impl AddressExpr {
    pub fn parse(input: &str) -> Result<Self, String> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err("empty expression".into());
        }
        if tokens.len() > MAX_TOKENS {
            return Err(format!("longer than {} tokens", MAX_TOKENS));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(format!("trailing input after position {}", parser.pos));
        }
        Ok(expr)
    }

    /// Whether evaluation depends on runtime variables
    pub fn has_variables(&self) -> bool {
        match self {
            AddressExpr::Literal(_) => false,
            AddressExpr::Variable(_) => true,
            AddressExpr::Binary(lhs, _, rhs) => lhs.has_variables() || rhs.has_variables(),
        }
    }

    /// Resolve to a 32-bit address.
    ///
    /// `None` means "not meaningful right now": a variable is missing, null or
    /// not a number, or the result falls outside the address space.
    pub fn evaluate(&self, variables: &Variables) -> Option<u32> {
        let value = self.eval(variables)?;
        u32::try_from(value).ok()
    }

    fn eval(&self, variables: &Variables) -> Option<i128> {
        match self {
            AddressExpr::Literal(n) => Some(*n as i128),
            AddressExpr::Variable(name) => variable_value(variables.get(name)?),
            AddressExpr::Binary(lhs, op, rhs) => {
                let l = lhs.eval(variables)?;
                let r = rhs.eval(variables)?;
                match op {
                    Op::Add => l.checked_add(r),
                    Op::Sub => l.checked_sub(r),
                    Op::Mul => l.checked_mul(r),
                }
            }
        }
    }
}

fn variable_value(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(i128::from)
            .or_else(|| n.as_i64().map(i128::from)),
        Value::String(s) => parse_number(s).map(i128::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_address() {
        let expr = AddressExpr::parse("0xD472").unwrap();
        assert!(!expr.has_variables());
        assert_eq!(expr.evaluate(&Variables::new()), Some(0xD472));
    }

    #[test]
    fn test_variable_offset() {
        let expr = AddressExpr::parse("baseAddr+4").unwrap();
        assert!(expr.has_variables());

        let mut vars = Variables::new();
        vars.set("baseAddr", 0xD000);
        assert_eq!(expr.evaluate(&vars), Some(0xD004));
    }

    #[test]
    fn test_null_variable_is_unresolved() {
        let expr = AddressExpr::parse("baseAddr+4").unwrap();
        let mut vars = Variables::new();
        vars.set("baseAddr", Value::Null);
        assert_eq!(expr.evaluate(&vars), None);
        assert_eq!(expr.evaluate(&Variables::new()), None);
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let mut vars = Variables::new();
        vars.set("slot", 2);
        vars.set("party.base", "0xD16B");

        let expr = AddressExpr::parse("party.base + slot * 0x2C").unwrap();
        assert_eq!(expr.evaluate(&vars), Some(0xD16B + 0x58));

        let expr = AddressExpr::parse("(slot + 1) * 0x10").unwrap();
        assert_eq!(expr.evaluate(&vars), Some(0x30));
    }

    #[test]
    fn test_negative_result_is_unresolved() {
        let expr = AddressExpr::parse("4 - 8").unwrap();
        assert_eq!(expr.evaluate(&Variables::new()), None);
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(AddressExpr::parse("").is_err());
        assert!(AddressExpr::parse("0xZZ").is_err());
        assert!(AddressExpr::parse("(1 + 2").is_err());
        assert!(AddressExpr::parse("1 +").is_err());
        assert!(AddressExpr::parse("1 2").is_err());
        assert!(AddressExpr::parse("a / 2").is_err());
    }

    #[test]
    fn test_nesting_is_capped() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(
            AddressExpr::parse(&nested(MAX_DEPTH)).unwrap().evaluate(&Variables::new()),
            Some(1)
        );
        assert!(AddressExpr::parse(&nested(MAX_DEPTH + 1)).is_err());
        assert!(AddressExpr::parse(&"(".repeat(100_000)).is_err());
    }

    #[test]
    fn test_length_is_capped() {
        let long = vec!["1"; 100_000].join("+");
        assert!(AddressExpr::parse(&long).is_err());
        let short = vec!["1"; 100].join("+");
        assert_eq!(AddressExpr::parse(&short).unwrap().evaluate(&Variables::new()), Some(100));
    }
}
