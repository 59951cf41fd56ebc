//! Arithmetic expressions as found in `float_expression` attributes, e.g. `2*Pi/3` or
//! `-0.5*sqrt(3.0)`.
//!
//! Grammar (usual precedence, `**`/`^` right associative and binding tighter than unary
//! minus, so `-2**2 == -4`):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := atom (('**' | '^') unary)?
//! atom    := number | identifier | identifier '(' expr ')' | '(' expr ')'
//! ```

use crate::constants::Constants;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LeftParen,
    RightParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut position = 0;

    while position < chars.len() {
        let c = chars[position];
        match c {
            c if c.is_whitespace() => position += 1,
            '+' => {
                tokens.push(Token::Plus);
                position += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                position += 1;
            }
            '*' if chars.get(position + 1) == Some(&'*') => {
                tokens.push(Token::Power);
                position += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                position += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                position += 1;
            }
            '^' => {
                tokens.push(Token::Power);
                position += 1;
            }
            '(' => {
                tokens.push(Token::LeftParen);
                position += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                position += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = position;
                while position < chars.len()
                    && (chars[position].is_ascii_digit() || chars[position] == '.')
                {
                    position += 1;
                }
                // exponent part: 1.5e-3, 2E4
                if position < chars.len() && matches!(chars[position], 'e' | 'E') {
                    let mut lookahead = position + 1;
                    if lookahead < chars.len() && matches!(chars[lookahead], '+' | '-') {
                        lookahead += 1;
                    }
                    if lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
                        position = lookahead;
                        while position < chars.len() && chars[position].is_ascii_digit() {
                            position += 1;
                        }
                    }
                }
                let literal: String = chars[start..position].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", literal))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = position;
                while position < chars.len()
                    && (chars[position].is_alphanumeric() || chars[position] == '_')
                {
                    position += 1;
                }
                tokens.push(Token::Identifier(chars[start..position].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    constants: &'a Constants,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.position += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.position += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.position += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.position += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.position += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.position += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.position += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LeftParen) => {
                let value = self.expr()?;
                self.expect(Token::RightParen)?;
                Ok(value)
            }
            Some(Token::Identifier(name)) => {
                if self.peek() == Some(&Token::LeftParen) {
                    self.position += 1;
                    let argument = self.expr()?;
                    self.expect(Token::RightParen)?;
                    apply_function(&name, argument)
                } else {
                    self.constants
                        .get(&name)
                        .copied()
                        .ok_or_else(|| format!("unknown constant '{}'", name))
                }
            }
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn apply_function(name: &str, argument: f64) -> Result<f64, String> {
    let value = match name {
        "sqrt" => {
            if argument < 0.0 {
                return Err(format!("sqrt of negative number {}", argument));
            }
            argument.sqrt()
        }
        "abs" => argument.abs(),
        "sin" => argument.sin(),
        "cos" => argument.cos(),
        "tan" => argument.tan(),
        "asin" => argument.asin(),
        "acos" => argument.acos(),
        "atan" => argument.atan(),
        "exp" => argument.exp(),
        "log" => {
            if argument <= 0.0 {
                return Err(format!("log of non-positive number {}", argument));
            }
            argument.ln()
        }
        other => return Err(format!("unknown function '{}'", other)),
    };
    Ok(value)
}

/// Evaluate an arithmetic expression, resolving identifiers in `constants`
///
/// The error string describes the first problem found; callers wrap it into a
/// conversion error carrying the attribute name.
pub fn evaluate(text: &str, constants: &Constants) -> Result<f64, String> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        position: 0,
        constants,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(format!("trailing {:?}", token));
    }
    if !value.is_finite() {
        return Err(format!("'{}' does not evaluate to a finite number", text));
    }
    Ok(value)
}
