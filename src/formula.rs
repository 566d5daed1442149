use std::collections::HashMap;
use std::fmt;

/// Errors from evaluating a componente-de-avaliação formula.
///
/// Missing identifiers are not an error: a code that has no value in the
/// mapping resolves to 0 so partially graded turmas still produce numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    Syntax(String),
    DivisionByZero,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::Syntax(msg) => write!(f, "syntax error: {}", msg),
            FormulaError::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for FormulaError {}

/// Conventional 2-decimal rounding for displayed/stored grade values.
/// Rounding policy belongs to callers, not to `evaluate` itself.
pub fn round2(x: f64) -> f64 {
    (100.0 * x).round() / 100.0
}

/// Evaluates a stored formula string such as `"MAC*0.4 + EXAME*0.6"` against
/// a mapping of component code -> value.
///
/// Grammar: identifiers, numeric literals, `+ - * /`, unary minus and
/// parentheses, with the usual precedence and left associativity. The parser
/// accepts nothing else; formulas are user-authored strings.
pub fn evaluate(expr: &str, values: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(FormulaError::Syntax("empty expression".to_string()));
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        values,
    };
    let result = parser.expression()?;
    if parser.pos != tokens.len() {
        return Err(FormulaError::Syntax(format!(
            "unexpected token at position {}",
            parser.pos
        )));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::Syntax(format!("bad number '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(FormulaError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    values: &'a HashMap<String, f64>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self) -> Result<f64, FormulaError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn term(&mut self) -> Result<f64, FormulaError> {
        let mut acc = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    acc *= self.factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    acc /= divisor;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, FormulaError> {
        match self.peek().cloned() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(Token::Number(v)) => {
                self.pos += 1;
                Ok(v)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                // Absent codes count as 0 so a half-entered pauta still computes.
                Ok(self.values.get(&name).copied().unwrap_or(0.0))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expression()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(FormulaError::Syntax("missing ')'".to_string())),
                }
            }
            Some(_) => Err(FormulaError::Syntax(format!(
                "unexpected token at position {}",
                self.pos
            ))),
            None => Err(FormulaError::Syntax(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}
