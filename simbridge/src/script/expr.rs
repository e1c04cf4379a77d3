//! Expression lexer, AST, parser, and evaluator.
//!
//! The same grammar serves both ends of the bridge: the driver evaluates
//! right-hand sides and conditions after remote calls have been
//! substituted, and the server evaluates the call text it receives.  Only
//! literals, arithmetic, comparisons, boolean logic, indexing and calls to
//! whitelisted functions are understood; there is no attribute access.
//!
//! Operator precedence (lowest → highest):
//!   conditional  →  or  →  and  →  not  →  comparison  →
//!   additive  →  multiplicative  →  unary  →  power  →  postfix  →  primary

use super::error::ScriptError;
use super::value::Value;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// The driver's [`Interpreter`](super::interp::Interpreter) resolves names
/// from its local bindings; the server's dispatcher resolves them from the
/// shared store and the procedure namespace.
pub trait EvalContext {
    /// Look up a (possibly dotted) name.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Invoke a function by name.
    fn call_fn(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError>;
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    /// Identifier, possibly dotted (`FUN.loadURDF`).
    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DoubleSlashAssign,
    PercentAssign,
    DoubleStarAssign,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,

    /// A string literal missing its closing quote.
    Unterminated,
    Unknown(char),
    Eof,
}

impl Token {
    pub fn is_assign(&self) -> bool {
        matches!(
            self,
            Token::Assign
                | Token::PlusAssign
                | Token::MinusAssign
                | Token::StarAssign
                | Token::SlashAssign
                | Token::DoubleSlashAssign
                | Token::PercentAssign
                | Token::DoubleStarAssign
        )
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self, Token::Ident(name) if name == word)
    }
}

/// Words that cannot be used as plain names.
pub const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "elif", "for", "while", "try", "except",
    "finally", "with", "as", "pass", "break", "continue", "raise", "True", "False", "None",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// A token with its byte range in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        if self.bytes[start] == b'0' && matches!(self.peek(), Some(b'x' | b'X')) {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            return match i64::from_str_radix(&self.src[start + 2..self.pos], 16) {
                Ok(n) => Token::Int(n),
                Err(_) => Token::Unknown('x'),
            };
        }

        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some(b'.') && !self.peek2().is_some_and(is_ident_start) {
            // `1.` and `1.5` are both floats
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let digit_at = |off: usize| self.bytes.get(self.pos + off).is_some_and(u8::is_ascii_digit);
            let sign = matches!(self.peek2(), Some(b'+' | b'-'));
            if digit_at(1) || (sign && digit_at(2)) {
                is_float = true;
                self.pos += if sign { 2 } else { 1 };
                self.eat_digits();
            }
        }

        let text = &self.src[start..self.pos];
        if is_float {
            Token::Float(text.parse().unwrap_or(f64::NAN))
        } else {
            text.parse()
                .map(Token::Int)
                .unwrap_or_else(|_| Token::Float(text.parse().unwrap_or(f64::INFINITY)))
        }
    }

    fn read_string(&mut self, quote: u8) -> Token {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Token::Unterminated;
            };
            self.pos += 1;
            match b {
                b'\n' => return Token::Unterminated,
                b'\\' => {
                    let Some(esc) = self.peek() else {
                        return Token::Unterminated;
                    };
                    self.pos += 1;
                    match esc {
                        b'n' => buf.push(b'\n'),
                        b't' => buf.push(b'\t'),
                        b'r' => buf.push(b'\r'),
                        b'0' => buf.push(0),
                        b'\\' | b'\'' | b'"' => buf.push(esc),
                        other => buf.extend_from_slice(&[b'\\', other]),
                    }
                }
                c if c == quote => break,
                c => buf.push(c),
            }
        }
        Token::Str(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos - 1;
        loop {
            while self.peek().is_some_and(is_ident_char) {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') && self.peek2().is_some_and(is_ident_start) {
                self.pos += 1;
                continue;
            }
            break;
        }
        Token::Ident(self.src[start..self.pos].to_owned())
    }

    fn next_token(&mut self) -> Spanned {
        self.skip_ws();
        let start = self.pos;
        let token = self.scan_token(start);
        Spanned {
            token,
            start,
            end: self.pos,
        }
    }

    fn scan_token(&mut self, start: usize) -> Token {
        let Some(ch) = self.peek() else {
            return Token::Eof;
        };
        self.pos += 1;

        match ch {
            b'#' => {
                // comment runs to the end of the text
                self.pos = self.bytes.len();
                Token::Eof
            }
            b'0'..=b'9' => self.read_number(start),
            b'.' if self.peek().is_some_and(|b| b.is_ascii_digit()) => self.read_number(start),
            b'"' | b'\'' => self.read_string(ch),
            c if is_ident_start(c) => self.read_ident(),
            b'+' => if self.eat(b'=') { Token::PlusAssign } else { Token::Plus },
            b'-' => if self.eat(b'=') { Token::MinusAssign } else { Token::Minus },
            b'*' => {
                if self.eat(b'*') {
                    if self.eat(b'=') { Token::DoubleStarAssign } else { Token::DoubleStar }
                } else if self.eat(b'=') {
                    Token::StarAssign
                } else {
                    Token::Star
                }
            }
            b'/' => {
                if self.eat(b'/') {
                    if self.eat(b'=') { Token::DoubleSlashAssign } else { Token::DoubleSlash }
                } else if self.eat(b'=') {
                    Token::SlashAssign
                } else {
                    Token::Slash
                }
            }
            b'%' => if self.eat(b'=') { Token::PercentAssign } else { Token::Percent },
            b'=' => if self.eat(b'=') { Token::Eq } else { Token::Assign },
            b'!' => if self.eat(b'=') { Token::Ne } else { Token::Unknown('!') },
            b'<' => if self.eat(b'=') { Token::Le } else { Token::Lt },
            b'>' => if self.eat(b'=') { Token::Ge } else { Token::Gt },
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b',' => Token::Comma,
            b':' => Token::Colon,
            _ => {
                let c = self.src[start..].chars().next().unwrap_or('?');
                self.pos = start + c.len_utf8();
                Token::Unknown(c)
            }
        }
    }

    fn tokenize(mut self) -> Vec<Spanned> {
        let mut out = Vec::new();
        loop {
            let t = self.next_token();
            let done = t.token == Token::Eof;
            out.push(t);
            if done {
                break;
            }
        }
        out
    }
}

/// Split source text into tokens with byte spans.  Never fails; malformed
/// input shows up as [`Token::Unknown`] or [`Token::Unterminated`].
pub fn tokenize(src: &str) -> Vec<Spanned> {
    Lexer::new(src).tokenize()
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` chains; each link compares against the previous operand.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    /// `then if cond else otherwise`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
}

impl Expr {
    /// The constant this tree denotes, if it is built purely from literals.
    pub fn literal_value(&self) -> Option<Value> {
        match self {
            Expr::Literal(v) => Some(v.clone()),
            Expr::List(items) => items.iter().map(Expr::literal_value).collect::<Option<_>>().map(Value::List),
            Expr::Tuple(items) => items.iter().map(Expr::literal_value).collect::<Option<_>>().map(Value::Tuple),
            Expr::Dict(pairs) => pairs
                .iter()
                .map(|(k, v)| Some((k.literal_value()?, v.literal_value()?)))
                .collect::<Option<_>>()
                .map(Value::Dict),
            Expr::Unary(op @ (UnaryOp::Neg | UnaryOp::Pos), inner) => match inner.literal_value()? {
                v @ (Value::Int(_) | Value::Float(_)) => {
                    if *op == UnaryOp::Neg { v.neg().ok() } else { Some(v) }
                }
                _ => None,
            },
            _ => None,
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest bracket / unary nesting the parser accepts.
pub const MAX_NESTING: usize = 100;

/// Most binary operators and subscripts in one expression.
pub const MAX_OPERATORS: usize = 1000;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
    operators: usize,
}

fn unexpected(tok: &Token) -> ScriptError {
    match tok {
        Token::Eof => ScriptError::syntax("unexpected end of expression"),
        Token::Unterminated => ScriptError::syntax("unterminated string literal"),
        Token::Unknown(c) => ScriptError::syntax(format!("invalid character '{c}'")),
        t if t.is_assign() => ScriptError::syntax("invalid syntax: assignment is not an expression"),
        Token::Ident(word) => ScriptError::syntax(format!("invalid syntax near '{word}'")),
        other => ScriptError::syntax(format!("invalid syntax near {other:?}")),
    }
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            nesting: 0,
            operators: 0,
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        if self.nesting >= MAX_NESTING {
            return Err(ScriptError::syntax("too many nested parentheses"));
        }
        self.nesting += 1;
        let r = f(self);
        self.nesting -= 1;
        r
    }

    /// Count one operator node; each one deepens the tree the evaluator walks.
    fn count_operator(&mut self) -> Result<(), ScriptError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(ScriptError::syntax("expression is too long"));
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek().is_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<(), ScriptError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ScriptError::syntax(format!("expected {context}")))
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    /// Top level: a bare comma-separated list forms a tuple.
    fn parse_top(&mut self) -> Result<Expr, ScriptError> {
        let first = self.parse_expr()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek() == &Token::Eof {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, ScriptError> {
        let value = self.parse_or()?;
        if self.eat_keyword("if") {
            let cond = self.parse_or()?;
            if !self.eat_keyword("else") {
                return Err(ScriptError::syntax("expected 'else' in conditional expression"));
            }
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional(Box::new(value), Box::new(cond), Box::new(otherwise)));
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            self.count_operator()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            self.count_operator()?;
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_keyword("not") {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            t if t.is_keyword("in") => CmpOp::In,
            t if t.is_keyword("not") && self.peek_at(1).is_keyword("in") => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            t if t.is_keyword("is") => {
                if self.peek_at(1).is_keyword("not") {
                    self.pos += 2;
                    return Some(CmpOp::IsNot);
                }
                CmpOp::Is
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ScriptError> {
        let first = self.parse_additive()?;
        let mut links = Vec::new();
        while let Some(op) = self.comparison_op() {
            self.count_operator()?;
            links.push((op, self.parse_additive()?));
        }
        if links.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), links))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.count_operator()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.count_operator()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        let inner = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn parse_power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            // right-associative, and `2 ** -1` is allowed
            self.count_operator()?;
            let exp = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Token::LBracket) {
            self.count_operator()?;
            let key = self.parse_expr()?;
            self.expect(&Token::RBracket, "']' after index")?;
            expr = Expr::Index(Box::new(expr), Box::new(key));
        }
        Ok(expr)
    }

    /// Comma-separated items up to `close`, trailing comma allowed.
    fn parse_items(&mut self, close: &Token) -> Result<(Vec<Expr>, bool), ScriptError> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        while !self.eat(close) {
            items.push(self.parse_expr()?);
            if self.eat(&Token::Comma) {
                saw_comma = true;
            } else if !self.eat(close) {
                return Err(ScriptError::syntax(format!("expected {close:?}")));
            } else {
                break;
            }
        }
        Ok((items, saw_comma))
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ScriptError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat(&Token::RParen) {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Ident(k), Token::Assign) if !k.contains('.') => Some(k.clone()),
                _ => None,
            };
            if let Some(key) = keyword {
                self.pos += 2;
                kwargs.push((key, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(ScriptError::syntax("positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, &format!("')' after arguments to {name}"))?;
                break;
            }
        }
        Ok(Expr::Call { name, args, kwargs })
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        let tok = self.advance();
        match tok {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(mut s) => {
                // adjacent literals concatenate
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::Ident(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::None)),
                word if is_keyword(word) => {
                    Err(ScriptError::syntax(format!("invalid syntax near '{word}'")))
                }
                _ if self.eat(&Token::LParen) => self.parse_call(name),
                _ => Ok(Expr::Var(name)),
            },
            Token::LParen => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                if !self.eat(&Token::Comma) {
                    return Err(ScriptError::syntax("expected ')'"));
                }
                let (rest, _) = self.parse_items(&Token::RParen)?;
                let mut items = vec![first];
                items.extend(rest);
                Ok(Expr::Tuple(items))
            }
            Token::LBracket => Ok(Expr::List(self.parse_items(&Token::RBracket)?.0)),
            Token::LBrace => {
                let mut pairs = Vec::new();
                while !self.eat(&Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&Token::Colon, "':' in dict literal")?;
                    let value = self.parse_expr()?;
                    pairs.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBrace, "'}' after dict literal")?;
                        break;
                    }
                }
                Ok(Expr::Dict(pairs))
            }
            other => Err(unexpected(&other)),
        }
    }
}

/// Parse a complete expression; trailing input is a syntax error.
pub fn parse_expr(src: &str) -> Result<Expr, ScriptError> {
    let tokens: Vec<Token> = tokenize(src).into_iter().map(|s| s.token).collect();
    let mut parser = Parser::new(tokens);
    if parser.peek() == &Token::Eof {
        return Err(ScriptError::syntax("empty expression"));
    }
    let expr = parser.parse_top()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(unexpected(other)),
    }
}

/// Decode text that spells a literal (`5`, `-2.5`, `'abc'`, `[1, (2, 3)]`,
/// `{'k': None}`).  Anything else, including names and operators, is `None`.
pub fn parse_literal(text: &str) -> Option<Value> {
    parse_expr(text).ok()?.literal_value()
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] AST node against the given context.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, ScriptError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) => ctx.get_var(name).ok_or_else(|| ScriptError::undefined(name)),

        Expr::List(items) => Ok(Value::List(eval_all(items, ctx)?)),
        Expr::Tuple(items) => Ok(Value::Tuple(eval_all(items, ctx)?)),
        Expr::Dict(pairs) => {
            let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = eval_expr(k, ctx)?;
                let value = eval_expr(v, ctx)?;
                match out.iter_mut().find(|(existing, _)| existing.loose_eq(&key)) {
                    Some(slot) => slot.1 = value,
                    None => out.push((key, value)),
                }
            }
            Ok(Value::Dict(out))
        }

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::Pos => v.pos(),
                UnaryOp::Not => Ok(Value::Bool(!v.as_bool())),
            }
        }

        Expr::Binary(op, lhs, rhs) => {
            // `and` / `or` short-circuit and yield an operand, not a bool
            match op {
                BinOp::And => {
                    let l = eval_expr(lhs, ctx)?;
                    return if l.as_bool() { eval_expr(rhs, ctx) } else { Ok(l) };
                }
                BinOp::Or => {
                    let l = eval_expr(lhs, ctx)?;
                    return if l.as_bool() { Ok(l) } else { eval_expr(rhs, ctx) };
                }
                _ => {}
            }
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            match op {
                BinOp::Add => l.add(&r),
                BinOp::Sub => l.sub(&r),
                BinOp::Mul => l.mul(&r),
                BinOp::Div => l.div(&r),
                BinOp::FloorDiv => l.floor_div(&r),
                BinOp::Rem => l.rem(&r),
                BinOp::Pow => l.pow(&r),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }

        Expr::Compare(first, links) => {
            let mut left = eval_expr(first, ctx)?;
            for (op, operand) in links {
                let right = eval_expr(operand, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }

        Expr::Conditional(then, cond, otherwise) => {
            if eval_expr(cond, ctx)?.as_bool() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }

        Expr::Index(target, key) => {
            let target = eval_expr(target, ctx)?;
            let key = eval_expr(key, ctx)?;
            target.index(&key)
        }

        Expr::Call { name, args, kwargs } => {
            let args = eval_all(args, ctx)?;
            let mut kw = Vec::with_capacity(kwargs.len());
            for (key, e) in kwargs {
                kw.push((key.clone(), eval_expr(e, ctx)?));
            }
            ctx.call_fn(name, args, kw)
        }
    }
}

fn eval_all(items: &[Expr], ctx: &mut dyn EvalContext) -> Result<Vec<Value>, ScriptError> {
    items.iter().map(|e| eval_expr(e, ctx)).collect()
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, ScriptError> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => l.loose_eq(r),
        CmpOp::Ne => !l.loose_eq(r),
        CmpOp::Is => l == r,
        CmpOp::IsNot => l != r,
        CmpOp::In => r.contains(l)?,
        CmpOp::NotIn => !r.contains(l)?,
        CmpOp::Lt => matches!(l.compare(r, "<")?, Some(Less)),
        CmpOp::Le => matches!(l.compare(r, "<=")?, Some(Less | Equal)),
        CmpOp::Gt => matches!(l.compare(r, ">")?, Some(Greater)),
        CmpOp::Ge => matches!(l.compare(r, ">=")?, Some(Greater | Equal)),
    })
}

/// Parse and evaluate in one step.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> Result<Value, ScriptError> {
    let expr = parse_expr(src)?;
    eval_expr(&expr, ctx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
