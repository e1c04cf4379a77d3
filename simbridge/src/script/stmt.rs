//! Statement AST and script-level parser.
//!
//! A script is a sequence of lines.  Compound statements (`if`/`elif`/
//! `else`, `for`, `while`, `try`/`except`/`finally`, `with`) end their
//! header with `:` and own the following, more deeply indented lines.
//! Everything else is a leaf: an assignment, an expression, or one of the
//! small keywords (`pass`, `break`, `continue`, `raise`).
//!
//! Parsing never fails.  A line that cannot be understood becomes
//! [`StmtKind::Malformed`] and raises `SyntaxError` when it is reached, so
//! the rest of the script still runs.

use std::sync::OnceLock;

use regex::Regex;

use super::block::{parse_block, source_lines, SourceLine};
use super::error::ScriptError;
use super::expr::{is_keyword, tokenize, Token};
use super::value::Value;

/// A parsed statement with the line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    /// Trimmed source text, comment removed.
    pub text: String,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `if` with any `elif` branches, in order, and an optional `else`.
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// `for var in iterable:`
    For {
        var: String,
        iterable: String,
        body: Vec<Stmt>,
    },
    /// `while cond:`
    While { cond: String, body: Vec<Stmt> },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Handler>,
        finally: Option<Vec<Stmt>>,
    },
    /// `with expr:`; the expression is only substituted.
    With { expr: String, body: Vec<Stmt> },
    Assign {
        target: String,
        op: AssignOp,
        value: String,
    },
    Expr(String),
    Pass,
    Break,
    Continue,
    /// `raise`, `raise Kind`, or `raise Kind("message")`.
    Raise(Option<String>),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub line: usize,
    pub cond: String,
    pub body: Vec<Stmt>,
}

/// One `except [Kind [as name]]:` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub line: usize,
    pub kind: Option<String>,
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
}

impl Handler {
    pub fn catches(&self, err: &ScriptError) -> bool {
        self.kind.as_deref().map_or(true, |k| err.matches_clause(k))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

impl AssignOp {
    fn from_token(tok: &Token) -> Option<Self> {
        Some(match tok {
            Token::Assign => AssignOp::Set,
            Token::PlusAssign => AssignOp::Add,
            Token::MinusAssign => AssignOp::Sub,
            Token::StarAssign => AssignOp::Mul,
            Token::SlashAssign => AssignOp::Div,
            Token::DoubleSlashAssign => AssignOp::FloorDiv,
            Token::PercentAssign => AssignOp::Rem,
            Token::DoubleStarAssign => AssignOp::Pow,
            _ => return None,
        })
    }

    /// Combine the current binding with the right-hand side.
    pub fn apply(self, current: &Value, rhs: &Value) -> Result<Value, ScriptError> {
        match self {
            AssignOp::Set => Ok(rhs.clone()),
            AssignOp::Add => current.add(rhs),
            AssignOp::Sub => current.sub(rhs),
            AssignOp::Mul => current.mul(rhs),
            AssignOp::Div => current.div(rhs),
            AssignOp::FloorDiv => current.floor_div(rhs),
            AssignOp::Rem => current.rem(rhs),
            AssignOp::Pow => current.pow(rhs),
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse a whole script.
pub fn parse_script(src: &str) -> Vec<Stmt> {
    StmtParser::new(source_lines(src)).parse_all()
}

struct StmtParser<'a> {
    lines: Vec<SourceLine<'a>>,
    pos: usize,
}

impl<'a> StmtParser<'a> {
    fn new(lines: Vec<SourceLine<'a>>) -> Self {
        StmtParser { lines, pos: 0 }
    }

    fn parse_all(&mut self) -> Vec<Stmt> {
        let mut out = Vec::new();
        while let Some(stmt) = self.next_stmt() {
            out.push(stmt);
        }
        out
    }

    fn next_stmt(&mut self) -> Option<Stmt> {
        while self.lines.get(self.pos)?.is_skippable() {
            self.pos += 1;
        }
        let line = self.lines[self.pos];
        self.pos += 1;
        let text = strip_comment(line.trimmed());

        let kind = match leading_word(text) {
            "if" => self.parse_if(line, text),
            "for" => self.parse_for(text),
            "while" => match header_rest(text, "while").and_then(|c| require(c, "while")) {
                Ok(cond) => StmtKind::While {
                    cond: cond.to_string(),
                    body: self.take_body(),
                },
                Err(reason) => self.malformed_compound(reason),
            },
            "with" => match header_rest(text, "with").and_then(|c| require(c, "with")) {
                Ok(expr) => StmtKind::With {
                    expr: expr.to_string(),
                    body: self.take_body(),
                },
                Err(reason) => self.malformed_compound(reason),
            },
            "try" => self.parse_try(line, text),
            word @ ("elif" | "else" | "except" | "finally") => {
                self.malformed_compound(format!("'{word}' without a matching statement"))
            }
            word @ ("def" | "class") => self.malformed_compound(format!("'{word}' is not supported")),
            "import" => match text.split_whitespace().nth(1) {
                // their functions are builtins
                Some("time" | "random") if text.split_whitespace().count() == 2 => StmtKind::Pass,
                _ => StmtKind::Malformed("imports are not supported".into()),
            },
            "from" => StmtKind::Malformed("imports are not supported".into()),
            word @ ("pass" | "break" | "continue") if text != word => {
                StmtKind::Malformed(format!("invalid syntax after '{word}'"))
            }
            "pass" => StmtKind::Pass,
            "break" => StmtKind::Break,
            "continue" => StmtKind::Continue,
            "raise" => {
                let rest = text["raise".len()..].trim();
                StmtKind::Raise((!rest.is_empty()).then(|| rest.to_string()))
            }
            _ => classify_leaf(text),
        };

        Some(Stmt {
            line: line.number,
            text: text.to_string(),
            kind,
        })
    }

    /// Parse the indented block following the line just consumed.
    fn take_body(&mut self) -> Vec<Stmt> {
        let (body, next) = parse_block(&self.lines, self.pos);
        self.pos = next;
        StmtParser::new(body).parse_all()
    }

    /// Consume a bad header's body so it does not run as outer code.
    fn malformed_compound(&mut self, reason: String) -> StmtKind {
        self.take_body();
        StmtKind::Malformed(reason)
    }

    /// Next line, if it is a continuation clause at `indent`.
    fn clause_at(&self, indent: usize) -> Option<(SourceLine<'a>, &'a str)> {
        let line = *self.lines.get(self.pos)?;
        if line.is_skippable() || line.indent() != indent {
            return None;
        }
        Some((line, strip_comment(line.trimmed())))
    }

    fn parse_if(&mut self, line: SourceLine<'a>, text: &str) -> StmtKind {
        let mut problem = None;
        let mut branches = Vec::new();
        let mut otherwise = None;

        let cond = header_rest(text, "if").and_then(|c| require(c, "if"));
        let body = self.take_body();
        push_branch(&mut branches, &mut problem, line.number, cond, body);

        while let Some((next, ntext)) = self.clause_at(line.indent()) {
            match leading_word(ntext) {
                "elif" => {
                    self.pos += 1;
                    let cond = header_rest(ntext, "elif").and_then(|c| require(c, "elif"));
                    let body = self.take_body();
                    push_branch(&mut branches, &mut problem, next.number, cond, body);
                }
                "else" => {
                    self.pos += 1;
                    if let Err(reason) = header_rest(ntext, "else").and_then(bare) {
                        problem.get_or_insert(reason);
                    }
                    otherwise = Some(self.take_body());
                    break;
                }
                _ => break,
            }
        }

        match problem {
            Some(reason) => StmtKind::Malformed(reason),
            None => StmtKind::If { branches, otherwise },
        }
    }

    fn parse_for(&mut self, text: &str) -> StmtKind {
        let header = header_rest(text, "for").and_then(|rest| {
            let caps = for_header()
                .captures(rest)
                .ok_or_else(|| "expected 'for <name> in <iterable>:'".to_string())?;
            let var = caps.get(1).map_or("", |m| m.as_str());
            let iterable = caps.get(2).map_or("", |m| m.as_str()).trim();
            if is_keyword(var) {
                return Err(format!("cannot assign to keyword '{var}'"));
            }
            Ok((var.to_string(), iterable.to_string()))
        });
        match header {
            Ok((var, iterable)) => StmtKind::For {
                var,
                iterable,
                body: self.take_body(),
            },
            Err(reason) => self.malformed_compound(reason),
        }
    }

    fn parse_try(&mut self, line: SourceLine<'a>, text: &str) -> StmtKind {
        let mut problem = header_rest(text, "try").and_then(bare).err();
        let body = self.take_body();
        let mut handlers = Vec::new();
        let mut finally = None;

        while let Some((next, ntext)) = self.clause_at(line.indent()) {
            match leading_word(ntext) {
                "except" => {
                    self.pos += 1;
                    let clause = header_rest(ntext, "except").and_then(parse_except);
                    let body = self.take_body();
                    match clause {
                        Ok((kind, binding)) => handlers.push(Handler {
                            line: next.number,
                            kind,
                            binding,
                            body,
                        }),
                        Err(reason) => {
                            problem.get_or_insert(reason);
                        }
                    }
                }
                "finally" => {
                    self.pos += 1;
                    if let Err(reason) = header_rest(ntext, "finally").and_then(bare) {
                        problem.get_or_insert(reason);
                    }
                    finally = Some(self.take_body());
                    break;
                }
                _ => break,
            }
        }

        match problem {
            Some(reason) => StmtKind::Malformed(reason),
            None => StmtKind::Try {
                body,
                handlers,
                finally,
            },
        }
    }
}

fn push_branch(
    branches: &mut Vec<Branch>,
    problem: &mut Option<String>,
    line: usize,
    cond: Result<&str, String>,
    body: Vec<Stmt>,
) {
    match cond {
        Ok(cond) => branches.push(Branch {
            line,
            cond: cond.to_string(),
            body,
        }),
        Err(reason) => {
            problem.get_or_insert(reason);
        }
    }
}

// ── Line helpers ──────────────────────────────────────────────────────────────

fn for_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_]\w*)\s+in\s+(.+)$").expect("static pattern"))
}

fn except_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][\w.]*)(?:\s+as\s+([A-Za-z_]\w*))?$").expect("static pattern")
    })
}

/// The identifier-like word a line starts with.
fn leading_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

/// Text between a compound keyword and its closing `:`.
fn header_rest<'t>(text: &'t str, keyword: &str) -> Result<&'t str, String> {
    let rest = text[keyword.len()..].trim();
    rest.strip_suffix(':')
        .map(str::trim)
        .ok_or_else(|| format!("expected ':' at end of '{keyword}' header"))
}

fn require<'t>(rest: &'t str, keyword: &str) -> Result<&'t str, String> {
    if rest.is_empty() {
        Err(format!("expected an expression after '{keyword}'"))
    } else {
        Ok(rest)
    }
}

fn bare(rest: &str) -> Result<(), String> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(format!("unexpected text before ':': {rest}"))
    }
}

fn parse_except(rest: &str) -> Result<(Option<String>, Option<String>), String> {
    if rest.is_empty() {
        return Ok((None, None));
    }
    let caps = except_header()
        .captures(rest)
        .ok_or_else(|| format!("invalid except clause: {rest}"))?;
    Ok((
        caps.get(1).map(|m| m.as_str().to_string()),
        caps.get(2).map(|m| m.as_str().to_string()),
    ))
}

/// Drop a trailing `# comment` that is not inside a string literal.
pub fn strip_comment(text: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' => return text[..i].trim_end(),
            None => {}
        }
    }
    text
}

/// Assignment when exactly one assignment operator sits outside all
/// brackets, with a plain name on its left; otherwise an expression.
fn classify_leaf(text: &str) -> StmtKind {
    let tokens = tokenize(text);
    let mut depth = 0i32;
    let mut assigns = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        match t.token {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth -= 1,
            ref tok if depth == 0 && tok.is_assign() => assigns.push(i),
            _ => {}
        }
    }
    let [at] = assigns[..] else {
        return StmtKind::Expr(text.to_string());
    };
    let Some(op) = AssignOp::from_token(&tokens[at].token) else {
        return StmtKind::Expr(text.to_string());
    };
    let target = match &tokens[..at] {
        [t] => match &t.token {
            Token::Ident(name) if !name.contains('.') && !is_keyword(name) => name.clone(),
            _ => return StmtKind::Malformed("cannot assign to this target".into()),
        },
        _ => return StmtKind::Malformed("cannot assign to this target".into()),
    };
    let value = text[tokens[at].end..].trim();
    if value.is_empty() {
        return StmtKind::Malformed("expected a value after assignment".into());
    }
    StmtKind::Assign {
        target,
        op,
        value: value.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
