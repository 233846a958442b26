//! `${...}` interpolation within a single string.
//!
//! Syntax:
//!
//! - `${expr}` is replaced by the first value a resolver returns for `expr`;
//! - `$$` is a literal `$`;
//! - inside a reference, `{expr}` is itself looked up and its result becomes
//!   part of the outer expression, so `${{name}}` looks up the value of the
//!   key named by `name`;
//! - inside a reference, the first `:` splits a function call such as
//!   `${path:{dir}}` into a name and an argument;
//! - braces and colons outside a reference are literal text.
//!
//! A string that consists of exactly one reference evaluates to the resolved
//! value itself, so a reference to a mapping splices the whole mapping.

use std::path::Path;

use super::value::{Text, Value};
use super::ConfigError;

/// A parsed `name:arg` function call inside a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: String,
    pub arg: Value,
}

/// What a resolver gets to see besides the expression itself.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// The fully expanded expression text.
    pub expression: &'a str,
    /// Set when the expression has the shape `identifier:argument`.
    pub func: Option<&'a FuncCall>,
    /// The text being interpolated, forwarded unchanged to every resolver.
    pub attr: Option<&'a Text>,
}

/// Turns an expression into a value.
///
/// `Ok(None)` means "not mine"; the next resolver in the chain is tried.
pub trait Resolver {
    fn resolve(&self, expression: &str, ctx: &ResolveContext<'_>) -> Result<Option<Value>, ConfigError>;
}

impl<F> Resolver for F
where
    F: Fn(&str, &ResolveContext<'_>) -> Result<Option<Value>, ConfigError>,
{
    fn resolve(&self, expression: &str, ctx: &ResolveContext<'_>) -> Result<Option<Value>, ConfigError> {
        self(expression, ctx)
    }
}

/// Terminal resolver that turns every unresolved reference into an error.
pub fn reject(expression: &str, _ctx: &ResolveContext<'_>) -> Result<Option<Value>, ConfigError> {
    Err(ConfigError::UndefinedVariable {
        name: expression.to_string(),
        origin: None,
    })
}

/// Looks up an environment variable by name.
pub type EnvLookup = dyn Fn(&str) -> Option<String>;

/// The process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// `${path:{key}}`: resolves the argument as a pathname relative to the
/// directory it was loaded from, or, failing that, relative to the directory
/// of the text being interpolated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathFunction;

impl Resolver for PathFunction {
    fn resolve(&self, _expression: &str, ctx: &ResolveContext<'_>) -> Result<Option<Value>, ConfigError> {
        let Some(func) = ctx.func.filter(|f| f.name == "path") else {
            return Ok(None);
        };
        let path = match &func.arg {
            Value::Text(text @ Text::Annotated { .. }) => text.to_pathname(),
            arg => {
                let arg = arg.render();
                match ctx.attr.and_then(Text::origin_dir) {
                    Some(dir) => dir.join(arg),
                    None => Path::new(&arg).to_path_buf(),
                }
            }
        };
        Ok(Some(Value::from(path.to_string_lossy().into_owned())))
    }
}

/// `${env:NAME}`: the value of an environment variable.
pub struct EnvFunction<'e> {
    lookup: &'e EnvLookup,
}

impl<'e> EnvFunction<'e> {
    pub fn new(lookup: &'e EnvLookup) -> Self {
        Self { lookup }
    }
}

impl Resolver for EnvFunction<'_> {
    fn resolve(&self, _expression: &str, ctx: &ResolveContext<'_>) -> Result<Option<Value>, ConfigError> {
        match ctx.func {
            Some(func) if func.name == "env" => Ok((self.lookup)(&func.arg.render()).map(Value::from)),
            _ => Ok(None),
        }
    }
}

/// `${NAME}`: falls back to an environment variable of the same name.
pub struct EnvVariable<'e> {
    lookup: &'e EnvLookup,
}

impl<'e> EnvVariable<'e> {
    pub fn new(lookup: &'e EnvLookup) -> Self {
        Self { lookup }
    }
}

impl Resolver for EnvVariable<'_> {
    fn resolve(&self, expression: &str, ctx: &ResolveContext<'_>) -> Result<Option<Value>, ConfigError> {
        if ctx.func.is_some() {
            return Ok(None);
        }
        Ok((self.lookup)(expression).map(Value::from))
    }
}

/// Interpolates every reference in `text`.
///
/// Resolvers are tried in order for each reference; a reference that no
/// resolver answers contributes nothing. `attr` is passed through to every
/// resolver call.
pub fn interpolate(
    text: &str,
    resolvers: &[&dyn Resolver],
    attr: Option<&Text>,
) -> Result<Value, ConfigError> {
    let tokens = tokenize(text);
    let parts = parse_template(&tokens)?;
    let interp = Interpolation { resolvers, attr };

    if let [Part::Reference(body)] = parts.as_slice() {
        return Ok(interp.lookup(body)?.unwrap_or_else(|| Value::from("")));
    }

    let mut out = String::with_capacity(text.len());
    for part in &parts {
        match part {
            Part::Literal(literal) => out.push_str(literal),
            Part::Reference(body) => {
                if let Some(value) = interp.lookup(body)? {
                    out.push_str(&value.render());
                }
            }
        }
    }
    Ok(Value::from(out))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    /// `${`
    Open,
    /// `$$`
    Dollar,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `:`
    Colon,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let (token, len) = match (bytes[i], bytes.get(i + 1)) {
            (b'$', Some(b'{')) => (Token::Open, 2),
            (b'$', Some(b'$')) => (Token::Dollar, 2),
            (b'{', _) => (Token::LBrace, 1),
            (b'}', _) => (Token::RBrace, 1),
            (b':', _) => (Token::Colon, 1),
            _ => {
                i += 1;
                continue;
            }
        };
        if start < i {
            tokens.push(Token::Text(&text[start..i]));
        }
        tokens.push(token);
        i += len;
        start = i;
    }
    if start < bytes.len() {
        tokens.push(Token::Text(&text[start..]));
    }

    tokens
}

/// Top-level pieces of a template.
#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Reference(Vec<Inner>),
}

/// Pieces of a reference body.
#[derive(Debug, Clone, PartialEq)]
enum Inner {
    Text(String),
    Lookup(Vec<Inner>),
    Colon,
}

fn parse_template(tokens: &[Token<'_>]) -> Result<Vec<Part>, ConfigError> {
    let mut parts: Vec<Part> = Vec::new();
    let mut pos = 0;

    while let Some(token) = tokens.get(pos) {
        let literal = match token {
            Token::Open => {
                let (body, next) = parse_body(tokens, pos + 1)?;
                parts.push(Part::Reference(body));
                pos = next;
                continue;
            }
            Token::Text(text) => *text,
            Token::Dollar => "$",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Colon => ":",
        };
        match parts.last_mut() {
            Some(Part::Literal(prev)) => prev.push_str(literal),
            _ => parts.push(Part::Literal(literal.to_string())),
        }
        pos += 1;
    }

    Ok(parts)
}

/// Parses a reference body up to and including its closing `}`.
fn parse_body(tokens: &[Token<'_>], mut pos: usize) -> Result<(Vec<Inner>, usize), ConfigError> {
    let mut body: Vec<Inner> = Vec::new();

    loop {
        let text = match tokens.get(pos) {
            None => return Err(ConfigError::syntax("missing '}' after '${'")),
            Some(Token::RBrace) => return Ok((body, pos + 1)),
            Some(Token::Open | Token::LBrace) => {
                let (inner, next) = parse_body(tokens, pos + 1)?;
                body.push(Inner::Lookup(inner));
                pos = next;
                continue;
            }
            Some(Token::Colon) => {
                body.push(Inner::Colon);
                pos += 1;
                continue;
            }
            Some(Token::Text(text)) => *text,
            Some(Token::Dollar) => "$",
        };
        match body.last_mut() {
            Some(Inner::Text(prev)) => prev.push_str(text),
            _ => body.push(Inner::Text(text.to_string())),
        }
        pos += 1;
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

struct Interpolation<'r, 'a> {
    resolvers: &'r [&'r dyn Resolver],
    attr: Option<&'a Text>,
}

impl Interpolation<'_, '_> {
    /// Evaluates a reference body and resolves the resulting expression.
    fn lookup(&self, body: &[Inner]) -> Result<Option<Value>, ConfigError> {
        let mut pieces = Vec::with_capacity(body.len());
        for inner in body {
            pieces.push(match inner {
                Inner::Text(text) => Piece::Text(text),
                Inner::Colon => Piece::Colon,
                Inner::Lookup(nested) => Piece::Value(self.lookup(nested)?),
            });
        }

        let expression: String = pieces.iter().map(Piece::render).collect();
        let func = pieces
            .iter()
            .position(|piece| matches!(piece, Piece::Colon))
            .and_then(|colon| {
                let name: String = pieces[..colon].iter().map(Piece::render).collect();
                if !is_identifier(&name) {
                    return None;
                }
                let arg = match &pieces[colon + 1..] {
                    [Piece::Value(value)] => value.clone().unwrap_or_else(|| Value::from("")),
                    rest => Value::from(rest.iter().map(Piece::render).collect::<String>()),
                };
                Some(FuncCall { name, arg })
            });

        let ctx = ResolveContext {
            expression: &expression,
            func: func.as_ref(),
            attr: self.attr,
        };
        for resolver in self.resolvers {
            if let Some(value) = resolver.resolve(&expression, &ctx)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

enum Piece<'b> {
    Text(&'b str),
    Colon,
    Value(Option<Value>),
}

impl Piece<'_> {
    fn render(&self) -> String {
        match self {
            Piece::Text(text) => text.to_string(),
            Piece::Colon => ":".to_string(),
            Piece::Value(Some(value)) => value.render(),
            Piece::Value(None) => String::new(),
        }
    }
}
