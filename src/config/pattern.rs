//! Multi-path patterns.
//!
//! A pattern is a dotted path in which any segment may be an alternation
//! group: `database.(test|default).host` names both `database.test.host` and
//! `database.default.host`. Alternatives may be empty, so `config.(local|)`
//! names `config.local` and `config`.
//!
//! Patterns serve as lookup keys into configuration trees and as base names
//! when searching for configuration files.

use std::fmt;
use std::ops::ControlFlow;

use super::ConfigError;

/// One element of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// A literal, possibly dotted, run of words such as `this.and.that`.
    Word(String),
    /// Elements that follow each other, joined by `.`. An empty sequence is
    /// an empty alternative.
    Seq(Vec<Element>),
    /// Alternatives, expanded left to right.
    Alt(Vec<Element>),
}

/// A parsed multi-path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPath {
    spec: String,
    elements: Vec<Element>,
}

impl MultiPath {
    /// Parses a pattern.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let tokens = tokenize(spec)?;
        if tokens.is_empty() {
            return Err(ConfigError::syntax("empty pattern"));
        }

        let (elements, next) = parse_expression(&tokens, 0)?;
        if next < tokens.len() {
            return Err(unexpected("unexpected", &tokens, next));
        }
        if elements.is_empty() {
            return Err(unexpected("expected a word or '(', got", &tokens, next));
        }

        Ok(Self {
            spec: spec.to_string(),
            elements,
        })
    }

    /// The pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.spec
    }

    /// The top-level sequence of elements.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Calls `visit` with every concrete path, depth first, left alternative
    /// before right. Enumeration stops as soon as `visit` breaks.
    pub fn each<F>(&self, mut visit: F) -> ControlFlow<()>
    where
        F: FnMut(&str) -> ControlFlow<()>,
    {
        let mut path = Vec::new();
        expand_seq(&self.elements, None, &mut path, &mut visit)
    }

    /// Collects every concrete path.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        let _ = self.each(|path| {
            out.push(path.to_string());
            ControlFlow::Continue(())
        });
        out
    }
}

impl fmt::Display for MultiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Dot,
    Open,
    Close,
    Bar,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => write!(f, "'{word}'"),
            Token::Dot => f.write_str("'.'"),
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
            Token::Bar => f.write_str("'|'"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn tokenize(spec: &str) -> Result<Vec<Token<'_>>, ConfigError> {
    let mut tokens = Vec::new();
    let mut word_start = None;

    for (i, c) in spec.char_indices() {
        if is_word_char(c) {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push(Token::Word(&spec[start..i]));
        }
        tokens.push(match c {
            '.' => Token::Dot,
            '(' => Token::Open,
            ')' => Token::Close,
            '|' => Token::Bar,
            other => {
                return Err(ConfigError::syntax(format!(
                    "unexpected character '{other}' in pattern '{spec}'"
                )))
            }
        });
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(&spec[start..]));
    }

    Ok(tokens)
}

fn unexpected(what: &str, tokens: &[Token<'_>], pos: usize) -> ConfigError {
    match tokens.get(pos) {
        Some(token) => ConfigError::syntax(format!("{what} {token}")),
        None => ConfigError::syntax(format!("{what} end of input")),
    }
}

/// `expr := [term ("." term)*]`
///
/// Runs of words separated by dots collapse into a single `Word`. An
/// expression may be empty; the caller decides whether that is allowed.
fn parse_expression(tokens: &[Token<'_>], mut pos: usize) -> Result<(Vec<Element>, usize), ConfigError> {
    let mut out: Vec<Element> = Vec::new();
    let mut joinable = false;

    loop {
        match tokens.get(pos) {
            Some(Token::Word(word)) => {
                match out.last_mut() {
                    Some(Element::Word(prev)) if joinable => {
                        prev.push('.');
                        prev.push_str(word);
                    }
                    _ => out.push(Element::Word(word.to_string())),
                }
                joinable = true;
                pos += 1;
            }
            Some(Token::Open) => {
                let (group, next) = parse_alternation(tokens, pos + 1)?;
                if tokens.get(next) != Some(&Token::Close) {
                    return Err(unexpected("expected ')', got", tokens, next));
                }
                out.push(group);
                joinable = false;
                pos = next + 1;
            }
            _ if out.is_empty() => return Ok((out, pos)),
            _ => return Err(unexpected("expected a word or '(', got", tokens, pos)),
        }

        if tokens.get(pos) != Some(&Token::Dot) {
            return Ok((out, pos));
        }
        pos += 1;
    }
}

/// `alt := expr ("|" expr)*`, parsed after an opening parenthesis.
fn parse_alternation(tokens: &[Token<'_>], pos: usize) -> Result<(Element, usize), ConfigError> {
    let (first, mut pos) = parse_expression(tokens, pos)?;
    let mut branches = vec![collapse(first)];

    while tokens.get(pos) == Some(&Token::Bar) {
        let (branch, next) = parse_expression(tokens, pos + 1)?;
        branches.push(collapse(branch));
        pos = next;
    }

    if branches.len() == 1 {
        return Ok((branches.remove(0), pos));
    }
    Ok((Element::Alt(branches), pos))
}

fn collapse(mut elements: Vec<Element>) -> Element {
    if elements.len() == 1 {
        elements.remove(0)
    } else {
        Element::Seq(elements)
    }
}

/// The rest of an enclosing sequence, still to be expanded once the current
/// element has produced a prefix.
struct Continuation<'a, 'c> {
    rest: &'a [Element],
    next: Option<&'c Continuation<'a, 'c>>,
}

fn expand_seq<'a, F>(
    items: &'a [Element],
    cont: Option<&Continuation<'a, '_>>,
    path: &mut Vec<&'a str>,
    visit: &mut F,
) -> ControlFlow<()>
where
    F: FnMut(&str) -> ControlFlow<()>,
{
    match items.split_first() {
        None => resume(cont, path, visit),
        Some((head, rest)) => {
            let cont = Continuation { rest, next: cont };
            expand_element(head, Some(&cont), path, visit)
        }
    }
}

fn expand_element<'a, F>(
    element: &'a Element,
    cont: Option<&Continuation<'a, '_>>,
    path: &mut Vec<&'a str>,
    visit: &mut F,
) -> ControlFlow<()>
where
    F: FnMut(&str) -> ControlFlow<()>,
{
    match element {
        Element::Word(word) => {
            path.push(word);
            let flow = resume(cont, path, visit);
            path.pop();
            flow
        }
        Element::Seq(items) => expand_seq(items, cont, path, visit),
        Element::Alt(branches) => {
            for branch in branches {
                if expand_element(branch, cont, path, visit).is_break() {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        }
    }
}

fn resume<'a, F>(
    cont: Option<&Continuation<'a, '_>>,
    path: &mut Vec<&'a str>,
    visit: &mut F,
) -> ControlFlow<()>
where
    F: FnMut(&str) -> ControlFlow<()>,
{
    match cont {
        None => visit(&path.join(".")),
        Some(cont) => expand_seq(cont.rest, cont.next, path, visit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(w: &str) -> Element {
        Element::Word(w.to_string())
    }

    fn alt(branches: Vec<Element>) -> Element {
        Element::Alt(branches)
    }

    fn parse(spec: &str) -> Vec<Element> {
        MultiPath::parse(spec).unwrap().elements().to_vec()
    }

    fn paths_until(spec: &str, stop: usize) -> Vec<String> {
        let mut out = Vec::new();
        let _ = MultiPath::parse(spec).unwrap().each(|path| {
            out.push(path.to_string());
            if out.len() == stop {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        out
    }

    fn paths(spec: &str) -> Vec<String> {
        MultiPath::parse(spec).unwrap().paths()
    }

    #[test]
    fn test_dotted_words_collapse() {
        assert_eq!(parse("this.and.that"), vec![word("this.and.that")]);
    }

    #[test]
    fn test_single_branch_group() {
        assert_eq!(parse("(and.or)"), vec![word("and.or")]);
    }

    #[test]
    fn test_simple_alternation() {
        assert_eq!(parse("(and|or)"), vec![alt(vec![word("and"), word("or")])]);
    }

    #[test]
    fn test_embedded_alternation() {
        assert_eq!(
            parse("this.(and|or).that"),
            vec![word("this"), alt(vec![word("and"), word("or")]), word("that")]
        );
    }

    #[test]
    fn test_nested_alternation() {
        assert_eq!(
            parse("this.(and|or.(that|the.other))"),
            vec![
                word("this"),
                alt(vec![
                    word("and"),
                    Element::Seq(vec![word("or"), alt(vec![word("that"), word("the.other")])]),
                ]),
            ]
        );
    }

    #[test]
    fn test_empty_alternative() {
        assert_eq!(
            parse("this.(|and|or).that"),
            vec![
                word("this"),
                alt(vec![Element::Seq(vec![]), word("and"), word("or")]),
                word("that"),
            ]
        );
    }

    #[test]
    fn test_syntax_errors() {
        for spec in ["", "(a|b", "a|b)", "a)", "a|b", "a.", ".a", "a..b", "a.(b", "a b", "a$"] {
            assert!(
                matches!(MultiPath::parse(spec), Err(ConfigError::Syntax(_))),
                "expected syntax error for {spec:?}"
            );
        }
    }

    #[test]
    fn test_each_single_word() {
        assert_eq!(paths("this"), vec!["this"]);
    }

    #[test]
    fn test_each_embedded_alternation() {
        assert_eq!(paths("choose.(this|that).now"), vec!["choose.this.now", "choose.that.now"]);
    }

    #[test]
    fn test_each_empty_alternative() {
        assert_eq!(paths("x.(|y).z"), vec!["x.z", "x.y.z"]);
        assert_eq!(
            paths("choose.(|this|that).now"),
            vec!["choose.now", "choose.this.now", "choose.that.now"]
        );
        assert_eq!(paths("config.(local|)"), vec!["config.local", "config"]);
    }

    #[test]
    fn test_each_sequential_alternations() {
        assert_eq!(paths("(a|b).(c|d)"), vec!["a.c", "a.d", "b.c", "b.d"]);
    }

    #[test]
    fn test_each_nested_alternations() {
        assert_eq!(
            paths("a.(b.(c|d)|(e|f).g).h"),
            vec!["a.b.c.h", "a.b.d.h", "a.e.g.h", "a.f.g.h"]
        );
    }

    #[test]
    fn test_each_stops_on_break() {
        assert_eq!(
            paths_until("a.((b|c).(d|e)|(f|g).(h|i)).j", 7),
            vec!["a.b.d.j", "a.b.e.j", "a.c.d.j", "a.c.e.j", "a.f.h.j", "a.f.i.j", "a.g.h.j"]
        );
    }

    #[test]
    fn test_each_reports_break() {
        let pattern = MultiPath::parse("(a|b|c)").unwrap();
        let mut calls = 0;
        let flow = pattern.each(|_| {
            calls += 1;
            ControlFlow::Break(())
        });
        assert!(flow.is_break());
        assert_eq!(calls, 1);
    }
}
