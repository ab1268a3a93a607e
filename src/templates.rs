//! Template expansion for monitor command lines and descriptions.
//!
//! Monitor definitions carry small templates supporting variable
//! substitution (`{{name}}`) and conditional blocks
//! (`{% if name %}...{% else %}...{% endif %}`). Values are strings; a
//! missing or empty value is falsy and substitutes as the empty string.
//! Rendered command lines are then shell-split honoring double quotes.
//!
//! Expanded values are cached per monitor in a [`TemplateCache`] owned by
//! the monitor definition; the cache is flushed explicitly when the
//! definition or a monitor's arguments change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError(pub String);

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TemplateError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Var(String),
    If(String),
    Else,
    EndIf,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Var(String),
    Cond {
        var: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

fn lex(template: &str) -> TemplateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = template;
    loop {
        let var_pos = rest.find("{{");
        let tag_pos = rest.find("{%");
        let (pos, is_var) = match (var_pos, tag_pos) {
            (None, None) => {
                if !rest.is_empty() {
                    tokens.push(Token::Text(rest.to_string()));
                }
                return Ok(tokens);
            }
            (Some(v), None) => (v, true),
            (None, Some(t)) => (t, false),
            (Some(v), Some(t)) => {
                if v < t {
                    (v, true)
                } else {
                    (t, false)
                }
            }
        };
        if pos > 0 {
            tokens.push(Token::Text(rest[..pos].to_string()));
        }
        let after = &rest[pos + 2..];
        if is_var {
            let end = after
                .find("}}")
                .ok_or_else(|| TemplateError("unterminated variable tag".to_string()))?;
            tokens.push(Token::Var(after[..end].trim().to_string()));
            rest = &after[end + 2..];
        } else {
            let end = after
                .find("%}")
                .ok_or_else(|| TemplateError("unterminated block tag".to_string()))?;
            let inner = after[..end].trim();
            let mut words = inner.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("if"), Some(name), None) => tokens.push(Token::If(name.to_string())),
                (Some("else"), None, None) => tokens.push(Token::Else),
                (Some("endif"), None, None) => tokens.push(Token::EndIf),
                _ => return Err(TemplateError(format!("unknown template tag '{inner}'"))),
            }
            rest = &after[end + 2..];
        }
    }
}

/// Terminator a nested block ended on.
#[derive(Debug, PartialEq)]
enum BlockEnd {
    Else,
    EndIf,
    Input,
}

fn parse_block<I>(tokens: &mut I, nested: bool) -> TemplateResult<(Vec<Node>, BlockEnd)>
where
    I: Iterator<Item = Token>,
{
    let mut nodes = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            Token::Text(text) => nodes.push(Node::Text(text)),
            Token::Var(name) => nodes.push(Node::Var(name)),
            Token::If(var) => {
                let (then, end) = parse_block(tokens, true)?;
                let otherwise = match end {
                    BlockEnd::Else => {
                        let (otherwise, end) = parse_block(tokens, true)?;
                        if end != BlockEnd::EndIf {
                            return Err(TemplateError("missing endif".to_string()));
                        }
                        otherwise
                    }
                    BlockEnd::EndIf => Vec::new(),
                    BlockEnd::Input => {
                        return Err(TemplateError("missing endif".to_string()));
                    }
                };
                nodes.push(Node::Cond {
                    var,
                    then,
                    otherwise,
                });
            }
            Token::Else => {
                if !nested {
                    return Err(TemplateError("unexpected else".to_string()));
                }
                return Ok((nodes, BlockEnd::Else));
            }
            Token::EndIf => {
                if !nested {
                    return Err(TemplateError("unexpected endif".to_string()));
                }
                return Ok((nodes, BlockEnd::EndIf));
            }
        }
    }
    Ok((nodes, BlockEnd::Input))
}

fn render_nodes(nodes: &[Node], vars: &HashMap<String, String>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(name) => {
                if let Some(value) = vars.get(name) {
                    out.push_str(value);
                }
            }
            Node::Cond {
                var,
                then,
                otherwise,
            } => {
                let truthy = vars.get(var).map(|v| !v.is_empty()).unwrap_or(false);
                if truthy {
                    render_nodes(then, vars, out);
                } else {
                    render_nodes(otherwise, vars, out);
                }
            }
        }
    }
}

/// Render a template against a variable map.
pub fn render(template: &str, vars: &HashMap<String, String>) -> TemplateResult<String> {
    let tokens = lex(template)?;
    let (nodes, end) = parse_block(&mut tokens.into_iter(), false)?;
    if end != BlockEnd::Input {
        return Err(TemplateError("unbalanced template blocks".to_string()));
    }
    let mut out = String::new();
    render_nodes(&nodes, vars, &mut out);
    Ok(out)
}

/// Render a command line template and shell-split the result into argv
/// tokens, honoring double-quoted groups.
pub fn render_args(template: &str, vars: &HashMap<String, String>) -> TemplateResult<Vec<String>> {
    let rendered = render(template, vars)?;
    shlex::split(&rendered)
        .ok_or_else(|| TemplateError(format!("unbalanced quoting in command line '{rendered}'")))
}

/// Per-definition cache of expanded command lines and descriptions, keyed
/// by monitor id.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<i64, CacheEntry>>,
}

#[derive(Debug, Default, Clone)]
struct CacheEntry {
    args: Option<Vec<String>>,
    description: Option<String>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_args(&self, monitor_id: i64) -> Option<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        entries.get(&monitor_id).and_then(|e| e.args.clone())
    }

    pub fn store_args(&self, monitor_id: i64, args: Vec<String>) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(monitor_id).or_default().args = Some(args.clone());
        args
    }

    pub fn cached_description(&self, monitor_id: i64) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries.get(&monitor_id).and_then(|e| e.description.clone())
    }

    pub fn store_description(&self, monitor_id: i64, description: String) -> String {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(monitor_id).or_default().description = Some(description.clone());
        description
    }

    /// Drop every cached expansion. Called when the owning definition
    /// changes.
    pub fn flush_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Drop the cached expansions for a single monitor. Called when its
    /// arguments change or it is purged.
    pub fn flush_monitor(&self, monitor_id: i64) {
        self.entries.lock().unwrap().remove(&monitor_id);
    }
}
