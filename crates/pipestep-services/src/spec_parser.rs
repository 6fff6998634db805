//! Pipeline spec parser.
//!
//! Reads the DOT subset pipelines are written in:
//!
//! ```text
//! digraph price {
//!     fetch  [type=http method=GET url="https://example.com/price"];
//!     parse  [type=jsonparse path="data,usd"];
//!     scale  [type=multiply input="$(parse)" times=100];
//!     fetch -> parse -> scale;
//! }
//! ```
//!
//! Every node declares a `type`. An edge makes the upstream result a
//! positional input of the downstream node unless the edge carries
//! `propagateResult=false`. A `$(node...)` reference inside an attribute adds
//! an ordering-only dependency. Nodes come back in a stable topological
//! order: among ready nodes, declaration order wins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use pipestep_core::convert::to_bool;
use serde::Serialize;

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub id: String,
    /// Whether the upstream result is passed as a positional input.
    pub propagate_result: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    pub id: String,
    pub task_type: String,
    /// Every attribute except `type`.
    pub attrs: BTreeMap<String, String>,
    pub dependencies: Vec<Dependency>,
    pub line: usize,
}

impl PipelineNode {
    /// Upstream nodes whose result this node receives, in order.
    pub fn propagated_inputs(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|d| d.propagate_result)
            .map(|d| d.id.as_str())
    }
}

/// A parsed pipeline, nodes in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub nodes: Vec<PipelineNode>,
}

impl Pipeline {
    pub fn get(&self, id: &str) -> Option<&PipelineNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: Option<usize>,
    pub message: String,
}

impl ParseError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ParseError {}

// ── Lexer ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Quoted(String),
    Angle(String),
    Arrow,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Comma,
    Semi,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Word(w) => format!("{w:?}"),
            Tok::Quoted(s) => format!("string {s:?}"),
            Tok::Angle(_) => "<...> block".to_string(),
            Tok::Arrow => "\"->\"".to_string(),
            Tok::LBrace => "\"{\"".to_string(),
            Tok::RBrace => "\"}\"".to_string(),
            Tok::LBracket => "\"[\"".to_string(),
            Tok::RBracket => "\"]\"".to_string(),
            Tok::Equals => "\"=\"".to_string(),
            Tok::Comma => "\",\"".to_string(),
            Tok::Semi => "\";\"".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '+')
}

fn lex(text: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let start_line = line;

        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i += 2;
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::at(start_line, "unterminated comment")),
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some('\n') => line += 1,
                        Some(_) => {}
                    }
                    i += 1;
                }
            }
            '-' if next == Some('>') => {
                out.push(Token {
                    tok: Tok::Arrow,
                    line: start_line,
                });
                i += 2;
            }
            '{' | '}' | '[' | ']' | '=' | ',' | ';' => {
                let tok = match c {
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    '=' => Tok::Equals,
                    ',' => Tok::Comma,
                    _ => Tok::Semi,
                };
                out.push(Token {
                    tok,
                    line: start_line,
                });
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::at(start_line, "unterminated string")),
                        Some('"') => break,
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('"') => s.push('"'),
                                Some('\\') => s.push('\\'),
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(other) => {
                                    s.push('\\');
                                    s.push(*other);
                                }
                                None => {
                                    return Err(ParseError::at(start_line, "unterminated string"))
                                }
                            }
                            i += 1;
                        }
                        Some(ch) => {
                            if *ch == '\n' {
                                line += 1;
                            }
                            s.push(*ch);
                        }
                    }
                    i += 1;
                }
                i += 1;
                out.push(Token {
                    tok: Tok::Quoted(s),
                    line: start_line,
                });
            }
            '<' => {
                let mut depth = 1;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::at(start_line, "unterminated <...> block")),
                        Some('<') => depth += 1,
                        Some('>') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        Some('\n') => line += 1,
                        Some(_) => {}
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                i += 1;
                out.push(Token {
                    tok: Tok::Angle(s.trim().to_string()),
                    line: start_line,
                });
            }
            c if is_word_char(c) => {
                let mut w = String::new();
                while i < chars.len()
                    && is_word_char(chars[i])
                    && !(chars[i] == '-' && chars.get(i + 1) == Some(&'>'))
                {
                    w.push(chars[i]);
                    i += 1;
                }
                out.push(Token {
                    tok: Tok::Word(w),
                    line: start_line,
                });
            }
            other => {
                return Err(ParseError::at(line, format!("unexpected character {other:?}")));
            }
        }
    }
    Ok(out)
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct NodeDecl {
    id: String,
    attrs: BTreeMap<String, String>,
    line: usize,
}

struct EdgeDecl {
    from: String,
    to: String,
    propagate: bool,
    line: usize,
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    nodes: Vec<NodeDecl>,
    edges: Vec<EdgeDecl>,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map_or(1, |t| t.line)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Tok) -> Result<(), ParseError> {
        let line = self.line();
        match self.next() {
            Some(t) if t.tok == want => Ok(()),
            Some(t) => Err(ParseError::at(
                t.line,
                format!("expected {}, found {}", want.describe(), t.tok.describe()),
            )),
            None => Err(ParseError::at(
                line,
                format!("expected {}, found end of input", want.describe()),
            )),
        }
    }

    fn ident(&mut self) -> Result<(String, usize), ParseError> {
        let line = self.line();
        match self.next() {
            Some(Token {
                tok: Tok::Word(w) | Tok::Quoted(w),
                line,
            }) => Ok((w, line)),
            Some(t) => Err(ParseError::at(
                t.line,
                format!("expected a name, found {}", t.tok.describe()),
            )),
            None => Err(ParseError::at(line, "expected a name, found end of input")),
        }
    }

    fn value(&mut self) -> Result<String, ParseError> {
        let line = self.line();
        match self.next() {
            Some(Token {
                tok: Tok::Word(s) | Tok::Quoted(s) | Tok::Angle(s),
                ..
            }) => Ok(s),
            Some(t) => Err(ParseError::at(
                t.line,
                format!("expected a value, found {}", t.tok.describe()),
            )),
            None => Err(ParseError::at(line, "expected a value, found end of input")),
        }
    }

    fn file(&mut self) -> Result<(), ParseError> {
        if matches!(self.peek(), Some(Tok::Word(w)) if w == "strict") {
            self.pos += 1;
        }
        if matches!(self.peek(), Some(Tok::Word(w)) if w == "digraph" || w == "graph") {
            self.pos += 1;
            if matches!(self.peek(), Some(Tok::Word(_) | Tok::Quoted(_))) {
                self.pos += 1;
            }
            self.expect(Tok::LBrace)?;
            self.statements(true)?;
            self.expect(Tok::RBrace)?;
            while matches!(self.peek(), Some(Tok::Semi)) {
                self.pos += 1;
            }
            if let Some(t) = self.next() {
                return Err(ParseError::at(
                    t.line,
                    format!("unexpected {} after graph body", t.tok.describe()),
                ));
            }
            Ok(())
        } else {
            self.statements(false)
        }
    }

    fn statements(&mut self, in_braces: bool) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                None => return Ok(()),
                Some(Tok::RBrace) if in_braces => return Ok(()),
                Some(Tok::Semi) => self.pos += 1,
                Some(_) => self.statement()?,
            }
        }
    }

    fn statement(&mut self) -> Result<(), ParseError> {
        let (first, line) = self.ident()?;

        // Graph-wide defaults (`node [...]`, `edge [...]`, `graph [...]`) and
        // graph attributes (`rankdir=LR`) carry nothing a pipeline uses.
        if matches!(first.as_str(), "node" | "edge" | "graph")
            && matches!(self.peek(), Some(Tok::LBracket))
        {
            self.attrs()?;
            return Ok(());
        }
        if matches!(self.peek(), Some(Tok::Equals)) {
            self.pos += 1;
            self.value()?;
            return Ok(());
        }

        let mut chain = vec![first];
        while matches!(self.peek(), Some(Tok::Arrow)) {
            self.pos += 1;
            chain.push(self.ident()?.0);
        }
        let attrs = if matches!(self.peek(), Some(Tok::LBracket)) {
            self.attrs()?
        } else {
            BTreeMap::new()
        };

        if chain.len() == 1 {
            let id = chain.remove(0);
            if id.contains('.') {
                return Err(ParseError::at(
                    line,
                    format!("node id {id:?} contains '.', which $(id.field) references cannot address"),
                ));
            }
            if let Some(prev) = self.nodes.iter().find(|n| n.id == id) {
                return Err(ParseError::at(
                    line,
                    format!("node {id:?} already declared on line {}", prev.line),
                ));
            }
            self.nodes.push(NodeDecl { id, attrs, line });
        } else {
            let propagate = match attrs.get("propagateResult") {
                None => true,
                Some(v) => to_bool(v).map_err(|e| ParseError::at(line, e.to_string()))?,
            };
            for pair in chain.windows(2) {
                self.edges.push(EdgeDecl {
                    from: pair[0].clone(),
                    to: pair[1].clone(),
                    propagate,
                    line,
                });
            }
        }
        Ok(())
    }

    fn attrs(&mut self) -> Result<BTreeMap<String, String>, ParseError> {
        self.expect(Tok::LBracket)?;
        let mut attrs = BTreeMap::new();
        loop {
            match self.peek() {
                Some(Tok::RBracket) => {
                    self.pos += 1;
                    return Ok(attrs);
                }
                Some(Tok::Comma | Tok::Semi) => self.pos += 1,
                _ => {
                    let (key, _) = self.ident()?;
                    self.expect(Tok::Equals)?;
                    let value = self.value()?;
                    attrs.insert(key, value);
                }
            }
        }
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// Names of nodes referenced by `$(name...)` expressions in `value`.
fn referenced_names(value: &str) -> impl Iterator<Item = &str> {
    value.split("$(").skip(1).filter_map(|rest| {
        let end = rest.find(|c| c == ')' || c == '.')?;
        Some(rest[..end].trim())
    })
}

/// Parse a pipeline spec.
pub fn parse(text: &str) -> Result<Pipeline, ParseError> {
    let mut parser = Parser {
        toks: lex(text)?,
        pos: 0,
        nodes: Vec::new(),
        edges: Vec::new(),
    };
    parser.file()?;
    let Parser { nodes, edges, .. } = parser;

    let index: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    let mut deps: Vec<Vec<Dependency>> = vec![Vec::new(); nodes.len()];
    for e in &edges {
        for end in [&e.from, &e.to] {
            if !index.contains_key(end.as_str()) {
                return Err(ParseError::at(
                    e.line,
                    format!("edge refers to undeclared node {end:?}"),
                ));
            }
        }
        let list = &mut deps[index[&e.to]];
        if !list.iter().any(|d| d.id == e.from) {
            list.push(Dependency {
                id: e.from.clone(),
                propagate_result: e.propagate,
            });
        }
    }

    let mut built = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.into_iter().enumerate() {
        let mut attrs = node.attrs;
        let task_type = attrs
            .remove("type")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ParseError::at(node.line, format!("node {:?} has no type", node.id)))?;

        let list = &mut deps[i];
        for value in attrs.values() {
            for name in referenced_names(value) {
                if name != node.id && index.contains_key(name) && !list.iter().any(|d| d.id == name) {
                    list.push(Dependency {
                        id: name.to_string(),
                        propagate_result: false,
                    });
                }
            }
        }

        built.push(PipelineNode {
            id: node.id,
            task_type: task_type.trim().to_string(),
            attrs,
            dependencies: std::mem::take(list),
            line: node.line,
        });
    }

    let order = execution_order(&built)?;
    let mut slots: Vec<Option<PipelineNode>> = built.into_iter().map(Some).collect();
    let nodes = order.into_iter().filter_map(|i| slots[i].take()).collect();
    Ok(Pipeline { nodes })
}

/// Kahn's algorithm, lowest declaration index first among ready nodes.
fn execution_order(nodes: &[PipelineNode]) -> Result<Vec<usize>, ParseError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), 0);
    let handles: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.dependencies {
            graph.add_edge(handles[index[dep.id.as_str()]], handles[i], ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let node = &nodes[graph[cycle.node_id()]];
        return Err(ParseError::at(
            node.line,
            format!("cycle detected involving node {:?}", node.id),
        ));
    }

    let mut indegree: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for downstream in graph.neighbors(handles[i]) {
            let j = graph[downstream];
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }
    Ok(order)
}
