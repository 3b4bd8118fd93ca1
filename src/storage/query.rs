//! Edge-pattern query language understood by the in-memory engine.
//!
//! One pattern per query; enough to inspect a repository without a full
//! query engine.
//!
//! ```text
//! SELECT [DISTINCT] (?var+ | *) WHERE <s> <p> <o> [IN <ctx>]
//! CONSTRUCT WHERE <s> <p> <o> [IN <ctx>]
//! ```
//!
//! Terms are `?var`, `<resource>`, `"literal"`, or a bare word (a resource).
//! Without `IN`, the pattern matches edges in every context.

use super::traits::Row;
use crate::models::{GraphEdge, Term};
use crate::{Error, Result};

/// A term in a pattern position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternTerm {
    /// Variable binding any value.
    Var(String),
    /// Fixed resource.
    Resource(String),
    /// Fixed literal (object position only).
    Literal(String),
}

/// What a query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Tabular rows over the listed variables (`None` = all).
    Select {
        /// Projected variables.
        vars: Option<Vec<String>>,
        /// Drop duplicate rows.
        distinct: bool,
    },
    /// Matching edges.
    Construct,
}

/// A single edge pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePattern {
    /// Subject position.
    pub subject: PatternTerm,
    /// Predicate position.
    pub predicate: PatternTerm,
    /// Object position.
    pub object: PatternTerm,
    /// Optional context restriction.
    pub context: Option<PatternTerm>,
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Projection.
    pub projection: Projection,
    /// Pattern.
    pub pattern: EdgePattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Resource(String),
    Literal(String),
    Var(String),
}

fn syntax(msg: impl Into<String>) -> Error {
    Error::QuerySyntaxError(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '<' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(ch) => value.push(ch),
                        None => return Err(syntax("unterminated resource, expected '>'")),
                    }
                }
                tokens.push(Token::Resource(value));
            },
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => return Err(syntax("dangling escape in literal")),
                        },
                        Some('"') => break,
                        Some(ch) => value.push(ch),
                        None => return Err(syntax("unterminated literal, expected '\"'")),
                    }
                }
                tokens.push(Token::Literal(value));
            },
            '?' => {
                chars.next();
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(syntax("variable name expected after '?'"));
                }
                tokens.push(Token::Var(name));
            },
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            },
        }
    }

    Ok(tokens)
}

fn is_keyword(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
}

fn to_term(token: Token, position: &str) -> Result<PatternTerm> {
    match token {
        Token::Var(name) => Ok(PatternTerm::Var(name)),
        Token::Resource(value) => Ok(PatternTerm::Resource(value)),
        Token::Word(word) => Ok(PatternTerm::Resource(word)),
        Token::Literal(value) if position == "object" => Ok(PatternTerm::Literal(value)),
        Token::Literal(_) => Err(syntax(format!("literal not allowed in {position} position"))),
    }
}

/// Parses a query.
///
/// # Errors
///
/// Returns [`Error::QuerySyntaxError`] if the query does not follow the grammar.
pub fn parse(query: &str) -> Result<ParsedQuery> {
    let mut tokens = tokenize(query)?.into_iter().peekable();

    let head = tokens.next().ok_or_else(|| syntax("empty query"))?;
    let projection = if is_keyword(&head, "SELECT") {
        let distinct = tokens
            .next_if(|t| is_keyword(t, "DISTINCT"))
            .is_some();
        if tokens.next_if(|t| matches!(t, Token::Word(w) if w == "*")).is_some() {
            Projection::Select {
                vars: None,
                distinct,
            }
        } else {
            let mut vars = Vec::new();
            while let Some(Token::Var(name)) = tokens.next_if(|t| matches!(t, Token::Var(_))) {
                vars.push(name);
            }
            if vars.is_empty() {
                return Err(syntax("SELECT requires '*' or at least one variable"));
            }
            Projection::Select {
                vars: Some(vars),
                distinct,
            }
        }
    } else if is_keyword(&head, "CONSTRUCT") {
        Projection::Construct
    } else {
        return Err(syntax("query must start with SELECT or CONSTRUCT"));
    };

    match tokens.next() {
        Some(ref t) if is_keyword(t, "WHERE") => {},
        _ => return Err(syntax("expected WHERE")),
    }

    let mut next_term = |position: &str| -> Result<PatternTerm> {
        let token = tokens
            .next()
            .ok_or_else(|| syntax(format!("missing {position} in pattern")))?;
        to_term(token, position)
    };
    let subject = next_term("subject")?;
    let predicate = next_term("predicate")?;
    let object = next_term("object")?;

    let context = match tokens.next() {
        None => None,
        Some(ref t) if is_keyword(t, "IN") => {
            let token = tokens
                .next()
                .ok_or_else(|| syntax("missing context after IN"))?;
            Some(to_term(token, "context")?)
        },
        Some(other) => return Err(syntax(format!("unexpected token {other:?}"))),
    };
    if let Some(extra) = tokens.next() {
        return Err(syntax(format!("unexpected trailing token {extra:?}")));
    }

    Ok(ParsedQuery {
        projection,
        pattern: EdgePattern {
            subject,
            predicate,
            object,
            context,
        },
    })
}

impl EdgePattern {
    /// Variables bound by this pattern, in position order.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut vars = Vec::new();
        for term in [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .chain(self.context.as_ref())
        {
            if let PatternTerm::Var(name) = term
                && !vars.contains(&name.as_str())
            {
                vars.push(name.as_str());
            }
        }
        vars
    }

    /// Matches an edge, returning the variable bindings.
    #[must_use]
    pub fn bind(&self, edge: &GraphEdge) -> Option<Row> {
        let mut row = Row::new();
        bind_resource(&self.subject, edge.subject(), &mut row)?;
        bind_resource(&self.predicate, edge.predicate(), &mut row)?;
        match &self.object {
            PatternTerm::Var(name) => bind_var(name, edge.object().clone(), &mut row)?,
            PatternTerm::Resource(value) => {
                (edge.object() == &Term::Resource(value.clone())).then_some(())?;
            },
            PatternTerm::Literal(value) => {
                (edge.object() == &Term::Literal(value.clone())).then_some(())?;
            },
        }
        if let Some(ref context) = self.context {
            bind_resource(context, edge.context()?, &mut row)?;
        }
        Some(row)
    }
}

fn bind_resource(term: &PatternTerm, value: &str, row: &mut Row) -> Option<()> {
    match term {
        PatternTerm::Var(name) => bind_var(name, Term::iri(value), row),
        PatternTerm::Resource(expected) => (expected == value).then_some(()),
        PatternTerm::Literal(_) => None,
    }
}

fn bind_var(name: &str, value: Term, row: &mut Row) -> Option<()> {
    match row.get(name) {
        Some(existing) => (existing == &value).then_some(()),
        None => {
            row.insert(name.to_string(), value);
            Some(())
        },
    }
}

impl ParsedQuery {
    /// Checks that every projected variable is bound by the pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryExecutionError`] naming the unbound variable.
    pub fn validate(&self) -> Result<()> {
        if let Projection::Select {
            vars: Some(ref vars),
            ..
        } = self.projection
        {
            let bound = self.pattern.variables();
            if let Some(missing) = vars.iter().find(|v| !bound.contains(&v.as_str())) {
                return Err(Error::QueryExecutionError(format!(
                    "variable ?{missing} is not bound by the pattern"
                )));
            }
        }
        Ok(())
    }

    /// Projects a full binding row onto the selected variables.
    #[must_use]
    pub fn project(&self, row: Row) -> Row {
        match self.projection {
            Projection::Select {
                vars: Some(ref vars),
                ..
            } => row
                .into_iter()
                .filter(|(name, _)| vars.contains(name))
                .collect(),
            _ => row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select_distinct() {
        let q = parse("SELECT DISTINCT ?s WHERE ?s ?p ?o").unwrap();
        assert_eq!(
            q.projection,
            Projection::Select {
                vars: Some(vec!["s".to_string()]),
                distinct: true
            }
        );
        assert_eq!(q.pattern.variables(), vec!["s", "p", "o"]);
    }

    #[test]
    fn test_parse_construct_with_context() {
        let q = parse(r#"construct where <urn:s> ?p "hello \"world\"" in <urn:g>"#).unwrap();
        assert_eq!(q.projection, Projection::Construct);
        assert_eq!(q.pattern.subject, PatternTerm::Resource("urn:s".into()));
        assert_eq!(
            q.pattern.object,
            PatternTerm::Literal("hello \"world\"".into())
        );
        assert_eq!(q.pattern.context, Some(PatternTerm::Resource("urn:g".into())));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "",
            "DELETE WHERE ?s ?p ?o",
            "SELECT WHERE ?s ?p ?o",
            "SELECT ?s ?s ?p ?o",
            "SELECT ?s WHERE ?s ?p",
            "SELECT ?s WHERE \"lit\" ?p ?o",
            "SELECT ?s WHERE <unterminated ?p ?o",
            "SELECT ?s WHERE ?s ?p ?o extra",
            "SELECT ? WHERE ?s ?p ?o",
        ] {
            assert!(
                matches!(parse(bad), Err(Error::QuerySyntaxError(_))),
                "expected syntax error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_unbound_projection_is_execution_error() {
        let q = parse("SELECT ?x WHERE ?s ?p ?o").unwrap();
        assert!(matches!(q.validate(), Err(Error::QueryExecutionError(_))));
    }

    #[test]
    fn test_bind_repeated_variable() {
        let q = parse("SELECT * WHERE ?x <p> ?x").unwrap();
        let same = GraphEdge::new("a", "p", Term::iri("a"));
        let different = GraphEdge::new("a", "p", Term::iri("b"));
        assert!(q.pattern.bind(&same).is_some());
        assert!(q.pattern.bind(&different).is_none());
    }

    #[test]
    fn test_context_variable_requires_context() {
        let q = parse("SELECT ?g WHERE ?s ?p ?o IN ?g").unwrap();
        let plain = GraphEdge::new("a", "p", Term::iri("b"));
        let scoped = plain.clone().in_context("g1");
        assert!(q.pattern.bind(&plain).is_none());
        let row = q.pattern.bind(&scoped).unwrap();
        assert_eq!(row.get("g"), Some(&Term::iri("g1")));
    }

    #[test]
    fn test_literal_object_does_not_match_resource() {
        let q = parse("CONSTRUCT WHERE ?s ?p \"o\"").unwrap();
        assert!(q.pattern.bind(&GraphEdge::new("s", "p", Term::iri("o"))).is_none());
        assert!(
            q.pattern
                .bind(&GraphEdge::new("s", "p", Term::literal("o")))
                .is_some()
        );
    }
}
