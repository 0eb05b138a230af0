//! Deterministic keyword-matching executor.
//!
//! Scores each operation by how many of the resource words in its name occur
//! in the request. Verbs only break ties, so "get order 456" never matches
//! `get_customer_by_id`. Arguments come from `name=value` pairs, from a
//! parameter name followed by a value, and from ID-like tokens.

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::capabilities::openapi_parser::singularize;
use crate::capabilities::OperationDescriptor;

use super::executor::{CapabilityExecutor, ExecutorError, OperationCall, Selection};

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|([A-Za-z0-9][A-Za-z0-9._@-]*)"#).unwrap());
static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*[=:]\s*("[^"]*"|[^\s,]+)"#).unwrap());

const VERBS: &[&str] = &[
    "get", "list", "create", "update", "delete", "patch", "put", "post", "fetch", "find",
    "search", "add", "remove", "by", "id", "all",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "for", "with", "of", "to", "me", "please", "my", "and", "in", "on", "at",
    "is", "from", "all",
];

#[derive(Debug, Clone)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn is_value(&self) -> bool {
        self.quoted || self.text.chars().any(|c| c.is_ascii_digit())
    }

    fn normalized(&self) -> String {
        singularize(&self.text.to_lowercase())
    }
}

/// Picks operations by word overlap. No model, no network.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordExecutor;

impl KeywordExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CapabilityExecutor for KeywordExecutor {
    async fn select(
        &self,
        request: &str,
        operations: &[OperationDescriptor],
        _instruction: &str,
    ) -> Result<Selection, ExecutorError> {
        let tokens = tokenize(request);
        let words: HashSet<String> = tokens
            .iter()
            .filter(|t| !t.quoted)
            .map(Token::normalized)
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .collect();

        let mut best: Option<(f64, &OperationDescriptor, Map<String, Value>, Vec<String>)> = None;

        for op in operations {
            let (verbs, nouns): (Vec<&str>, Vec<&str>) = op
                .name
                .split('_')
                .filter(|part| !part.is_empty())
                .partition(|part| VERBS.contains(part));

            let noun_hits = nouns
                .iter()
                .filter(|n| words.contains(&singularize(n)))
                .count();
            if noun_hits == 0 {
                continue;
            }
            let verb_hits = verbs
                .iter()
                .filter(|v| !matches!(**v, "by" | "id") && words.contains(**v))
                .count();

            let arguments = extract_arguments(request, &tokens, op);
            let missing: Vec<String> = op
                .argument_names()
                .into_iter()
                .filter(|name| op.is_required(name) && !arguments.contains_key(name))
                .collect();

            let mut score = noun_hits as f64 * 2.0 + verb_hits as f64;
            score -= (nouns.len() - noun_hits) as f64 * 0.5;
            if missing.is_empty() {
                score += 0.5;
            } else {
                score -= missing.len() as f64;
            }

            if best.as_ref().map_or(true, |(s, ..)| score > *s) {
                best = Some((score, op, arguments, missing));
            }
        }

        let Some((score, op, arguments, missing)) = best else {
            return Ok(Selection::NotFound {
                reason: format!("no available operation matches '{}'", request),
            });
        };

        tracing::debug!(operation = %op.name, score, "Keyword match");

        if !missing.is_empty() {
            return Ok(Selection::Reply(format!(
                "Missing required argument(s) for {}: {}",
                op.name,
                missing.join(", ")
            )));
        }
        Ok(Selection::Invoke(OperationCall::new(
            op.name.clone(),
            Value::Object(arguments),
        )))
    }
}

fn tokenize(request: &str) -> Vec<Token> {
    TOKEN
        .captures_iter(request)
        .filter_map(|caps| {
            if let Some(quoted) = caps.get(1) {
                Some(Token {
                    text: quoted.as_str().to_string(),
                    quoted: true,
                })
            } else {
                caps.get(2).map(|m| Token {
                    text: m.as_str().trim_end_matches('.').to_string(),
                    quoted: false,
                })
            }
        })
        .collect()
}

fn extract_arguments(
    request: &str,
    tokens: &[Token],
    op: &OperationDescriptor,
) -> Map<String, Value> {
    let names = op.argument_names();
    let lookup = |key: &str| names.iter().find(|n| n.eq_ignore_ascii_case(key)).cloned();
    let mut args = Map::new();
    let mut used: HashSet<usize> = HashSet::new();

    for caps in ASSIGNMENT.captures_iter(request) {
        if let Some(name) = lookup(&caps[1]) {
            let raw = caps[2].trim_matches('"');
            args.insert(name.clone(), coerce(op, &name, raw));
        }
    }

    // "limit 5", "id 123"
    for (i, token) in tokens.iter().enumerate() {
        if token.quoted {
            continue;
        }
        let Some(name) = lookup(&token.text) else {
            continue;
        };
        if args.contains_key(&name) {
            continue;
        }
        if let Some(next) = tokens.get(i + 1).filter(|t| t.is_value()) {
            args.insert(name.clone(), coerce(op, &name, &next.text));
            used.insert(i + 1);
        }
    }

    let assigned: HashSet<String> = args
        .values()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    let mut values = tokens
        .iter()
        .enumerate()
        .filter(|(i, t)| t.is_value() && !used.contains(i) && !assigned.contains(&t.text))
        .map(|(_, t)| t.text.clone());

    let id_like = |name: &str| {
        let lower = name.to_lowercase();
        lower == "id" || lower.ends_with("_id") || name.ends_with("Id")
    };
    let targets: Vec<String> = names
        .iter()
        .filter(|n| !args.contains_key(*n) && op.is_required(n))
        .chain(
            names
                .iter()
                .filter(|n| !args.contains_key(*n) && !op.is_required(n) && id_like(n.as_str())),
        )
        .cloned()
        .collect();

    for name in targets {
        match values.next() {
            Some(raw) => {
                let value = coerce(op, &name, &raw);
                args.insert(name, value);
            }
            None => break,
        }
    }

    args
}

/// Convert a raw token to the JSON type the parameter schema declares.
fn coerce(op: &OperationDescriptor, name: &str, raw: &str) -> Value {
    let ty = op
        .parameters
        .pointer(&format!("/properties/{}/type", name))
        .and_then(|t| t.as_str())
        .unwrap_or("string");
    match ty {
        "integer" => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        "number" => raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        "boolean" => raw
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}
