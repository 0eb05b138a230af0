//! OpenAPI 3 parser: turns `paths.<path>.<method>` entries into [`Operation`]s.
//!
//! We parse:
//! - `servers[0].url` → base URL
//! - `operationId` (snake_cased) or method + path → operation name
//! - `parameters` at path and operation level, with their `in` location
//! - `requestBody` JSON schema → body arguments
//! - `security` + `components.securitySchemes` → auth requirement
//!
//! Local `$ref`s (`#/components/...`) are resolved. This is not a full
//! OpenAPI implementation, just enough to call real-world specs.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::auth::{ApiKeyLocation, AuthScheme};

use super::error::SpecError;
use super::operation::{Operation, OperationParameter, ParameterLocation};

const METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "head", "options"];
const MAX_REF_DEPTH: usize = 16;

/// Parse an OpenAPI 3.0 JSON/YAML string into operations.
///
/// An empty `paths` object yields an empty list; deciding whether that is
/// acceptable is up to the caller.
pub fn parse_openapi_spec(spec_content: &str) -> Result<Vec<Operation>, SpecError> {
    let doc: Value = if spec_content.trim_start().starts_with('{') {
        serde_json::from_str(spec_content).map_err(|e| SpecError::Parse(e.to_string()))?
    } else {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(spec_content).map_err(|e| SpecError::Parse(e.to_string()))?;
        yaml_to_json(yaml)
    };

    let paths = doc
        .get("paths")
        .and_then(|p| p.as_object())
        .ok_or(SpecError::MissingPaths)?;

    let base_url = doc
        .pointer("/servers/0/url")
        .and_then(|u| u.as_str())
        .map(|u| u.trim_end_matches('/').to_string());
    let schemes = security_schemes(&doc);
    let root_security = doc.get("security");

    let mut operations = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for (path, path_item) in paths {
        let path_item = resolve(&doc, path_item)?;
        let path_obj = match path_item.as_object() {
            Some(o) => o,
            None => continue,
        };

        let path_level_params = path_obj.get("parameters").and_then(|p| p.as_array());

        for method in METHODS {
            let op = match path_obj.get(method) {
                Some(o) => o,
                None => continue,
            };

            let base_name = op
                .get("operationId")
                .and_then(|v| v.as_str())
                .map(to_snake_case)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| derive_tool_name(method, path));
            let name = unique_name(base_name, &mut seen_names);

            let description = op
                .get("summary")
                .or_else(|| op.get("description"))
                .and_then(|v| v.as_str())
                .unwrap_or(&name)
                .to_string();

            let mut operation = Operation::new(name, method, path.as_str()).with_description(description);
            if let Some(url) = &base_url {
                operation = operation.with_base_url(url.clone());
            }

            // Operation-level parameters take precedence over path-level ones.
            if let Some(params) = op.get("parameters").and_then(|p| p.as_array()) {
                for raw in params {
                    if let Some(param) = parse_parameter(&doc, raw)? {
                        operation.parameters.push(param);
                    }
                }
            }
            if let Some(params) = path_level_params {
                for raw in params {
                    if let Some(param) = parse_parameter(&doc, raw)? {
                        if operation.parameters.iter().any(|p| p.name == param.name) {
                            continue;
                        }
                        operation.parameters.push(param);
                    }
                }
            }

            if let Some(body) = op.get("requestBody") {
                for param in parse_request_body(&doc, body)? {
                    if operation.parameters.iter().any(|p| p.name == param.name) {
                        continue;
                    }
                    operation.parameters.push(param);
                }
            }

            let security = op.get("security").or(root_security);
            if let Some(scheme) = security.and_then(|s| first_scheme(s, &schemes)) {
                operation = operation.with_auth_scheme(scheme);
            }

            operations.push(operation);
        }
    }

    Ok(operations)
}

/// YAML allows non-string mapping keys (`200:` under `responses`); JSON does not.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    other => match yaml_to_json(other) {
                        Value::String(s) => s,
                        v => v.to_string(),
                    },
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Follow local `$ref`s until a concrete node is reached.
fn resolve<'a>(doc: &'a Value, node: &'a Value) -> Result<&'a Value, SpecError> {
    let mut current = node;
    for _ in 0..MAX_REF_DEPTH {
        let reference = match current.get("$ref").and_then(|r| r.as_str()) {
            Some(r) => r,
            None => return Ok(current),
        };
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| SpecError::BadReference(reference.to_string()))?;
        current = doc
            .pointer(pointer)
            .ok_or_else(|| SpecError::BadReference(reference.to_string()))?;
    }
    Err(SpecError::BadReference("reference chain too deep".to_string()))
}

fn parse_parameter(doc: &Value, raw: &Value) -> Result<Option<OperationParameter>, SpecError> {
    let param = resolve(doc, raw)?;
    let name = match param.get("name").and_then(|n| n.as_str()) {
        Some(n) => n.to_string(),
        None => return Ok(None),
    };
    let location = match param.get("in").and_then(|i| i.as_str()).unwrap_or("query") {
        "path" => ParameterLocation::Path,
        "header" => ParameterLocation::Header,
        "cookie" => ParameterLocation::Cookie,
        _ => ParameterLocation::Query,
    };
    let required = location == ParameterLocation::Path
        || param
            .get("required")
            .and_then(|r| r.as_bool())
            .unwrap_or(false);
    let schema = match param.get("schema") {
        Some(s) => inline_refs(doc, s, 0)?,
        None => serde_json::json!({"type": "string"}),
    };

    Ok(Some(OperationParameter {
        name,
        location,
        required,
        description: param
            .get("description")
            .and_then(|d| d.as_str())
            .map(String::from),
        schema,
    }))
}

fn parse_request_body(doc: &Value, raw: &Value) -> Result<Vec<OperationParameter>, SpecError> {
    let body = resolve(doc, raw)?;
    let body_required = body
        .get("required")
        .and_then(|r| r.as_bool())
        .unwrap_or(false);

    let schema = match body.pointer("/content/application~1json/schema") {
        Some(s) => inline_refs(doc, s, 0)?,
        None => return Ok(Vec::new()),
    };

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        let required_fields: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        return Ok(props
            .iter()
            .map(|(prop_name, prop_schema)| OperationParameter {
                name: prop_name.clone(),
                location: ParameterLocation::Body,
                required: required_fields.contains(&prop_name.as_str()),
                description: prop_schema
                    .get("description")
                    .and_then(|d| d.as_str())
                    .map(String::from),
                schema: prop_schema.clone(),
            })
            .collect());
    }

    Ok(vec![OperationParameter {
        name: "body".to_string(),
        location: ParameterLocation::RawBody,
        required: body_required,
        description: body
            .get("description")
            .and_then(|d| d.as_str())
            .map(String::from),
        schema,
    }])
}

/// Replace `$ref`s inside a schema with their targets.
fn inline_refs(doc: &Value, node: &Value, depth: usize) -> Result<Value, SpecError> {
    if depth > MAX_REF_DEPTH {
        return Ok(serde_json::json!({"type": "object"}));
    }
    let node = resolve(doc, node)?;
    Ok(match node {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), inline_refs(doc, v, depth + 1)?);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| inline_refs(doc, v, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        other => other.clone(),
    })
}

fn security_schemes(doc: &Value) -> HashMap<String, AuthScheme> {
    let mut schemes = HashMap::new();
    let Some(defs) = doc
        .pointer("/components/securitySchemes")
        .and_then(|s| s.as_object())
    else {
        return schemes;
    };

    for (name, def) in defs {
        let def = match resolve(doc, def) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let scheme = match def.get("type").and_then(|t| t.as_str()) {
            Some("apiKey") => {
                let location = match def.get("in").and_then(|i| i.as_str()) {
                    Some("query") => ApiKeyLocation::Query,
                    Some("cookie") => ApiKeyLocation::Cookie,
                    _ => ApiKeyLocation::Header,
                };
                let key_name = def
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("x-api-key")
                    .to_string();
                AuthScheme::ApiKey {
                    location,
                    name: key_name,
                }
            }
            Some("http") => AuthScheme::Http {
                scheme: def
                    .get("scheme")
                    .and_then(|s| s.as_str())
                    .unwrap_or("bearer")
                    .to_string(),
            },
            Some("oauth2") => AuthScheme::OAuth2,
            Some("openIdConnect") => AuthScheme::OpenIdConnect,
            _ => continue,
        };
        schemes.insert(name.clone(), scheme);
    }
    schemes
}

/// The first scheme of the first security requirement. An empty `security`
/// list means the operation explicitly needs no auth.
fn first_scheme(security: &Value, schemes: &HashMap<String, AuthScheme>) -> Option<AuthScheme> {
    security
        .as_array()?
        .iter()
        .filter_map(|req| req.as_object())
        .flat_map(|req| req.keys())
        .find_map(|name| schemes.get(name).cloned())
}

/// First of `base`, `base_2`, `base_3`, ... not already emitted.
fn unique_name(base: String, seen: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut n = 1;
    while seen.contains(&candidate) {
        n += 1;
        candidate = format!("{}_{}", base, n);
    }
    seen.insert(candidate.clone());
    candidate
}

/// `getCustomerById` → `get_customer_by_id`, `list-orders` → `list_orders`.
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out.split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Derive a tool name from an HTTP method and path.
///
/// Examples:
/// - `GET /users` → `list_users`
/// - `GET /users/{id}` → `get_user`
/// - `POST /users` → `create_users`
/// - `GET /users/{userId}/posts` → `list_user_posts`
fn derive_tool_name(method: &str, path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .collect();

    let last_raw_segment = path.split('/').filter(|s| !s.is_empty()).last();
    let ends_with_param = last_raw_segment.map_or(false, |s| s.starts_with('{'));

    let Some(last) = segments.last() else {
        return format!("{}_root", method);
    };

    let prefix = match method {
        "get" if ends_with_param => "get",
        "get" => "list",
        "post" => "create",
        "put" | "patch" => "update",
        other => other,
    };

    let resource = if ends_with_param && method == "get" {
        singularize(last)
    } else {
        last.to_string()
    };

    let name = if segments.len() > 1 {
        let parent = singularize(segments[segments.len() - 2]);
        format!("{}_{}_{}", prefix, parent, resource)
    } else {
        format!("{}_{}", prefix, resource)
    };
    to_snake_case(&name)
}

/// Naive singularization: strip trailing 's' if present.
pub(crate) fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}
