//! A single invocable REST operation.
//!
//! Operations are built by the OpenAPI parser and carry everything needed to
//! issue the HTTP call: method, path template, server URL, parameter
//! locations and the declared auth scheme. A static credential is attached
//! once, at materialization time.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::{AuthCredential, AuthScheme, RequestParts};

use super::error::OperationError;

/// Where an argument goes in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// A property of the JSON request body object.
    Body,
    /// The entire JSON request body.
    RawBody,
}

/// One argument of an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationParameter {
    pub name: String,
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the value.
    #[serde(default)]
    pub schema: Value,
}

/// The model-facing view of an operation: a function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl OperationDescriptor {
    /// Property names in declaration order, required ones first.
    pub fn argument_names(&self) -> Vec<String> {
        let required: Vec<String> = self
            .parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let mut names = required.clone();
        if let Some(props) = self.parameters.get("properties").and_then(|p| p.as_object()) {
            for key in props.keys() {
                if !required.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map_or(false, |arr| arr.iter().any(|v| v.as_str() == Some(name)))
    }
}

/// A REST operation discovered from an API spec.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub description: String,
    /// Upper-case HTTP method.
    pub method: String,
    /// Path template, e.g. `/customers/{id}`.
    pub path: String,
    pub base_url: Option<String>,
    pub parameters: Vec<OperationParameter>,
    pub auth_scheme: Option<AuthScheme>,
    auth_credential: Option<AuthCredential>,
}

impl Operation {
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            method: method.into().to_uppercase(),
            path: path.into(),
            base_url: None,
            parameters: Vec::new(),
            auth_scheme: None,
            auth_credential: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_parameter(mut self, parameter: OperationParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = Some(scheme);
        self
    }

    /// Whether the spec declares an auth requirement for this operation.
    pub fn requires_auth(&self) -> bool {
        self.auth_scheme.is_some()
    }

    pub fn has_credential(&self) -> bool {
        self.auth_credential.is_some()
    }

    pub fn configure_auth_credential(&mut self, credential: AuthCredential) {
        self.auth_credential = Some(credential);
    }

    pub fn descriptor(&self) -> OperationDescriptor {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut schema = declaration_schema(&param.schema);
            if let (Some(desc), Some(obj)) = (&param.description, schema.as_object_mut()) {
                obj.entry("description")
                    .or_insert_with(|| Value::String(desc.clone()));
            }
            properties.insert(param.name.clone(), schema);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        OperationDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    /// Issue the HTTP call described by this operation.
    ///
    /// `args` is a JSON object keyed by parameter name (a JSON string holding
    /// an object is accepted too). Required arguments are checked before any
    /// network traffic.
    pub async fn invoke(
        &self,
        http: &reqwest::Client,
        args: &Value,
    ) -> Result<Value, OperationError> {
        let args = normalize_args(args)?;
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| OperationError::NoBaseUrl(self.name.clone()))?;

        let mut path = self.path.clone();
        let mut parts = RequestParts::default();
        let mut body = Map::new();
        let mut raw_body: Option<Value> = None;

        for param in &self.parameters {
            let value = match args.get(&param.name) {
                Some(v) if !v.is_null() => v,
                _ => {
                    if param.required {
                        return Err(OperationError::MissingArgument(param.name.clone()));
                    }
                    continue;
                }
            };

            match param.location {
                ParameterLocation::Path => {
                    let encoded = urlencoding::encode(&scalar_text(value)).into_owned();
                    path = path.replace(&format!("{{{}}}", param.name), &encoded);
                }
                ParameterLocation::Query => match value {
                    Value::Array(items) => {
                        for item in items {
                            parts.query.push((param.name.clone(), scalar_text(item)));
                        }
                    }
                    other => parts.query.push((param.name.clone(), scalar_text(other))),
                },
                ParameterLocation::Header => {
                    parts.headers.push((param.name.clone(), scalar_text(value)))
                }
                ParameterLocation::Cookie => {
                    parts.cookies.push((param.name.clone(), scalar_text(value)))
                }
                ParameterLocation::Body => {
                    body.insert(param.name.clone(), value.clone());
                }
                ParameterLocation::RawBody => raw_body = Some(value.clone()),
            }
        }

        if let (Some(scheme), Some(credential)) = (&self.auth_scheme, &self.auth_credential) {
            scheme.apply(credential, &mut parts);
        }

        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|_| OperationError::UnsupportedMethod(self.method.clone()))?;
        let url = format!("{}{}", base_url, path);

        tracing::debug!(operation = %self.name, method = %method, url = %url, "Invoking operation");

        let mut request = http.request(method, &url);
        if !parts.query.is_empty() {
            request = request.query(&parts.query);
        }
        for (key, value) in &parts.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(cookie) = parts.cookie_header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        if let Some(raw) = raw_body {
            request = request.json(&raw);
        } else if !body.is_empty() {
            request = request.json(&Value::Object(body));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(OperationError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn normalize_args(args: &Value) -> Result<Map<String, Value>, OperationError> {
    match args {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => serde_json::from_str::<Map<String, Value>>(s)
            .map_err(|e| OperationError::InvalidArguments(e.to_string())),
        other => Err(OperationError::InvalidArguments(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reduce an OpenAPI schema to the subset function declarations accept.
fn declaration_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return serde_json::json!({"type": "string"});
    };

    let mut out = Map::new();
    let ty = obj
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or(if obj.contains_key("properties") { "object" } else { "string" });
    out.insert("type".into(), Value::String(ty.to_string()));

    for key in ["description", "enum", "format"] {
        if let Some(v) = obj.get(key) {
            out.insert(key.into(), v.clone());
        }
    }
    if let Some(items) = obj.get("items") {
        out.insert("items".into(), declaration_schema(items));
    }
    if let Some(props) = obj.get("properties").and_then(|p| p.as_object()) {
        let nested: Map<String, Value> = props
            .iter()
            .map(|(k, v)| (k.clone(), declaration_schema(v)))
            .collect();
        out.insert("properties".into(), Value::Object(nested));
        if let Some(req) = obj.get("required") {
            out.insert("required".into(), req.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyLocation;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn param(name: &str, location: ParameterLocation, required: bool) -> OperationParameter {
        OperationParameter {
            name: name.to_string(),
            location,
            required,
            description: None,
            schema: serde_json::json!({"type": "string"}),
        }
    }

    #[test]
    fn test_descriptor_lists_required_first() {
        let op = Operation::new("list_orders", "get", "/orders")
            .with_parameter(param("limit", ParameterLocation::Query, false))
            .with_parameter(param("customer", ParameterLocation::Query, true));
        let desc = op.descriptor();
        assert_eq!(desc.argument_names(), vec!["customer", "limit"]);
        assert!(desc.is_required("customer"));
        assert!(!desc.is_required("limit"));
        assert_eq!(desc.parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_invoke_substitutes_path_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/123"))
            .and(query_param("expand", "orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "John"})))
            .expect(1)
            .mount(&server)
            .await;

        let op = Operation::new("get_customer_by_id", "GET", "/customers/{id}")
            .with_base_url(server.uri())
            .with_parameter(param("id", ParameterLocation::Path, true))
            .with_parameter(param("expand", ParameterLocation::Query, false));

        let result = op
            .invoke(
                &reqwest::Client::new(),
                &serde_json::json!({"id": 123, "expand": "orders"}),
            )
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"name": "John"}));
    }

    #[tokio::test]
    async fn test_invoke_sends_body_and_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("x-api-key", "k-1"))
            .and(body_json(serde_json::json!({"sku": "A1", "qty": 2})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"orderId": "9"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut op = Operation::new("create_order", "post", "/orders")
            .with_base_url(format!("{}/", server.uri()))
            .with_parameter(param("sku", ParameterLocation::Body, true))
            .with_parameter(param("qty", ParameterLocation::Body, false))
            .with_auth_scheme(AuthScheme::ApiKey {
                location: ApiKeyLocation::Header,
                name: "x-api-key".into(),
            });
        op.configure_auth_credential(AuthCredential::ApiKey("k-1".into()));

        let result = op
            .invoke(&reqwest::Client::new(), &serde_json::json!({"sku": "A1", "qty": 2}))
            .await
            .unwrap();
        assert_eq!(result["orderId"], "9");
    }

    #[tokio::test]
    async fn test_missing_required_argument_fails_before_network() {
        let op = Operation::new("get_customer_by_id", "GET", "/customers/{id}")
            .with_base_url("http://127.0.0.1:9")
            .with_parameter(param("id", ParameterLocation::Path, true));
        let err = op
            .invoke(&reqwest::Client::new(), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::MissingArgument(ref n) if n == "id"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such customer"))
            .mount(&server)
            .await;

        let op = Operation::new("delete_customer", "DELETE", "/customers/{id}")
            .with_base_url(server.uri())
            .with_parameter(param("id", ParameterLocation::Path, true));
        let err = op
            .invoke(&reqwest::Client::new(), &serde_json::json!("{\"id\": \"7\"}"))
            .await
            .unwrap_err();
        match err {
            OperationError::HttpStatus { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such customer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_declaration_schema_keeps_supported_keys() {
        let schema = declaration_schema(&serde_json::json!({
            "type": "array",
            "items": {"type": "integer", "minimum": 1},
            "description": "ids",
            "x-internal": true,
        }));
        assert_eq!(
            schema,
            serde_json::json!({"type": "array", "description": "ids", "items": {"type": "integer"}})
        );
    }
}
