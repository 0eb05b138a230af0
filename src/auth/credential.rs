//! Per-operation credentials and the auth schemes that place them.

use serde::{Deserialize, Serialize};

/// A static credential attached to an operation at materialization time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_type", content = "value", rename_all = "snake_case")]
pub enum AuthCredential {
    ApiKey(String),
}

impl AuthCredential {
    pub fn secret(&self) -> &str {
        match self {
            Self::ApiKey(key) => key,
        }
    }
}

impl std::fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

/// Where an `apiKey` security scheme expects the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// An OpenAPI security scheme declared by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    ApiKey { location: ApiKeyLocation, name: String },
    Http { scheme: String },
    OAuth2,
    OpenIdConnect,
}

/// Query, header and cookie pairs collected before a request is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl RequestParts {
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl AuthScheme {
    /// Place `credential` into `parts` the way this scheme requires.
    pub fn apply(&self, credential: &AuthCredential, parts: &mut RequestParts) {
        let secret = credential.secret().to_string();
        match self {
            Self::ApiKey { location, name } => match location {
                ApiKeyLocation::Header => parts.headers.push((name.clone(), secret)),
                ApiKeyLocation::Query => parts.query.push((name.clone(), secret)),
                ApiKeyLocation::Cookie => parts.cookies.push((name.clone(), secret)),
            },
            Self::Http { scheme } => {
                let prefix = if scheme.eq_ignore_ascii_case("basic") {
                    "Basic"
                } else {
                    "Bearer"
                };
                parts
                    .headers
                    .push(("Authorization".to_string(), format!("{} {}", prefix, secret)));
            }
            Self::OAuth2 | Self::OpenIdConnect => {
                parts
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {}", secret)));
            }
        }
    }
}
