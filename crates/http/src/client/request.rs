//! Replayable description of an outbound API call
//!
//! A request may be dispatched twice (once more after a session refresh), so
//! everything needed to rebuild it is kept here instead of in a one-shot
//! `reqwest::RequestBuilder`.

use super::error::ClientError;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

/// Login endpoint
pub const LOGIN_PATH: &str = "/auth/jwt/create";
/// Session refresh endpoint
pub const REFRESH_PATH: &str = "/auth/jwt/refresh";

/// Whether `path` names one of the token endpoints
pub fn is_auth_path(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    path == LOGIN_PATH || path == REFRESH_PATH
}

/// Body of an [`OutboundRequest`]
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

/// A single API call, independent of the transport
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    auth_endpoint: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        let auth_endpoint = is_auth_path(&path);
        Self {
            method,
            path,
            query: Vec::new(),
            body: RequestBody::Empty,
            auth_endpoint,
        }
    }

    /// Attach query parameters. `params` must serialize to a flat map (or unit
    /// for none); `null` values are skipped and arrays repeat the key.
    pub fn with_query<P: Serialize + ?Sized>(mut self, params: &P) -> Result<Self, ClientError> {
        self.query = flatten_query(serde_json::to_value(params)?)?;
        Ok(self)
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Mark the request as a token endpoint call: no Authorization header and
    /// no refresh on 401
    #[must_use]
    pub const fn auth_endpoint(mut self) -> Self {
        self.auth_endpoint = true;
        self
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub const fn body(&self) -> &RequestBody {
        &self.body
    }

    pub const fn is_auth_endpoint(&self) -> bool {
        self.auth_endpoint
    }
}

fn flatten_query(value: Value) -> Result<Vec<(String, String)>, ClientError> {
    let map = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(ClientError::Configuration(format!(
                "query parameters must be a map, got {other}"
            )));
        }
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar(&key, item)?));
                }
            }
            other => pairs.push((key.clone(), scalar(&key, other)?)),
        }
    }
    Ok(pairs)
}

fn scalar(key: &str, value: Value) -> Result<String, ClientError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ClientError::Configuration(format!(
            "query parameter `{key}` must be a scalar"
        ))),
    }
}

/// A file attached to a multipart upload
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
enum FormField {
    Text(String),
    File(FilePart),
}

/// Multipart body that can be turned into a fresh `reqwest` form for every
/// dispatch
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: Vec<(String, FormField)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .push((name.into(), FormField::Text(value.into())));
        self
    }

    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.fields.push((
            name.into(),
            FormField::File(FilePart {
                file_name: file_name.into(),
                content_type,
                bytes,
            }),
        ));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form, ClientError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, field) in &self.fields {
            form = match field {
                FormField::Text(value) => form.text(name.clone(), value.clone()),
                FormField::File(file) => {
                    let mut part = reqwest::multipart::Part::bytes(file.bytes.clone())
                        .file_name(file.file_name.clone());
                    if let Some(content_type) = &file.content_type {
                        part = part.mime_str(content_type).map_err(|_| {
                            ClientError::Configuration(format!(
                                "invalid content type `{content_type}` for field `{name}`"
                            ))
                        })?;
                    }
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_endpoints_are_auth_paths() {
        assert!(is_auth_path("/auth/jwt/create"));
        assert!(is_auth_path("/auth/jwt/create/"));
        assert!(is_auth_path("/auth/jwt/refresh/"));
        assert!(!is_auth_path("/auth/users/me/"));
        assert!(!is_auth_path("/donations/"));
    }

    #[test]
    fn new_request_detects_auth_endpoint() {
        assert!(OutboundRequest::new(Method::POST, "auth/jwt/create/").is_auth_endpoint());
        let request = OutboundRequest::new(Method::GET, "news/");
        assert_eq!(request.path(), "/news/");
        assert!(!request.is_auth_endpoint());
    }

    #[test]
    fn query_flattens_scalars_and_arrays() {
        let request = OutboundRequest::new(Method::GET, "/donations/")
            .with_query(&json!({
                "page": 1,
                "page_size": 10,
                "search": "school",
                "status": ["pending", "paid"],
                "project": null,
                "recurring": false,
            }))
            .unwrap();

        let mut query = request.query().to_vec();
        query.sort();
        assert_eq!(
            query,
            vec![
                ("page".into(), "1".into()),
                ("page_size".into(), "10".into()),
                ("recurring".into(), "false".into()),
                ("search".into(), "school".into()),
                ("status".into(), "paid".into()),
                ("status".into(), "pending".into()),
            ]
        );
    }

    #[test]
    fn unit_params_mean_no_query() {
        let request = OutboundRequest::new(Method::GET, "/stats/")
            .with_query(&())
            .unwrap();
        assert!(request.query().is_empty());
    }

    #[test]
    fn nested_params_are_rejected() {
        let err = OutboundRequest::new(Method::GET, "/stats/")
            .with_query(&json!({"filter": {"year": 2024}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));

        let err = OutboundRequest::new(Method::GET, "/stats/")
            .with_query(&json!([1, 2]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn multipart_rejects_bad_content_type() {
        let form = MultipartForm::new()
            .text("title", "Opening day")
            .file("image", "cover.png", Some("not a mime".into()), vec![1, 2, 3]);
        assert_eq!(form.len(), 2);
        assert!(matches!(form.to_form(), Err(ClientError::Configuration(_))));
    }

    #[test]
    fn multipart_builds_repeatedly() {
        let form = MultipartForm::new()
            .text("title", "Opening day")
            .file("image", "cover.png", Some("image/png".into()), vec![1, 2, 3]);
        assert!(form.to_form().is_ok());
        assert!(form.to_form().is_ok());
    }
}
