//! Replayable request descriptors
//!
//! A request may be sent twice (original + one retry after refresh), so the
//! body is kept as data and turned into a fresh reqwest body per attempt.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Text(String),
    Multipart(Vec<MultipartField>),
}

#[derive(Debug, Clone)]
pub enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        bytes: Vec<u8>,
        mime: Option<String>,
    },
}

/// Method, headers and body of an API call
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Attach a JSON body (sent with `Content-Type: application/json`)
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| CoreError::InvalidRequest(format!("body is not serializable: {}", e)))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CoreError::InvalidRequest(format!("header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CoreError::InvalidRequest(format!("header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Copy the body onto a builder. Called once per attempt.
    pub(crate) fn apply_body(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
        })
    }
}

fn build_form(fields: &[MultipartField]) -> Result<Form> {
    let mut form = Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name.clone(), value.clone()),
            MultipartField::File {
                name,
                file_name,
                bytes,
                mime,
            } => {
                let mut part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    part = part.mime_str(mime).map_err(|e| {
                        CoreError::InvalidRequest(format!("invalid mime type {:?}: {}", mime, e))
                    })?;
                }
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}
