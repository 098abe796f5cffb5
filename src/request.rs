//! Call descriptions and the transport-level requests built from them.

use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use url::Url;

/// The HTTP verbs a [`CallSpec`] may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Verb {
    /// Returns the matching [`http::Method`].
    pub fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Head => Method::HEAD,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }

    /// Returns `true` if requests with this verb may carry a body.
    pub fn allows_body(self) -> bool {
        matches!(self, Verb::Post | Verb::Put)
    }

    /// The upper-case verb name.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file uploaded as part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// The form field the file is attached to.
    pub field_name: String,
    /// The file name announced to the server.
    pub file_name: String,
    /// The MIME type of the file content.
    pub content_type: String,
    /// The file content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates a new attachment.
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// The immutable description of one HTTP call before execution.
///
/// Built with consuming `with_*` methods, then handed to
/// [`Caller::run`](crate::Caller::run) or
/// [`CachedCaller::get`](crate::cache::CachedCaller::get).
///
/// # Examples
///
/// ```
/// use webcaller::{Attachment, CallSpec, Verb};
///
/// let spec = CallSpec::post("https://api.example.com/upload")
///     .with_header("Authorization", "Bearer token")
///     .with_form_param("title", "holiday")
///     .with_attachment(Attachment::new("photo", "beach.jpg", "image/jpeg", vec![0xFF, 0xD8]));
///
/// assert_eq!(spec.verb(), Verb::Post);
/// assert_eq!(spec.attachments().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    verb: Verb,
    uri: String,
    headers: Vec<(String, String)>,
    form_parameters: Vec<(String, String)>,
    raw_body: Option<String>,
    attachments: Vec<Attachment>,
}

impl CallSpec {
    /// Creates a call with the given verb and URI and no headers or body.
    pub fn new(verb: Verb, uri: impl Into<String>) -> Self {
        Self {
            verb,
            uri: uri.into(),
            headers: Vec::new(),
            form_parameters: Vec::new(),
            raw_body: None,
            attachments: Vec::new(),
        }
    }

    /// Shorthand for `CallSpec::new(Verb::Get, uri)`.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Verb::Get, uri)
    }

    /// Shorthand for `CallSpec::new(Verb::Head, uri)`.
    pub fn head(uri: impl Into<String>) -> Self {
        Self::new(Verb::Head, uri)
    }

    /// Shorthand for `CallSpec::new(Verb::Post, uri)`.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Verb::Post, uri)
    }

    /// Shorthand for `CallSpec::new(Verb::Put, uri)`.
    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Verb::Put, uri)
    }

    /// Shorthand for `CallSpec::new(Verb::Delete, uri)`.
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Verb::Delete, uri)
    }

    /// Adds a header. The same name may be added several times.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a form parameter.
    pub fn with_form_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_parameters.push((key.into(), value.into()));
        self
    }

    /// Adds several form parameters.
    pub fn with_form_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.form_parameters.extend(params);
        self
    }

    /// Sets the raw string body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.raw_body = Some(body.into());
        self
    }

    /// Adds a file attachment.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// The HTTP verb.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The URI, absolute or relative to the caller's base URL.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The form parameters in insertion order.
    pub fn form_parameters(&self) -> &[(String, String)] {
        &self.form_parameters
    }

    /// The raw string body, if any.
    pub fn raw_body(&self) -> Option<&str> {
        self.raw_body.as_deref()
    }

    /// The file attachments in insertion order.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    fn has_form(&self) -> bool {
        !self.form_parameters.is_empty() || !self.attachments.is_empty()
    }

    /// Computes the body actually sent for this call.
    ///
    /// GET, HEAD and DELETE never send a body. POST and PUT send either the raw
    /// body or the form, never both.
    pub fn effective_body(&self) -> Result<RequestBody> {
        if !self.verb.allows_body() {
            if self.raw_body.is_some() || self.has_form() {
                tracing::debug!(
                    method = %self.verb,
                    uri = %self.uri,
                    "Ignoring body fields on a verb without body semantics"
                );
            }
            return Ok(RequestBody::Empty);
        }

        match (&self.raw_body, self.has_form()) {
            (Some(_), true) => Err(Error::Configuration(format!(
                "{} {} carries both a raw body and form data",
                self.verb, self.uri
            ))),
            (Some(body), false) => Ok(RequestBody::Text(body.clone())),
            (None, true) if self.attachments.is_empty() => {
                Ok(RequestBody::Form(self.form_parameters.clone()))
            }
            (None, true) => Ok(RequestBody::Multipart {
                fields: self.form_parameters.clone(),
                attachments: self.attachments.clone(),
            }),
            (None, false) => Ok(RequestBody::Empty),
        }
    }
}

/// The body of a built [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// A raw string body, sent as is.
    Text(String),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with text fields and file parts.
    Multipart {
        /// Text fields.
        fields: Vec<(String, String)>,
        /// File parts.
        attachments: Vec<Attachment>,
    },
}

impl RequestBody {
    /// Returns `true` for [`RequestBody::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// A transport-level request, built once per call and resent unchanged on retries.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute request URL.
    pub url: Url,
    /// Request headers; names may repeat.
    pub headers: HeaderMap,
    /// The request body.
    pub body: RequestBody,
}

impl HttpRequest {
    /// Builds the transport request for `spec`.
    ///
    /// `default_headers` are applied first, followed by the call's own headers.
    pub fn build(spec: &CallSpec, url: Url, default_headers: &HeaderMap) -> Result<Self> {
        let mut headers = default_headers.clone();
        for (name, value) in spec.headers() {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
            headers.append(name, value);
        }

        Ok(Self {
            method: spec.verb().method(),
            url,
            headers,
            body: spec.effective_body()?,
        })
    }

    /// Renders the request as an equivalent `curl` command line.
    ///
    /// Text and form bodies longer than `body_limit` bytes are left out.
    pub fn to_curl(&self, body_limit: usize) -> String {
        let mut command = format!("curl --request {} \"{}\"", self.method, self.url);
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).replace('"', "\\\"");
            command.push_str(&format!(" --header \"{}: {}\"", name, value));
        }

        let data = match &self.body {
            RequestBody::Text(text) => Some(text.clone()),
            RequestBody::Form(fields) => Some(
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields)
                    .finish(),
            ),
            RequestBody::Multipart { .. } | RequestBody::Empty => None,
        };
        if let Some(data) = data.filter(|data| data.len() <= body_limit) {
            command.push_str(&format!(" --data \"{}\"", data.replace('"', "\\\"")));
        }

        command
    }
}
