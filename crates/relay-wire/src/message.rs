//! Request, response, and status types.
//!
//! These are the typed views over frame bodies. Requests carry the fixed
//! keys `"name"`, `"version"`, and `"params"`; responses carry `"status"`
//! (a `[code, message]` pair) and `"result"`. Parsing validates structure
//! first and required fields second, with distinct error variants for each
//! failure.

use crate::errors::WireError;
use crate::frame;
use crate::value::Value;

/// Response status: a numeric code plus optional message.
///
/// The named constructors cover the codes the framework itself produces;
/// application code may use any integer (`Status::new(728)`), the named set
/// is a convenience table rather than an enum restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Numeric status code.
    pub code: u32,
    /// Optional human-readable message.
    pub message: Option<String>,
}

impl Status {
    /// Creates a status with no message.
    #[must_use]
    pub fn new(code: u32) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Creates a status with a message.
    pub fn with_message(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// 200: the request completed normally.
    #[must_use]
    pub fn success() -> Self {
        Self::new(200)
    }

    /// 400: the request could not be read or parsed.
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(400)
    }

    /// 404: no route matches the requested service.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404)
    }

    /// 408: the server gave up waiting for request data.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(408)
    }

    /// 500: an unclassified server-side failure.
    #[must_use]
    pub fn error() -> Self {
        Self::new(500)
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Self::new(code)
    }
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Name of the service being invoked.
    pub service_name: String,
    /// Version of the service being invoked.
    pub service_version: String,
    /// Free-form parameters document.
    pub params: Value,
}

impl Request {
    /// Creates a request.
    pub fn new(
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            params,
        }
    }

    /// Builds a request from a decoded frame body.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MissingField`] when `name` or `version` is
    /// absent, null, or not a string. Absent params decode as `Null`.
    pub fn from_document(body: &Value) -> Result<Self, WireError> {
        let service_name = required_string(body, "name")?;
        let service_version = required_string(body, "version")?;
        let params = body.get("params").cloned().unwrap_or(Value::Null);
        Ok(Self {
            service_name,
            service_version,
            params,
        })
    }

    /// Renders the request as a frame body document.
    #[must_use]
    pub fn to_document(&self) -> Value {
        Value::map()
            .with("name", self.service_name.as_str())
            .with("version", self.service_version.as_str())
            .with("params", self.params.clone())
    }

    /// Encodes the request into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the params document cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        frame::encode(&self.to_document())
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Outcome status.
    pub status: Status,
    /// Result document, when the handler produced one.
    pub result: Option<Value>,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(status: Status, result: Option<Value>) -> Self {
        Self { status, result }
    }

    /// Creates a 200 response wrapping a handler result.
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self::new(Status::success(), Some(result))
    }

    /// Creates a response carrying only a status.
    pub fn from_status(status: impl Into<Status>) -> Self {
        Self::new(status.into(), None)
    }

    /// Builds a response from a decoded frame body.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Malformed`] when the `status` entry is not a
    /// `[code, message]` pair.
    pub fn from_document(body: &Value) -> Result<Self, WireError> {
        let Some(Value::List(pair)) = body.get("status") else {
            return Err(WireError::malformed("response status is not a list"));
        };
        let code = pair
            .first()
            .and_then(Value::as_int)
            .and_then(|code| u32::try_from(code).ok())
            .ok_or_else(|| WireError::malformed("response status code is not an integer"))?;
        let message = match pair.get(1) {
            None | Some(Value::Null) => None,
            Some(Value::Str(text)) => Some(text.clone()),
            Some(other) => {
                return Err(WireError::malformed(format!(
                    "response status message is not a string: {other:?}"
                )));
            }
        };
        let result = match body.get("result") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        };
        Ok(Self {
            status: Status { code, message },
            result,
        })
    }

    /// Renders the response as a frame body document.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let status = Value::List(vec![
            Value::Int(i64::from(self.status.code)),
            Value::from(self.status.message.clone()),
        ]);
        Value::map()
            .with("status", status)
            .with("result", self.result.clone())
    }

    /// Encodes the response into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the result document cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        frame::encode(&self.to_document())
    }
}

fn required_string(body: &Value, field: &'static str) -> Result<String, WireError> {
    match body.get(field) {
        Some(Value::Str(text)) => Ok(text.clone()),
        _ => Err(WireError::MissingField { field }),
    }
}
