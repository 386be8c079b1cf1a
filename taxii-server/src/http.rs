//! HTTP front end.
//!
//! TAXII requests are POSTed to service addresses and always answered with
//! HTTP 200 and a TAXII message. The `/management` endpoints speak JSON.

use crate::auth::AuthManager;
use crate::dispatcher::{Dispatcher, TaxiiRequest};
use crate::metrics::Metrics;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use taxii_protocol::{
    ProtocolMessage, ProtocolVersion, StatusType, HTTP_CONTENT_TYPE, VID_TAXII_HTTPS_10,
    VID_TAXII_HTTP_10,
};

pub const X_TAXII_CONTENT_TYPE: &str = "x-taxii-content-type";
pub const X_TAXII_PROTOCOL: &str = "x-taxii-protocol";
pub const X_TAXII_SERVICES: &str = "x-taxii-services";

pub const AUTH_PATH: &str = "/management/auth";
pub const HEALTH_PATH: &str = "/management/health";
pub const METRICS_PATH: &str = "/management/metrics";

const JSON_CONTENT_TYPE: &str = "application/json";
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Credentials posted to the auth endpoint.
#[derive(Debug, Default, Deserialize)]
struct TokenRequest {
    username: Option<String>,
    password: Option<String>,
}

/// Why a request body could not be collected.
enum BodyError {
    TooLarge,
    Unreadable,
}

/// Routes HTTP requests to the dispatcher and management endpoints.
pub struct HttpService {
    dispatcher: Arc<Dispatcher>,
    auth: Arc<AuthManager>,
    metrics: Option<Arc<Metrics>>,
    max_body_bytes: usize,
}

impl HttpService {
    pub fn new(dispatcher: Arc<Dispatcher>, auth: Arc<AuthManager>, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            auth,
            metrics: None,
            max_body_bytes,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handles one HTTP request.
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        tracing::debug!("{} {}", parts.method, path);

        let response = match (&parts.method, path.as_str()) {
            (&Method::GET, HEALTH_PATH) => json_response(StatusCode::OK, r#"{"alive":true}"#),
            (&Method::GET, METRICS_PATH) => self.metrics_response(),
            (&Method::POST, AUTH_PATH) => match self.read_body(body).await {
                Ok(body) => self.issue_token(&parts.headers, &body),
                Err(BodyError::TooLarge) => {
                    text_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
                }
                Err(BodyError::Unreadable) => text_response(StatusCode::BAD_REQUEST, "Bad Request"),
            },
            (&Method::POST, _) => {
                let message = match self.read_body(body).await {
                    Ok(body) => self.dispatcher.dispatch(&TaxiiRequest {
                        path: &path,
                        content_type: header_str(&parts.headers, X_TAXII_CONTENT_TYPE),
                        authorization: header_str(&parts.headers, AUTHORIZATION.as_str()),
                        body: &body,
                    }),
                    Err(e) => {
                        let reason = match e {
                            BodyError::TooLarge => {
                                format!("Request body exceeds {} bytes", self.max_body_bytes)
                            }
                            BodyError::Unreadable => "Request body could not be read".to_string(),
                        };
                        self.dispatcher.reject(
                            header_str(&parts.headers, X_TAXII_CONTENT_TYPE),
                            StatusType::BadMessage,
                            reason,
                        )
                    }
                };
                self.taxii_response(&path, &parts.headers, &message)
            }
            _ => text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        };
        Ok(response)
    }

    async fn read_body<B>(&self, body: B) -> Result<Bytes, BodyError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::warn!("Request body exceeds {} bytes", self.max_body_bytes);
                Err(BodyError::TooLarge)
            }
            Err(e) => {
                tracing::debug!("Failed to read request body: {}", e);
                Err(BodyError::Unreadable)
            }
        }
    }

    /// Renders a TAXII message with the TAXII headers. Always HTTP 200 unless
    /// the message cannot be written at all.
    fn taxii_response(
        &self,
        path: &str,
        headers: &hyper::HeaderMap,
        message: &ProtocolMessage,
    ) -> Response<Full<Bytes>> {
        let rendered = match self.dispatcher.render(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to render response for {}: {}", path, e);
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        };

        let protocol = match header_str(headers, X_TAXII_PROTOCOL) {
            Some(VID_TAXII_HTTPS_10) => VID_TAXII_HTTPS_10,
            _ => VID_TAXII_HTTP_10,
        };

        let mut response = Response::new(Full::new(Bytes::from(rendered)));
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTTP_CONTENT_TYPE));
        insert_static(headers, X_TAXII_CONTENT_TYPE, message.version.message_binding());
        insert_static(headers, X_TAXII_PROTOCOL, protocol);
        insert_static(headers, X_TAXII_SERVICES, message.version.services());
        response
    }

    fn issue_token(&self, headers: &hyper::HeaderMap, body: &[u8]) -> Response<Full<Bytes>> {
        let is_json = header_str(headers, CONTENT_TYPE.as_str())
            .map(|ct| ct.starts_with(JSON_CONTENT_TYPE))
            .unwrap_or(false);

        let request = if is_json {
            match serde_json::from_slice::<TokenRequest>(body) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!("Malformed token request: {}", e);
                    return error_response(StatusCode::BAD_REQUEST, "Malformed request body");
                }
            }
        } else {
            let mut request = TokenRequest::default();
            for (key, value) in url::form_urlencoded::parse(body) {
                match key.as_ref() {
                    "username" => request.username = Some(value.into_owned()),
                    "password" => request.password = Some(value.into_owned()),
                    _ => {}
                }
            }
            request
        };

        let (Some(username), Some(password)) = (request.username, request.password) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Both username and password are required",
            );
        };

        match self.auth.issue_token(&username, &password) {
            Ok(token) => {
                tracing::info!("Issued token for '{}'", username);
                if let Some(ref metrics) = self.metrics {
                    metrics.tokens_issued_total.inc();
                }
                let body = serde_json::json!({ "token": token }).to_string();
                json_response(StatusCode::OK, body)
            }
            Err(e) => {
                tracing::info!("Token request for '{}' rejected: {}", username, e);
                if let Some(ref metrics) = self.metrics {
                    metrics
                        .auth_failures_total
                        .with_label_values(&["invalid_credentials"])
                        .inc();
                }
                error_response(StatusCode::UNAUTHORIZED, "Invalid credentials")
            }
        }
    }

    fn metrics_response(&self) -> Response<Full<Bytes>> {
        let Some(ref metrics) = self.metrics else {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        };
        match metrics.encode() {
            Ok(body) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(METRICS_CONTENT_TYPE));
                response
            }
            Err(e) => {
                tracing::error!("Failed to encode metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

fn header_str<'a>(headers: &'a hyper::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn insert_static(headers: &mut hyper::HeaderMap, name: &'static str, value: &'static str) {
    headers.insert(
        HeaderName::from_static(name),
        HeaderValue::from_static(value),
    );
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, serde_json::json!({ "error": message }).to_string())
}

/// Version advertised by a response's headers.
pub fn response_version(response: &Response<Full<Bytes>>) -> Option<ProtocolVersion> {
    response
        .headers()
        .get(X_TAXII_CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ProtocolVersion::from_message_binding(ct).ok())
}
