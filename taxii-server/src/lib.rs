//! # taxii-server
//!
//! TAXII 1.0/1.1 server.
//!
//! This crate provides:
//! - HTTP front end on hyper with the `/management` endpoints
//! - Request dispatch from service address to service handler
//! - Discovery, inbox, poll and collection management handlers
//! - Basic and bearer token authentication
//! - YAML configuration, logging setup and Prometheus metrics

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod services;

pub use auth::{
    hash_secret, parse_authorization_header, parse_basic_auth_token, Account, AuthError,
    AuthManager, Credentials,
};
pub use config::{
    AccountConfig, AuthConfig, Config, ConfigError, LogFormat, LoggingConfig, MetricsConfig,
    NetworkConfig, Permission, ProtocolConfig, StorageConfig,
};
pub use dispatcher::{Dispatcher, TaxiiRequest};
pub use error::ServerError;
pub use http::HttpService;
pub use logging::init_logging;
pub use metrics::Metrics;
pub use server::{Server, ServerConfig, ServerStats};
pub use services::{HandlerContext, HandlerRegistry, ServiceHandler};
