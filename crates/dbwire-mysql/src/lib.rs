//! MySQL driver for dbwire.
//!
//! This crate implements the MySQL wire protocol from scratch using
//! asupersync's TCP primitives. It provides:
//!
//! - Packet framing with sequence numbers
//! - Authentication (mysql_native_password, caching_sha2_password)
//! - Text and binary query protocols
//! - Prepared statement support
//! - Connection management with state machine
//! - Type conversion between Rust and MySQL types
//!
//! # MySQL Protocol Overview
//!
//! MySQL uses a packet-based protocol with:
//! - 3-byte payload length + 1-byte sequence number header
//! - Packets over 16MB are split
//! - Request/response pairing via sequence numbers
//!
//! # Example
//!
//! ```rust,ignore
//! use asupersync::Cx;
//! use dbwire_mysql::{MySqlConfig, SharedMySqlConnection};
//!
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("mydb");
//!
//! let conn = SharedMySqlConnection::connect(&cx, config).await?;
//! ```

pub mod async_connection;
pub mod auth;
pub mod callable;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod result_set;
pub mod telemetry;
pub mod tls;
pub mod types;

pub use async_connection::{MySqlAsyncConnection, SharedMySqlConnection};
pub use callable::{CallableParam, CallableStatement, ParamMode};
pub use config::{MySqlConfig, SslMode, TlsConfig};
pub use connection::{ConnectionState, ServerCapabilities};
pub use result_set::{MaterializedResultSet, StreamingResultSet};
