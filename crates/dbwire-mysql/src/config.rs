//! MySQL connection configuration.
//!
//! Provides connection parameters for establishing MySQL connections
//! including authentication, SSL, and connection options.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SSL mode for MySQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Do not use SSL
    #[default]
    Disable,
    /// Prefer SSL if available, fall back to non-SSL
    Preferred,
    /// Require SSL connection
    Required,
    /// Require SSL and verify server certificate
    VerifyCa,
    /// Require SSL and verify server certificate matches hostname
    VerifyIdentity,
}

impl SslMode {
    /// Check if SSL should be attempted.
    pub const fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Check if SSL is required.
    pub const fn is_required(self) -> bool {
        matches!(
            self,
            SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity
        )
    }
}

/// TLS-specific configuration (§6: certificates, hostname override, and the
/// `danger_skip_verify` escape hatch backing `SslMode::Preferred`'s "accept
/// any cert" behavior). Orthogonal to [`SslMode`], which governs *whether*
/// and *how strictly* TLS is negotiated; this struct governs *what
/// material* is used once it is.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to a PEM-encoded CA certificate bundle. When unset, the OS/
    /// `webpki-roots` trust store is used instead.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to a PEM-encoded client certificate, for mutual TLS.
    pub client_cert_path: Option<PathBuf>,
    /// Path to the PEM-encoded private key matching `client_cert_path`.
    pub client_key_path: Option<PathBuf>,
    /// Override the SNI/certificate hostname (defaults to the connection's
    /// configured host).
    pub server_name: Option<String>,
    /// Accept any server certificate without verification. Dangerous;
    /// intended only for connecting to servers with self-signed certs in
    /// development, matching `SslMode::Preferred`'s "accept any cert"
    /// behavior from §6.
    pub danger_skip_verify: bool,
}

impl TlsConfig {
    /// Create an empty TLS configuration (OS trust store, no client cert).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CA certificate bundle path.
    #[must_use]
    pub fn ca_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.ca_cert_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the client certificate path (mutual TLS).
    #[must_use]
    pub fn client_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.client_cert_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the client private key path (mutual TLS).
    #[must_use]
    pub fn client_key(mut self, path: impl AsRef<Path>) -> Self {
        self.client_key_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Override the SNI/certificate hostname.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Accept any server certificate without verification (dangerous).
    #[must_use]
    pub fn skip_verify(mut self, enabled: bool) -> Self {
        self.danger_skip_verify = enabled;
        self
    }
}

/// MySQL connection configuration.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 3306)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Database name to connect to (optional at connect time)
    pub database: Option<String>,
    /// Character set (default: utf8mb4)
    pub charset: u8,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// SSL mode
    pub ssl_mode: SslMode,
    /// Certificate/hostname material for the TLS handshake (§6).
    pub tls_config: TlsConfig,
    /// Fall back to a plaintext connection if `negotiate_tls` fails rather
    /// than aborting the connection attempt (§4.1).
    pub ssl_fallback_ok: bool,
    /// Enable compression (CLIENT_COMPRESS capability)
    pub compression: bool,
    /// Additional connection attributes
    pub attributes: HashMap<String, String>,
    /// Local infile handling (disabled by default for security)
    pub local_infile: bool,
    /// Max allowed packet size (default: 64MB)
    pub max_packet_size: u32,
    /// Allow the `caching_sha2_password`/`sha256_password` full-auth RSA
    /// public-key-retrieval exchange on an unencrypted connection.
    ///
    /// Disabled by default: a plaintext public-key fetch is vulnerable to a
    /// man-in-the-middle substituting its own key. Enable explicitly, or use
    /// TLS, to let the auth plugin complete full authentication.
    pub allow_public_key_retrieval: bool,
    /// Prefer server-side prepared statements (`COM_STMT_PREPARE`) over
    /// client-side literal substitution for `Connection::prepare`.
    pub use_server_prep_stmts: bool,
    /// Default fetch batch size for cursor-backed (streaming) result sets.
    pub default_fetch_size: u32,
    /// Passwords for the second and subsequent factors of a multi-factor
    /// authentication chain (§4.3 step 4), in order. `password` answers the
    /// first factor; `additional_passwords[0]` answers the second, and so on.
    pub additional_passwords: Vec<String>,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: String::new(),
            password: None,
            database: None,
            charset: crate::protocol::charset::UTF8MB4_0900_AI_CI,
            connect_timeout: Duration::from_secs(30),
            ssl_mode: SslMode::default(),
            tls_config: TlsConfig::default(),
            ssl_fallback_ok: false,
            compression: false,
            attributes: HashMap::new(),
            local_infile: false,
            max_packet_size: 64 * 1024 * 1024, // 64MB
            allow_public_key_retrieval: false,
            use_server_prep_stmts: true,
            default_fetch_size: 1000,
            additional_passwords: Vec::new(),
        }
    }
}

impl MySqlConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hostname.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Append a password for the next multi-factor-authentication factor
    /// (§4.3 step 4). Call once per additional factor, in order.
    pub fn additional_password(mut self, password: impl Into<String>) -> Self {
        self.additional_passwords.push(password.into());
        self
    }

    /// Set the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the SSL mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the TLS certificate/hostname configuration.
    pub fn tls_config(mut self, tls_config: TlsConfig) -> Self {
        self.tls_config = tls_config;
        self
    }

    /// Allow falling back to a plaintext connection if TLS negotiation fails.
    pub fn ssl_fallback_ok(mut self, enabled: bool) -> Self {
        self.ssl_fallback_ok = enabled;
        self
    }

    /// Enable or disable compression.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set a connection attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Enable or disable local infile handling.
    ///
    /// # Security Warning
    /// Enabling local infile can be a security risk. Only enable if you
    /// trust the server and understand the implications.
    pub fn local_infile(mut self, enabled: bool) -> Self {
        self.local_infile = enabled;
        self
    }

    /// Set the max allowed packet size.
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Allow plaintext RSA public-key retrieval for `caching_sha2_password`
    /// / `sha256_password` full authentication when not using TLS.
    pub fn allow_public_key_retrieval(mut self, enabled: bool) -> Self {
        self.allow_public_key_retrieval = enabled;
        self
    }

    /// Prefer server-side prepared statements over client-side substitution.
    pub fn use_server_prep_stmts(mut self, enabled: bool) -> Self {
        self.use_server_prep_stmts = enabled;
        self
    }

    /// Set the default batch size used by cursor-backed streaming result sets.
    pub fn default_fetch_size(mut self, size: u32) -> Self {
        self.default_fetch_size = size;
        self
    }

    /// Get the socket address string for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build capability flags based on configuration.
    pub fn capability_flags(&self) -> u32 {
        use crate::protocol::capabilities::{
            CLIENT_COMPRESS, CLIENT_CONNECT_ATTRS, CLIENT_CONNECT_WITH_DB, CLIENT_LOCAL_FILES,
            CLIENT_SSL, DEFAULT_CLIENT_FLAGS,
        };

        let mut flags = DEFAULT_CLIENT_FLAGS;

        if self.database.is_some() {
            flags |= CLIENT_CONNECT_WITH_DB;
        }

        if self.ssl_mode.should_try_ssl() {
            flags |= CLIENT_SSL;
        }

        if self.compression {
            flags |= CLIENT_COMPRESS;
        }

        if self.local_infile {
            flags |= CLIENT_LOCAL_FILES;
        }

        if !self.attributes.is_empty() {
            flags |= CLIENT_CONNECT_ATTRS;
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MySqlConfig::new()
            .host("db.example.com")
            .port(3307)
            .user("myuser")
            .password("secret")
            .database("testdb")
            .connect_timeout(Duration::from_secs(10))
            .ssl_mode(SslMode::Required)
            .compression(true)
            .attribute("program_name", "myapp");

        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 3307);
        assert_eq!(config.user, "myuser");
        assert_eq!(config.password, Some("secret".to_string()));
        assert_eq!(config.database, Some("testdb".to_string()));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ssl_mode, SslMode::Required);
        assert!(config.compression);
        assert_eq!(
            config.attributes.get("program_name"),
            Some(&"myapp".to_string())
        );
    }

    #[test]
    fn test_socket_addr() {
        let config = MySqlConfig::new().host("db.example.com").port(3307);
        assert_eq!(config.socket_addr(), "db.example.com:3307");
    }

    #[test]
    fn test_ssl_mode_properties() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(!SslMode::Disable.is_required());

        assert!(SslMode::Preferred.should_try_ssl());
        assert!(!SslMode::Preferred.is_required());

        assert!(SslMode::Required.should_try_ssl());
        assert!(SslMode::Required.is_required());

        assert!(SslMode::VerifyCa.should_try_ssl());
        assert!(SslMode::VerifyCa.is_required());

        assert!(SslMode::VerifyIdentity.should_try_ssl());
        assert!(SslMode::VerifyIdentity.is_required());
    }

    #[test]
    fn test_capability_flags() {
        use crate::protocol::capabilities::*;

        let config = MySqlConfig::new().database("test").compression(true);
        let flags = config.capability_flags();

        assert!(flags & CLIENT_CONNECT_WITH_DB != 0);
        assert!(flags & CLIENT_COMPRESS != 0);
        assert!(flags & CLIENT_PROTOCOL_41 != 0);
        assert!(flags & CLIENT_SECURE_CONNECTION != 0);
    }

    #[test]
    fn test_capability_flags_default_advertises_multi_factor() {
        use crate::protocol::capabilities::CLIENT_MULTI_FACTOR_AUTHENTICATION;

        let flags = MySqlConfig::new().capability_flags();
        assert!(flags & CLIENT_MULTI_FACTOR_AUTHENTICATION != 0);
    }

    #[test]
    fn test_additional_password_chain() {
        let config = MySqlConfig::new()
            .password("first")
            .additional_password("second")
            .additional_password("third");

        assert_eq!(config.password.as_deref(), Some("first"));
        assert_eq!(
            config.additional_passwords,
            vec!["second".to_string(), "third".to_string()]
        );
    }

    #[test]
    fn test_default_config() {
        let config = MySqlConfig::default();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.ssl_mode, SslMode::Disable);
        assert!(!config.compression);
        assert!(!config.local_infile);
    }
}
