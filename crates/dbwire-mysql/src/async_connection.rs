//! Async MySQL connection implementation.
//!
//! This module implements the async MySQL connection using asupersync's TCP primitives.
//! It provides the `Connection` trait implementation for integration with dbwire-core.

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Read as StdRead, Write as StdWrite};
use std::net::TcpStream as StdTcpStream;
use std::sync::Arc;

use asupersync::io::{AsyncRead, AsyncWrite, ReadBuf};
use asupersync::net::TcpStream;
use asupersync::sync::Mutex;
use asupersync::{Cx, Outcome};

use dbwire_core::connection::{Connection, IsolationLevel, PreparedStatement, TransactionOps};
use dbwire_core::error::{
    ConnectionError, ConnectionErrorKind, ProtocolError, QueryError, QueryErrorKind,
};
use dbwire_core::{Error, Row, Value};

use crate::auth;
use crate::config::MySqlConfig;
use crate::connection::{ConnectionState, ServerCapabilities};
use crate::protocol::{
    Command, ErrPacket, PacketHeader, PacketReader, PacketType, PacketWriter, capabilities,
    charset, packet_count_for_len, prepared, server_status, MAX_PACKET_SIZE,
};
use crate::telemetry::{self, ConnectionAttrs};
use crate::types::{ColumnDef, FieldType, decode_binary_value_with_len, decode_text_value, interpolate_params};

/// Async MySQL connection.
///
/// This connection uses asupersync's TCP stream for non-blocking I/O
/// and implements the `Connection` trait from dbwire-core.
pub struct MySqlAsyncConnection {
    /// TCP stream (either sync for compatibility or async wrapper)
    stream: ConnectionStream,
    /// Current connection state
    state: ConnectionState,
    /// Server capabilities from handshake
    server_caps: Option<ServerCapabilities>,
    /// Connection ID
    connection_id: u32,
    /// Server status flags
    status_flags: u16,
    /// Affected rows from last statement
    affected_rows: u64,
    /// Last insert ID
    last_insert_id: u64,
    /// Number of warnings
    warnings: u16,
    /// Connection configuration
    config: MySqlConfig,
    /// Current sequence ID for packet framing
    sequence_id: u8,
    /// Prepared statement metadata (keyed by statement ID)
    prepared_stmts: HashMap<u32, PreparedStmtMeta>,
    /// Whether the transport has been upgraded to TLS.
    ///
    /// Gates whether plaintext RSA public-key retrieval is permitted during
    /// `caching_sha2_password`/`sha256_password` full authentication.
    tls_active: bool,
    /// Index into the configured password chain (`config.password`, then
    /// `config.additional_passwords[..]`) currently being used to answer an
    /// authentication factor. Advances on each `AuthNextFactor` packet (§4.3
    /// step 4, gated by `CLIENT_MULTI_FACTOR_AUTHENTICATION`).
    auth_factor: usize,
}

/// Metadata for a prepared statement.
///
/// Stores the MySQL-specific information needed to execute
/// and decode results from a prepared statement.
#[derive(Debug, Clone)]
struct PreparedStmtMeta {
    /// Server-assigned statement ID (stored for potential future use in close/reset)
    #[allow(dead_code)]
    statement_id: u32,
    /// Parameter column definitions (for type encoding)
    params: Vec<ColumnDef>,
    /// Result column definitions (for binary decoding)
    columns: Vec<ColumnDef>,
}

/// Connection stream wrapper for sync/async/TLS compatibility.
#[allow(dead_code)]
enum ConnectionStream {
    /// Standard sync TCP stream (for initial connection)
    Sync(StdTcpStream),
    /// Async TCP stream (for async operations)
    Async(TcpStream),
    /// Async stream upgraded to TLS after a successful `negotiate_tls`.
    #[cfg(feature = "tls")]
    Tls(crate::tls::AsyncTlsStream),
    /// Transient placeholder used only while swapping `Async` for `Tls`.
    #[cfg(feature = "tls")]
    Closed,
}

impl std::fmt::Debug for MySqlAsyncConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAsyncConnection")
            .field("state", &self.state)
            .field("connection_id", &self.connection_id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl MySqlAsyncConnection {
    /// Establish a new async connection to the MySQL server.
    ///
    /// This performs the complete connection handshake asynchronously:
    /// 1. TCP connection
    /// 2. Receive server handshake
    /// 3. Send handshake response with authentication
    /// 4. Handle auth result (possibly auth switch)
    pub async fn connect(_cx: &Cx, config: MySqlConfig) -> Outcome<Self, Error> {
        // Use async TCP connect
        let addr = config.socket_addr();
        let socket_addr = match addr.parse() {
            Ok(a) => a,
            Err(e) => {
                return Outcome::Err(Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Connect,
                    message: format!("Invalid socket address: {}", e),
                    source: None,
                }));
            }
        };
        let stream = match TcpStream::connect_timeout(socket_addr, config.connect_timeout).await {
            Ok(s) => s,
            Err(e) => {
                let kind = if e.kind() == io::ErrorKind::ConnectionRefused {
                    ConnectionErrorKind::Refused
                } else {
                    ConnectionErrorKind::Connect
                };
                return Outcome::Err(Error::Connection(ConnectionError {
                    kind,
                    message: format!("Failed to connect to {}: {}", addr, e),
                    source: Some(Box::new(e)),
                }));
            }
        };

        // Set TCP options
        stream.set_nodelay(true).ok();

        let mut conn = Self {
            stream: ConnectionStream::Async(stream),
            state: ConnectionState::Connecting,
            server_caps: None,
            connection_id: 0,
            status_flags: 0,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            config,
            sequence_id: 0,
            prepared_stmts: HashMap::new(),
            tls_active: false,
            auth_factor: 0,
        };

        // 2. Receive server handshake
        match conn.read_handshake_async().await {
            Outcome::Ok(server_caps) => {
                conn.connection_id = server_caps.connection_id;
                conn.server_caps = Some(server_caps);
                conn.state = ConnectionState::Authenticating;
            }
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        // 2b. Upgrade to TLS if the negotiated SSL mode calls for it
        if let Outcome::Err(e) = conn.negotiate_tls().await {
            return Outcome::Err(e);
        }

        // 3. Send handshake response
        if let Outcome::Err(e) = conn.send_handshake_response_async().await {
            return Outcome::Err(e);
        }

        // 4. Handle authentication result
        if let Outcome::Err(e) = conn.handle_auth_result_async().await {
            return Outcome::Err(e);
        }

        conn.state = ConnectionState::Ready;
        Outcome::Ok(conn)
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is ready for queries.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ConnectionState::Ready)
    }

    /// Get the connection ID.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Get the server version.
    pub fn server_version(&self) -> Option<&str> {
        self.server_caps
            .as_ref()
            .map(|caps| caps.server_version.as_str())
    }

    /// Get the number of affected rows from the last statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Get the last insert ID.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    /// Snapshot the connection-level attributes used to annotate every
    /// query span (§6 telemetry): server address/port, current schema,
    /// MySQL thread id, and the negotiated auth plugin.
    fn telemetry_attrs(&self) -> ConnectionAttrs {
        ConnectionAttrs {
            server_address: self.config.host.clone(),
            server_port: self.config.port,
            db_namespace: self.config.database.clone(),
            mysql_thread_id: self.connection_id,
            mysql_auth_plugin: self.server_caps.as_ref().map(|c| c.auth_plugin.clone()),
        }
    }

    // === Async I/O methods ===

    /// Read exactly `buf.len()` bytes from whichever transport is currently
    /// active, dispatching to the plaintext async socket, the sync
    /// compatibility path, or (with the `tls` feature) the upgraded TLS
    /// stream set up by `negotiate_tls`.
    async fn stream_read_exact(&mut self, buf: &mut [u8]) -> Outcome<(), Error> {
        match &mut self.stream {
            ConnectionStream::Async(stream) => {
                let mut read = 0;
                while read < buf.len() {
                    let mut read_buf = ReadBuf::new(&mut buf[read..]);
                    match std::future::poll_fn(|cx| {
                        std::pin::Pin::new(&mut *stream).poll_read(cx, &mut read_buf)
                    })
                    .await
                    {
                        Ok(()) => {
                            let n = read_buf.filled().len();
                            if n == 0 {
                                return Outcome::Err(Error::Connection(ConnectionError {
                                    kind: ConnectionErrorKind::Disconnected,
                                    message: "Connection closed while reading".to_string(),
                                    source: None,
                                }));
                            }
                            read += n;
                        }
                        Err(e) => {
                            return Outcome::Err(Error::Connection(ConnectionError {
                                kind: ConnectionErrorKind::Disconnected,
                                message: format!("Failed to read from stream: {}", e),
                                source: Some(Box::new(e)),
                            }));
                        }
                    }
                }
            }
            ConnectionStream::Sync(stream) => {
                if let Err(e) = stream.read_exact(buf) {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to read from stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
            }
            #[cfg(feature = "tls")]
            ConnectionStream::Tls(stream) => {
                if let Err(e) = stream.read_exact(buf).await {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to read from TLS stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
            }
            #[cfg(feature = "tls")]
            ConnectionStream::Closed => {
                return Outcome::Err(Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Disconnected,
                    message: "Connection closed".to_string(),
                    source: None,
                }));
            }
        }
        Outcome::Ok(())
    }

    /// Write `buf` in full to whichever transport is currently active, then
    /// flush it. See [`Self::stream_read_exact`] for the dispatch rationale.
    async fn stream_write_all(&mut self, buf: &[u8]) -> Outcome<(), Error> {
        match &mut self.stream {
            ConnectionStream::Async(stream) => {
                let mut written = 0;
                while written < buf.len() {
                    match std::future::poll_fn(|cx| {
                        std::pin::Pin::new(&mut *stream).poll_write(cx, &buf[written..])
                    })
                    .await
                    {
                        Ok(n) => {
                            if n == 0 {
                                return Outcome::Err(Error::Connection(ConnectionError {
                                    kind: ConnectionErrorKind::Disconnected,
                                    message: "Connection closed while writing".to_string(),
                                    source: None,
                                }));
                            }
                            written += n;
                        }
                        Err(e) => {
                            return Outcome::Err(Error::Connection(ConnectionError {
                                kind: ConnectionErrorKind::Disconnected,
                                message: format!("Failed to write to stream: {}", e),
                                source: Some(Box::new(e)),
                            }));
                        }
                    }
                }
                if let Err(e) =
                    std::future::poll_fn(|cx| std::pin::Pin::new(&mut *stream).poll_flush(cx))
                        .await
                {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to flush stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
            }
            ConnectionStream::Sync(stream) => {
                if let Err(e) = stream.write_all(buf) {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to write to stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
                if let Err(e) = stream.flush() {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to flush stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
            }
            #[cfg(feature = "tls")]
            ConnectionStream::Tls(stream) => {
                if let Err(e) = stream.write_all(buf).await {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to write to TLS stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
                if let Err(e) = stream.flush().await {
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to flush TLS stream: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
            }
            #[cfg(feature = "tls")]
            ConnectionStream::Closed => {
                return Outcome::Err(Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Disconnected,
                    message: "Connection closed".to_string(),
                    source: None,
                }));
            }
        }
        Outcome::Ok(())
    }

    /// Read a complete packet from the stream asynchronously.
    async fn read_packet_async(&mut self) -> Outcome<(Vec<u8>, u8), Error> {
        // Read header (4 bytes) - must loop since TCP can fragment reads
        let mut header_buf = [0u8; 4];
        if let Outcome::Err(e) = self.stream_read_exact(&mut header_buf).await {
            return Outcome::Err(e);
        }

        let header = PacketHeader::from_bytes(&header_buf);
        let payload_len = header.payload_length as usize;
        self.sequence_id = header.sequence_id.wrapping_add(1);

        // Read payload
        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            if let Outcome::Err(e) = self.stream_read_exact(&mut payload).await {
                return Outcome::Err(e);
            }
        }

        // Handle multi-packet payloads
        if payload_len == MAX_PACKET_SIZE {
            loop {
                let mut header_buf = [0u8; 4];
                if let Outcome::Err(e) = self.stream_read_exact(&mut header_buf).await {
                    return Outcome::Err(e);
                }

                let cont_header = PacketHeader::from_bytes(&header_buf);
                let cont_len = cont_header.payload_length as usize;
                self.sequence_id = cont_header.sequence_id.wrapping_add(1);

                if cont_len > 0 {
                    let mut cont_payload = vec![0u8; cont_len];
                    if let Outcome::Err(e) = self.stream_read_exact(&mut cont_payload).await {
                        return Outcome::Err(e);
                    }
                    payload.extend_from_slice(&cont_payload);
                }

                if cont_len < MAX_PACKET_SIZE {
                    break;
                }
            }
        }

        Outcome::Ok((payload, header.sequence_id))
    }

    /// Write a packet to the stream asynchronously.
    ///
    /// Rejects payloads over the negotiated `max_allowed_packet` before
    /// touching the socket (§8 S6: `PacketTooBig` must be raised "before any
    /// socket write"), and advances the shared sequence-id cell by however
    /// many wire frames the payload actually splits into — a payload at or
    /// above `MAX_PACKET_SIZE` emits more than one frame, and each one
    /// consumes a sequence id (§4.1, §8 property 4).
    async fn write_packet_async(&mut self, payload: &[u8]) -> Outcome<(), Error> {
        let max = self.config.max_packet_size as usize;
        if payload.len() > max {
            return Outcome::Err(Error::PacketTooBig {
                len: payload.len(),
                max,
            });
        }

        let writer = PacketWriter::new();
        let packet = writer.build_packet_from_payload(payload, self.sequence_id);
        let frames = packet_count_for_len(payload.len());
        self.sequence_id = self.sequence_id.wrapping_add((frames & 0xFF) as u8);
        self.stream_write_all(&packet).await
    }

    // === Handshake methods ===

    /// Upgrade the raw socket to TLS when the negotiated SSL mode and the
    /// server's advertised capabilities call for it (§4.1).
    ///
    /// Must run after the initial server handshake has been read (so the
    /// server's `CLIENT_SSL` bit and auth-plugin data are known) and before
    /// [`Self::send_handshake_response_async`] sends the real handshake
    /// response — MySQL's SSL upgrade works by the client sending a short,
    /// plaintext "SSL request" packet (the same capability/charset prefix
    /// the full response would carry, with no username/auth data) and then
    /// immediately starting a TLS handshake on the same socket; the real
    /// handshake response only ever travels encrypted.
    ///
    /// `ssl_fallback_ok` only covers failures that happen before anything is
    /// written to the wire (an unusable local TLS config); once the SSL
    /// request packet has been sent the server is committed to expecting a
    /// TLS `ClientHello` next, so a handshake failure past that point always
    /// aborts the connection attempt.
    async fn negotiate_tls(&mut self) -> Outcome<(), Error> {
        let server_caps = match self.server_caps.as_ref() {
            Some(c) => c.capabilities,
            None => return Outcome::Err(protocol_error("No server handshake received")),
        };

        let should_use_tls = match crate::tls::validate_ssl_mode(self.config.ssl_mode, server_caps)
        {
            Ok(v) => v,
            Err(e) => {
                if self.config.ssl_fallback_ok {
                    false
                } else {
                    return Outcome::Err(e);
                }
            }
        };
        if !should_use_tls {
            return Outcome::Ok(());
        }

        if let Err(e) =
            crate::tls::validate_tls_config(self.config.ssl_mode, &self.config.tls_config)
        {
            return if self.config.ssl_fallback_ok {
                Outcome::Ok(())
            } else {
                Outcome::Err(e)
            };
        }

        let client_caps = self.config.capability_flags() & server_caps;
        let ssl_request = crate::tls::build_ssl_request_packet(
            client_caps,
            self.config.max_packet_size,
            self.config.charset,
            self.sequence_id,
        );
        self.sequence_id = self.sequence_id.wrapping_add(1);

        if let Outcome::Err(e) = self.write_packet_raw_async(&ssl_request).await {
            return Outcome::Err(e);
        }

        tracing::debug!(
            "db.system.name" = "mysql",
            ssl_mode = ?self.config.ssl_mode,
            "upgrading connection to TLS"
        );

        #[cfg(feature = "tls")]
        {
            let plain = match std::mem::replace(&mut self.stream, ConnectionStream::Closed) {
                ConnectionStream::Async(stream) => stream,
                other => {
                    self.stream = other;
                    return Outcome::Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Ssl,
                        message: "TLS upgrade requires a freshly connected async stream"
                            .to_string(),
                        source: None,
                    }));
                }
            };

            match crate::tls::AsyncTlsStream::handshake(
                plain,
                &self.config.tls_config,
                &self.config.host,
                self.config.ssl_mode,
            )
            .await
            {
                Ok(tls_stream) => {
                    self.stream = ConnectionStream::Tls(tls_stream);
                    self.tls_active = true;
                    Outcome::Ok(())
                }
                Err(e) => Outcome::Err(e),
            }
        }

        #[cfg(not(feature = "tls"))]
        {
            Outcome::Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Ssl,
                message: "TLS requested but 'dbwire-mysql' was built without feature 'tls'"
                    .to_string(),
                source: None,
            }))
        }
    }

    /// Read the server handshake packet asynchronously.
    async fn read_handshake_async(&mut self) -> Outcome<ServerCapabilities, Error> {
        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut reader = PacketReader::new(&payload);

        // Protocol version
        let protocol_version = match reader.read_u8() {
            Some(v) => v,
            None => return Outcome::Err(protocol_error("Missing protocol version")),
        };

        if protocol_version != 10 {
            return Outcome::Err(protocol_error(format!(
                "Unsupported protocol version: {}",
                protocol_version
            )));
        }

        // Server version (null-terminated string)
        let server_version = match reader.read_null_string() {
            Some(v) => v,
            None => return Outcome::Err(protocol_error("Missing server version")),
        };

        // Connection ID
        let connection_id = match reader.read_u32_le() {
            Some(v) => v,
            None => return Outcome::Err(protocol_error("Missing connection ID")),
        };

        // Auth plugin data part 1 (8 bytes)
        let auth_data_1 = match reader.read_bytes(8) {
            Some(v) => v,
            None => return Outcome::Err(protocol_error("Missing auth data")),
        };

        // Filler (1 byte)
        reader.skip(1);

        // Capability flags (lower 2 bytes)
        let caps_lower = match reader.read_u16_le() {
            Some(v) => v,
            None => return Outcome::Err(protocol_error("Missing capability flags")),
        };

        // Character set
        let charset_val = reader.read_u8().unwrap_or(charset::UTF8MB4_0900_AI_CI);

        // Status flags
        let status_flags = reader.read_u16_le().unwrap_or(0);

        // Capability flags (upper 2 bytes)
        let caps_upper = reader.read_u16_le().unwrap_or(0);
        let capabilities_val = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        // Length of auth-plugin-data (if CLIENT_PLUGIN_AUTH)
        let auth_data_len = if capabilities_val & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_u8().unwrap_or(0) as usize
        } else {
            0
        };

        // Reserved (10 bytes)
        reader.skip(10);

        // Auth plugin data part 2 (if CLIENT_SECURE_CONNECTION)
        let mut auth_data = auth_data_1.to_vec();
        if capabilities_val & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len2 = if auth_data_len > 8 {
                auth_data_len - 8
            } else {
                13 // Default length
            };
            if let Some(data2) = reader.read_bytes(len2) {
                // Remove trailing NUL if present
                let data2_clean = if data2.last() == Some(&0) {
                    &data2[..data2.len() - 1]
                } else {
                    data2
                };
                auth_data.extend_from_slice(data2_clean);
            }
        }

        // Auth plugin name (if CLIENT_PLUGIN_AUTH)
        let auth_plugin = if capabilities_val & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_null_string().unwrap_or_default()
        } else {
            auth::plugins::MYSQL_NATIVE_PASSWORD.to_string()
        };

        Outcome::Ok(ServerCapabilities {
            capabilities: capabilities_val,
            protocol_version,
            server_version,
            connection_id,
            auth_plugin,
            auth_data,
            charset: charset_val,
            status_flags,
        })
    }

    /// Send the handshake response packet asynchronously.
    async fn send_handshake_response_async(&mut self) -> Outcome<(), Error> {
        let server_caps = match self.server_caps.as_ref() {
            Some(c) => c,
            None => return Outcome::Err(protocol_error("No server handshake received")),
        };

        // Determine client capabilities
        let client_caps = self.config.capability_flags() & server_caps.capabilities;

        // Build authentication response
        let auth_response =
            self.compute_auth_response(&server_caps.auth_plugin, &server_caps.auth_data);

        let mut writer = PacketWriter::new();

        // Client capability flags (4 bytes)
        writer.write_u32_le(client_caps);

        // Max packet size (4 bytes)
        writer.write_u32_le(self.config.max_packet_size);

        // Character set (1 byte)
        writer.write_u8(self.config.charset);

        // Reserved (23 bytes of zeros)
        writer.write_zeros(23);

        // Username (null-terminated)
        writer.write_null_string(&self.config.user);

        // Auth response
        if client_caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            writer.write_lenenc_bytes(&auth_response);
        } else if client_caps & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            #[allow(clippy::cast_possible_truncation)]
            writer.write_u8(auth_response.len() as u8);
            writer.write_bytes(&auth_response);
        } else {
            writer.write_bytes(&auth_response);
            writer.write_u8(0); // Null terminator
        }

        // Database (if CLIENT_CONNECT_WITH_DB)
        if client_caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            if let Some(ref db) = self.config.database {
                writer.write_null_string(db);
            } else {
                writer.write_u8(0); // Empty string
            }
        }

        // Auth plugin name (if CLIENT_PLUGIN_AUTH)
        if client_caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            writer.write_null_string(&server_caps.auth_plugin);
        }

        // Connection attributes (if CLIENT_CONNECT_ATTRS)
        if client_caps & capabilities::CLIENT_CONNECT_ATTRS != 0
            && !self.config.attributes.is_empty()
        {
            let mut attrs_writer = PacketWriter::new();
            for (key, value) in &self.config.attributes {
                attrs_writer.write_lenenc_string(key);
                attrs_writer.write_lenenc_string(value);
            }
            let attrs_data = attrs_writer.into_bytes();
            writer.write_lenenc_bytes(&attrs_data);
        }

        self.write_packet_async(writer.as_bytes()).await
    }

    /// Compute authentication response based on the plugin.
    /// Password for the current authentication factor: `auth_factor == 0` is
    /// the primary `config.password`; factor `i >= 1` pulls
    /// `config.additional_passwords[i - 1]` for MFA chains (§4.3 step 4).
    fn password_for_current_factor(&self) -> &str {
        select_factor_password(
            self.config.password.as_deref(),
            &self.config.additional_passwords,
            self.auth_factor,
        )
    }

    fn compute_auth_response(&self, plugin: &str, auth_data: &[u8]) -> Vec<u8> {
        let password = self.password_for_current_factor();

        match plugin {
            auth::plugins::MYSQL_NATIVE_PASSWORD => {
                auth::mysql_native_password(password, auth_data)
            }
            auth::plugins::CACHING_SHA2_PASSWORD => {
                auth::caching_sha2_password(password, auth_data)
            }
            auth::plugins::MYSQL_CLEAR_PASSWORD => {
                let mut result = password.as_bytes().to_vec();
                result.push(0);
                result
            }
            _ => auth::mysql_native_password(password, auth_data),
        }
    }

    /// Handle authentication result asynchronously.
    /// Uses a loop to handle auth switches without recursion.
    async fn handle_auth_result_async(&mut self) -> Outcome<(), Error> {
        // Loop to handle potential auth switches without recursion
        loop {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            if payload.is_empty() {
                return Outcome::Err(protocol_error("Empty authentication response"));
            }

            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Ok => {
                    let mut reader = PacketReader::new(&payload);
                    if let Some(ok) = reader.parse_ok_packet() {
                        self.status_flags = ok.status_flags;
                        self.affected_rows = ok.affected_rows;
                    }
                    return Outcome::Ok(());
                }
                PacketType::Error => {
                    let mut reader = PacketReader::new(&payload);
                    let err = match reader.parse_err_packet() {
                        Some(e) => e,
                        None => return Outcome::Err(protocol_error("Invalid error packet")),
                    };
                    return Outcome::Err(auth_error(format!(
                        "Authentication failed: {} ({})",
                        err.error_message, err.error_code
                    )));
                }
                PacketType::Eof => {
                    // Auth switch request - handle inline to avoid recursion
                    let data = &payload[1..];
                    let mut reader = PacketReader::new(data);

                    let plugin = match reader.read_null_string() {
                        Some(p) => p,
                        None => {
                            return Outcome::Err(protocol_error(
                                "Missing plugin name in auth switch",
                            ))
                        }
                    };

                    let auth_data = reader.read_rest();
                    let response = self.compute_auth_response(&plugin, auth_data);

                    if let Outcome::Err(e) = self.write_packet_async(&response).await {
                        return Outcome::Err(e);
                    }
                    // Continue loop to read next auth result
                }
                PacketType::Data if payload[0] == 0x02 && payload.len() > 1 => {
                    // AuthNextFactor: same wire shape as AuthSwitchRequest, but
                    // signals a further multi-factor-authentication round using
                    // the next configured password (§4.3 step 4).
                    let data = &payload[1..];
                    let mut reader = PacketReader::new(data);

                    let plugin = match reader.read_null_string() {
                        Some(p) => p,
                        None => {
                            return Outcome::Err(protocol_error(
                                "Missing plugin name in AuthNextFactor packet",
                            ))
                        }
                    };

                    self.auth_factor += 1;
                    let auth_data = reader.read_rest();
                    let response = self.compute_auth_response(&plugin, auth_data);

                    if let Outcome::Err(e) = self.write_packet_async(&response).await {
                        return Outcome::Err(e);
                    }
                    // Continue loop to read next factor's result
                }
                _ => {
                    // Handle additional auth data
                    return self.handle_additional_auth_async(&payload).await;
                }
            }
        }
    }

    /// Handle additional auth data asynchronously.
    async fn handle_additional_auth_async(&mut self, data: &[u8]) -> Outcome<(), Error> {
        if data.is_empty() {
            return Outcome::Err(protocol_error("Empty additional auth data"));
        }

        match data[0] {
            auth::caching_sha2::FAST_AUTH_SUCCESS => {
                let (payload, _) = match self.read_packet_async().await {
                    Outcome::Ok(p) => p,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                let mut reader = PacketReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.status_flags = ok.status_flags;
                }
                Outcome::Ok(())
            }
            auth::caching_sha2::PERFORM_FULL_AUTH => {
                let use_oaep = self
                    .server_caps
                    .as_ref()
                    .map(|c| c.auth_plugin == auth::plugins::CACHING_SHA2_PASSWORD)
                    .unwrap_or(true);
                self.perform_full_auth_rsa(use_oaep).await
            }
            _ => {
                let mut reader = PacketReader::new(data);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.status_flags = ok.status_flags;
                    Outcome::Ok(())
                } else {
                    Outcome::Err(protocol_error(format!(
                        "Unknown auth response: {:02X}",
                        data[0]
                    )))
                }
            }
        }
    }

    /// Complete `caching_sha2_password`/`sha256_password` full authentication.
    ///
    /// Over TLS the channel is already encrypted, so the password is sent as
    /// cleartext + NUL (§4.3 step 3: "if TLS, send cleartext password +
    /// NUL"). Otherwise this requests the server's RSA public key and sends
    /// the password encrypted under it, refusing to do so unless the caller
    /// opted in via `allow_public_key_retrieval` — a MITM could otherwise
    /// swap in its own key and recover the password.
    async fn perform_full_auth_rsa(&mut self, use_oaep: bool) -> Outcome<(), Error> {
        if self.tls_active {
            let mut cleartext = self.password_for_current_factor().as_bytes().to_vec();
            cleartext.push(0);

            if let Outcome::Err(e) = self.write_packet_async(&cleartext).await {
                return Outcome::Err(e);
            }

            return self.read_full_auth_result_async().await;
        }

        if !self.config.allow_public_key_retrieval {
            return Outcome::Err(auth_error(
                "public key retrieval is disabled: enable allow_public_key_retrieval or use TLS \
                 to complete caching_sha2_password/sha256_password full authentication",
            ));
        }

        let seed = self
            .server_caps
            .as_ref()
            .map(|c| c.auth_data.clone())
            .unwrap_or_default();

        if let Outcome::Err(e) = self
            .write_packet_async(&[auth::caching_sha2::REQUEST_PUBLIC_KEY])
            .await
        {
            return Outcome::Err(e);
        }

        let (pem_payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let password = self.password_for_current_factor().to_string();
        let encrypted = match auth::sha256_password_rsa(&password, &seed, &pem_payload, use_oaep)
        {
            Ok(bytes) => bytes,
            Err(msg) => return Outcome::Err(auth_error(format!("RSA password encryption failed: {msg}"))),
        };

        if let Outcome::Err(e) = self.write_packet_async(&encrypted).await {
            return Outcome::Err(e);
        }

        self.read_full_auth_result_async().await
    }

    /// Reads the terminal OK/ERR packet that follows either branch of
    /// [`Self::perform_full_auth_rsa`].
    async fn read_full_auth_result_async(&mut self) -> Outcome<(), Error> {
        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if payload.is_empty() {
            return Outcome::Err(protocol_error("empty response after full authentication"));
        }

        match PacketType::from_first_byte(payload[0], payload.len() as u32) {
            PacketType::Ok => {
                let mut reader = PacketReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.status_flags = ok.status_flags;
                }
                Outcome::Ok(())
            }
            PacketType::Error => {
                let mut reader = PacketReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(err) => Outcome::Err(auth_error(format!(
                        "Authentication failed: {} ({})",
                        err.error_message, err.error_code
                    ))),
                    None => Outcome::Err(protocol_error("invalid error packet after full auth")),
                }
            }
            _ => Outcome::Err(protocol_error("unexpected response after full authentication")),
        }
    }

    /// Whether the session's `sql_mode` currently includes
    /// `NO_BACKSLASH_ESCAPES` (§4.5.2), tracked live off
    /// `SERVER_STATUS_NO_BACKSLASH_ESCAPES` in the last OK/EOF packet.
    fn no_backslash_escapes(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_NO_BACKSLASH_ESCAPES != 0
    }

    /// Execute a text protocol query asynchronously.
    pub async fn query_async(
        &mut self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        if !params.is_empty() {
            if let Err(msg) = crate::types::validate_param_count(sql, params) {
                return Outcome::Err(query_error_msg(msg));
            }
        }
        let sql = match interpolate_params(sql, params, self.no_backslash_escapes()) {
            Ok(sql) => sql,
            Err(msg) => return Outcome::Err(query_error_msg(msg)),
        };
        if !self.is_ready() && self.state != ConnectionState::InTransaction {
            return Outcome::Err(connection_error("Connection not ready for queries"));
        }

        let telemetry_attrs = self.telemetry_attrs();
        tracing::debug!(
            "db.system.name" = "mysql",
            "db.namespace" = telemetry_attrs.db_namespace.as_deref().unwrap_or(""),
            "db.operation.name" = %telemetry::operation_name(&sql),
            "db.query.summary" = %telemetry::summarize(&sql),
            "db.query.text" = %telemetry::sanitize_query_text(&sql),
            "server.address" = %telemetry_attrs.server_address,
            "server.port" = telemetry_attrs.server_port,
            "db.mysql.thread_id" = telemetry_attrs.mysql_thread_id,
            "dispatching COM_QUERY"
        );

        self.state = ConnectionState::InQuery;
        self.sequence_id = 0;

        // Send COM_QUERY
        let mut writer = PacketWriter::new();
        writer.write_u8(Command::Query as u8);
        writer.write_bytes(sql.as_bytes());

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        // Read response
        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if payload.is_empty() {
            self.state = ConnectionState::Ready;
            return Outcome::Err(protocol_error("Empty query response"));
        }

        match PacketType::from_first_byte(payload[0], payload.len() as u32) {
            PacketType::Ok => {
                let mut reader = PacketReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.affected_rows = ok.affected_rows;
                    self.last_insert_id = ok.last_insert_id;
                    self.status_flags = ok.status_flags;
                    self.warnings = ok.warnings;
                }
                self.state = if self.status_flags
                    & crate::protocol::server_status::SERVER_STATUS_IN_TRANS
                    != 0
                {
                    ConnectionState::InTransaction
                } else {
                    ConnectionState::Ready
                };
                Outcome::Ok(vec![])
            }
            PacketType::Error => {
                self.state = ConnectionState::Ready;
                let mut reader = PacketReader::new(&payload);
                let err = match reader.parse_err_packet() {
                    Some(e) => e,
                    None => return Outcome::Err(protocol_error("Invalid error packet")),
                };
                tracing::debug!("error.type" = "ServerError", code = err.error_code, "COM_QUERY failed");
                Outcome::Err(query_error_with_context(&err, Some(&sql), params))
            }
            PacketType::LocalInfile => self.handle_local_infile_async(&payload).await,
            _ => self.read_result_set_async(&payload, Some(&sql), params).await,
        }
    }

    /// Handle a `LOCAL INFILE` request from the server (§4.4).
    ///
    /// If `local_infile` is disabled in the config, replies with an empty
    /// packet so the server reports the attempt as an error without hanging
    /// the protocol state machine; otherwise reads the named file and streams
    /// its contents as one or more data packets followed by an empty
    /// terminator packet, per the `COM_QUERY` local-infile sub-protocol.
    async fn handle_local_infile_async(&mut self, payload: &[u8]) -> Outcome<Vec<Row>, Error> {
        let filename = String::from_utf8_lossy(&payload[1..]).into_owned();

        if !self.config.local_infile {
            if let Outcome::Err(e) = self.write_packet_async(&[]).await {
                return Outcome::Err(e);
            }
        } else {
            match std::fs::read(&filename) {
                Ok(contents) => {
                    for chunk in contents.chunks(MAX_PACKET_SIZE.saturating_sub(1).max(1)) {
                        if let Outcome::Err(e) = self.write_packet_async(chunk).await {
                            return Outcome::Err(e);
                        }
                    }
                    if let Outcome::Err(e) = self.write_packet_async(&[]).await {
                        return Outcome::Err(e);
                    }
                }
                Err(_) => {
                    // File unreadable: send the empty terminator and let the
                    // server surface the resulting error packet.
                    if let Outcome::Err(e) = self.write_packet_async(&[]).await {
                        return Outcome::Err(e);
                    }
                }
            }
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        self.state = ConnectionState::Ready;
        match PacketType::from_first_byte(payload.first().copied().unwrap_or(0), payload.len() as u32) {
            PacketType::Ok => {
                let mut reader = PacketReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.affected_rows = ok.affected_rows;
                    self.last_insert_id = ok.last_insert_id;
                    self.status_flags = ok.status_flags;
                    self.warnings = ok.warnings;
                }
                Outcome::Ok(vec![])
            }
            PacketType::Error => {
                let mut reader = PacketReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(e) => Outcome::Err(query_error(&e)),
                    None => Outcome::Err(protocol_error("Invalid error packet")),
                }
            }
            _ => Outcome::Err(protocol_error("Unexpected packet after LOCAL INFILE")),
        }
    }

    /// Read a result set asynchronously, looping over any additional result
    /// sets the server announces via `SERVER_MORE_RESULTS_EXISTS` (e.g. a
    /// `CALL` returning several selects). Only the final result set's rows
    /// are returned; earlier ones are drained so the sequence-id bookkeeping
    /// stays in sync, matching the single-result-set shape of `Vec<Row>`
    /// `query_async` exposes elsewhere (multi-result fan-out is the caller's
    /// concern via repeated `query_async` calls for statements that need it).
    async fn read_result_set_async(
        &mut self,
        first_packet: &[u8],
        sql: Option<&str>,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        let mut rows = match self.read_one_result_set_async(first_packet, sql, params).await {
            Outcome::Ok(r) => r,
            other => return other,
        };

        while self.status_flags & crate::protocol::server_status::SERVER_MORE_RESULTS_EXISTS != 0 {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if payload.is_empty() {
                break;
            }
            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Ok => {
                    let mut reader = PacketReader::new(&payload);
                    if let Some(ok) = reader.parse_ok_packet() {
                        self.affected_rows = ok.affected_rows;
                        self.last_insert_id = ok.last_insert_id;
                        self.status_flags = ok.status_flags;
                        self.warnings = ok.warnings;
                    } else {
                        break;
                    }
                }
                PacketType::Error => {
                    let mut reader = PacketReader::new(&payload);
                    let err = match reader.parse_err_packet() {
                        Some(e) => e,
                        None => return Outcome::Err(protocol_error("Invalid error packet")),
                    };
                    self.state = ConnectionState::Ready;
                    return Outcome::Err(query_error_with_context(&err, sql, params));
                }
                _ => {
                    rows = match self.read_one_result_set_async(&payload, sql, params).await {
                        Outcome::Ok(r) => r,
                        other => return other,
                    };
                }
            }
        }

        self.state =
            if self.status_flags & crate::protocol::server_status::SERVER_STATUS_IN_TRANS != 0 {
                ConnectionState::InTransaction
            } else {
                ConnectionState::Ready
            };

        Outcome::Ok(rows)
    }

    /// Read a single result set (column defs + rows) without following
    /// `SERVER_MORE_RESULTS_EXISTS`; used both standalone and as the inner
    /// step of `read_result_set_async`'s multi-result loop.
    async fn read_one_result_set_async(
        &mut self,
        first_packet: &[u8],
        sql: Option<&str>,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        let mut reader = PacketReader::new(first_packet);
        let column_count = match reader.read_lenenc_int() {
            Some(c) => c as usize,
            None => return Outcome::Err(protocol_error("Invalid column count")),
        };

        // Read column definitions
        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            match self.parse_column_def(&payload) {
                Ok(col) => columns.push(col),
                Err(e) => return Outcome::Err(e),
            }
        }

        // Check for EOF packet
        let server_caps = self.server_caps.as_ref().map_or(0, |c| c.capabilities);
        if server_caps & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if payload.first() == Some(&0xFE) {
                // EOF packet - continue to rows
            }
        }

        // Read rows until EOF or OK
        let mut rows = Vec::new();
        loop {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            if payload.is_empty() {
                break;
            }

            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Eof | PacketType::Ok => {
                    let mut reader = PacketReader::new(&payload);
                    if payload[0] == 0x00 {
                        if let Some(ok) = reader.parse_ok_packet() {
                            self.status_flags = ok.status_flags;
                            self.warnings = ok.warnings;
                        }
                    } else if payload[0] == 0xFE {
                        if let Some(eof) = reader.parse_eof_packet() {
                            self.status_flags = eof.status_flags;
                            self.warnings = eof.warnings;
                        }
                    }
                    break;
                }
                PacketType::Error => {
                    let mut reader = PacketReader::new(&payload);
                    let err = match reader.parse_err_packet() {
                        Some(e) => e,
                        None => return Outcome::Err(protocol_error("Invalid error packet")),
                    };
                    self.state = ConnectionState::Ready;
                    return Outcome::Err(query_error_with_context(&err, sql, params));
                }
                _ => {
                    let row = self.parse_text_row(&payload, &columns);
                    rows.push(row);
                }
            }
        }

        Outcome::Ok(rows)
    }

    /// Parse a column definition packet.
    fn parse_column_def(&self, data: &[u8]) -> Result<ColumnDef, Error> {
        let mut reader = PacketReader::new(data);

        let catalog = reader
            .read_lenenc_string()
            .ok_or_else(|| protocol_error("Missing catalog"))?;
        let schema = reader
            .read_lenenc_string()
            .ok_or_else(|| protocol_error("Missing schema"))?;
        let table = reader
            .read_lenenc_string()
            .ok_or_else(|| protocol_error("Missing table"))?;
        let org_table = reader
            .read_lenenc_string()
            .ok_or_else(|| protocol_error("Missing org_table"))?;
        let name = reader
            .read_lenenc_string()
            .ok_or_else(|| protocol_error("Missing name"))?;
        let org_name = reader
            .read_lenenc_string()
            .ok_or_else(|| protocol_error("Missing org_name"))?;

        let _fixed_len = reader.read_lenenc_int();

        let charset_val = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing charset"))?;
        let column_length = reader
            .read_u32_le()
            .ok_or_else(|| protocol_error("Missing column_length"))?;
        let column_type = FieldType::from_u8(
            reader
                .read_u8()
                .ok_or_else(|| protocol_error("Missing column_type"))?,
        );
        let flags = reader
            .read_u16_le()
            .ok_or_else(|| protocol_error("Missing flags"))?;
        let decimals = reader
            .read_u8()
            .ok_or_else(|| protocol_error("Missing decimals"))?;

        Ok(ColumnDef {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset: charset_val,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }

    /// Parse a text protocol row.
    fn parse_text_row(&self, data: &[u8], columns: &[ColumnDef]) -> Row {
        let mut reader = PacketReader::new(data);
        let mut values = Vec::with_capacity(columns.len());

        for col in columns {
            if reader.peek() == Some(0xFB) {
                reader.skip(1);
                values.push(Value::Null);
            } else if let Some(data) = reader.read_lenenc_bytes() {
                let is_unsigned = col.is_unsigned();
                let value = decode_text_value(col.column_type, &data, is_unsigned);
                values.push(value);
            } else {
                values.push(Value::Null);
            }
        }

        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        Row::new(column_names, values)
    }

    /// Execute a statement asynchronously and return affected rows.
    ///
    /// This is similar to `query_async` but returns the number of affected rows
    /// instead of the result set. Useful for INSERT, UPDATE, DELETE statements.
    pub async fn execute_async(
        &mut self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> Outcome<u64, Error> {
        // Execute the query
        match self.query_async(cx, sql, params).await {
            Outcome::Ok(_) => Outcome::Ok(self.affected_rows),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(c) => Outcome::Cancelled(c),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Prepare a statement for later execution using the binary protocol.
    ///
    /// This sends COM_STMT_PREPARE to the server and stores the metadata
    /// needed for later execution via `query_prepared_async` or `execute_prepared_async`.
    pub async fn prepare_async(
        &mut self,
        _cx: &Cx,
        sql: &str,
    ) -> Outcome<PreparedStatement, Error> {
        if !self.is_ready() && self.state != ConnectionState::InTransaction {
            return Outcome::Err(connection_error("Connection not ready for prepare"));
        }

        self.sequence_id = 0;

        // Send COM_STMT_PREPARE
        let packet = prepared::build_stmt_prepare_packet(sql, self.sequence_id);
        if let Outcome::Err(e) = self.write_packet_raw_async(&packet).await {
            return Outcome::Err(e);
        }

        // Read response
        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        // Check for error
        if payload.first() == Some(&0xFF) {
            let mut reader = PacketReader::new(&payload);
            let err = match reader.parse_err_packet() {
                Some(e) => e,
                None => return Outcome::Err(protocol_error("Invalid error packet")),
            };
            return Outcome::Err(query_error(&err));
        }

        // Parse COM_STMT_PREPARE_OK
        let prep_ok = match prepared::parse_stmt_prepare_ok(&payload) {
            Some(ok) => ok,
            None => return Outcome::Err(protocol_error("Invalid prepare OK response")),
        };

        // Read parameter column definitions
        let mut param_defs = Vec::with_capacity(prep_ok.num_params as usize);
        for _ in 0..prep_ok.num_params {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            match self.parse_column_def(&payload) {
                Ok(col) => param_defs.push(col),
                Err(e) => return Outcome::Err(e),
            }
        }

        // Read EOF after params (if not CLIENT_DEPRECATE_EOF)
        let server_caps = self.server_caps.as_ref().map_or(0, |c| c.capabilities);
        if prep_ok.num_params > 0 && server_caps & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if payload.first() != Some(&0xFE) {
                return Outcome::Err(protocol_error("Expected EOF after param definitions"));
            }
        }

        // Read column definitions
        let mut column_defs = Vec::with_capacity(prep_ok.num_columns as usize);
        for _ in 0..prep_ok.num_columns {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            match self.parse_column_def(&payload) {
                Ok(col) => column_defs.push(col),
                Err(e) => return Outcome::Err(e),
            }
        }

        // Read EOF after columns (if not CLIENT_DEPRECATE_EOF)
        if prep_ok.num_columns > 0 && server_caps & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if payload.first() != Some(&0xFE) {
                return Outcome::Err(protocol_error("Expected EOF after column definitions"));
            }
        }

        // Store metadata
        let meta = PreparedStmtMeta {
            statement_id: prep_ok.statement_id,
            params: param_defs,
            columns: column_defs.clone(),
        };
        self.prepared_stmts.insert(prep_ok.statement_id, meta);

        // Return core PreparedStatement
        let column_names: Vec<String> = column_defs.iter().map(|c| c.name.clone()).collect();
        Outcome::Ok(PreparedStatement::with_columns(
            u64::from(prep_ok.statement_id),
            sql.to_string(),
            prep_ok.num_params as usize,
            column_names,
        ))
    }

    /// Execute a prepared statement and return result rows (binary protocol).
    pub async fn query_prepared_async(
        &mut self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Outcome<Vec<Row>, Error> {
        let stmt_id = stmt.id() as u32;

        // Look up metadata
        let meta = match self.prepared_stmts.get(&stmt_id) {
            Some(m) => m.clone(),
            None => return Outcome::Err(connection_error("Unknown prepared statement")),
        };

        // Verify param count
        if params.len() != meta.params.len() {
            return Outcome::Err(connection_error(format!(
                "Expected {} parameters, got {}",
                meta.params.len(),
                params.len()
            )));
        }

        if !self.is_ready() && self.state != ConnectionState::InTransaction {
            return Outcome::Err(connection_error("Connection not ready for query"));
        }

        self.state = ConnectionState::InQuery;
        self.sequence_id = 0;

        // Build and send COM_STMT_EXECUTE
        let param_types: Vec<FieldType> = meta.params.iter().map(|c| c.column_type).collect();
        let packet = prepared::build_stmt_execute_packet(
            stmt_id,
            params,
            Some(&param_types),
            self.sequence_id,
        );
        if let Outcome::Err(e) = self.write_packet_raw_async(&packet).await {
            return Outcome::Err(e);
        }

        // Read response
        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if payload.is_empty() {
            self.state = ConnectionState::Ready;
            return Outcome::Err(protocol_error("Empty execute response"));
        }

        match PacketType::from_first_byte(payload[0], payload.len() as u32) {
            PacketType::Ok => {
                // Non-SELECT statement - parse OK packet
                let mut reader = PacketReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.affected_rows = ok.affected_rows;
                    self.last_insert_id = ok.last_insert_id;
                    self.status_flags = ok.status_flags;
                    self.warnings = ok.warnings;
                }
                self.state = ConnectionState::Ready;
                Outcome::Ok(vec![])
            }
            PacketType::Error => {
                self.state = ConnectionState::Ready;
                let mut reader = PacketReader::new(&payload);
                let err = match reader.parse_err_packet() {
                    Some(e) => e,
                    None => return Outcome::Err(protocol_error("Invalid error packet")),
                };
                Outcome::Err(query_error_with_context(&err, Some(stmt.sql()), params))
            }
            _ => {
                // Result set - read binary protocol rows
                self.read_binary_result_set_async(&payload, &meta.columns).await
            }
        }
    }

    /// Execute a prepared statement and return affected row count.
    pub async fn execute_prepared_async(
        &mut self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Outcome<u64, Error> {
        match self.query_prepared_async(cx, stmt, params).await {
            Outcome::Ok(_) => Outcome::Ok(self.affected_rows),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(c) => Outcome::Cancelled(c),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Execute a prepared statement with a read-only server-side cursor open,
    /// for use with `fetch_async`/`COM_STMT_FETCH` instead of materializing
    /// the whole result set up front.
    ///
    /// Returns the result-set column definitions; no rows are sent until the
    /// first `fetch_async` call.
    pub async fn execute_cursor_async(
        &mut self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Outcome<Vec<ColumnDef>, Error> {
        let stmt_id = stmt.id() as u32;

        let meta = match self.prepared_stmts.get(&stmt_id) {
            Some(m) => m.clone(),
            None => return Outcome::Err(connection_error("Unknown prepared statement")),
        };

        if params.len() != meta.params.len() {
            return Outcome::Err(connection_error(format!(
                "Expected {} parameters, got {}",
                meta.params.len(),
                params.len()
            )));
        }

        if !self.is_ready() && self.state != ConnectionState::InTransaction {
            return Outcome::Err(connection_error("Connection not ready for query"));
        }

        self.state = ConnectionState::InQuery;
        self.sequence_id = 0;

        let param_types: Vec<FieldType> = meta.params.iter().map(|c| c.column_type).collect();
        let packet = prepared::build_stmt_execute_packet_with_cursor(
            stmt_id,
            params,
            Some(&param_types),
            prepared::CURSOR_TYPE_READ_ONLY,
            self.sequence_id,
        );
        if let Outcome::Err(e) = self.write_packet_raw_async(&packet).await {
            return Outcome::Err(e);
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if payload.is_empty() {
            self.state = ConnectionState::Ready;
            return Outcome::Err(protocol_error("Empty execute response"));
        }

        match PacketType::from_first_byte(payload[0], payload.len() as u32) {
            PacketType::Ok => {
                let mut reader = PacketReader::new(&payload);
                if let Some(ok) = reader.parse_ok_packet() {
                    self.affected_rows = ok.affected_rows;
                    self.status_flags = ok.status_flags;
                }
                self.state = ConnectionState::Ready;
                Outcome::Ok(Vec::new())
            }
            PacketType::Error => {
                self.state = ConnectionState::Ready;
                let mut reader = PacketReader::new(&payload);
                let err = match reader.parse_err_packet() {
                    Some(e) => e,
                    None => return Outcome::Err(protocol_error("Invalid error packet")),
                };
                Outcome::Err(query_error(&err))
            }
            _ => {
                let mut reader = PacketReader::new(&payload);
                let column_count = match reader.read_lenenc_int() {
                    Some(c) => c as usize,
                    None => return Outcome::Err(protocol_error("Invalid column count")),
                };

                let mut result_columns = Vec::with_capacity(column_count);
                for _ in 0..column_count {
                    let (payload, _) = match self.read_packet_async().await {
                        Outcome::Ok(p) => p,
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    };
                    match self.parse_column_def(&payload) {
                        Ok(col) => result_columns.push(col),
                        Err(e) => return Outcome::Err(e),
                    }
                }

                let server_caps = self.server_caps.as_ref().map_or(0, |c| c.capabilities);
                if server_caps & capabilities::CLIENT_DEPRECATE_EOF == 0 {
                    if let Outcome::Err(e) = self.read_packet_async().await {
                        return Outcome::Err(e);
                    }
                }

                // Cursor is open but idle; caller must fetch rows explicitly.
                Outcome::Ok(result_columns)
            }
        }
    }

    /// Fetch the next batch of up to `fetch_size` rows from a cursor opened
    /// by `execute_cursor_async`.
    ///
    /// Returns the rows in this batch and whether the cursor is now
    /// exhausted (`SERVER_STATUS_LAST_ROW_SENT` set, or the cursor status
    /// bit cleared because the result set was fully drained).
    pub async fn fetch_async(
        &mut self,
        _cx: &Cx,
        stmt: &PreparedStatement,
        columns: &[ColumnDef],
        fetch_size: u32,
    ) -> Outcome<(Vec<Row>, bool), Error> {
        use crate::protocol::server_status;

        let stmt_id = stmt.id() as u32;
        self.sequence_id = 0;
        let packet = prepared::build_stmt_fetch_packet(stmt_id, fetch_size, self.sequence_id);
        if let Outcome::Err(e) = self.write_packet_raw_async(&packet).await {
            return Outcome::Err(e);
        }

        let mut rows = Vec::new();
        let mut exhausted = false;
        loop {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            if payload.is_empty() {
                exhausted = true;
                break;
            }

            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Eof | PacketType::Ok => {
                    let mut reader = PacketReader::new(&payload);
                    let flags = if payload[0] == 0x00 {
                        reader.parse_ok_packet().map(|ok| ok.status_flags)
                    } else {
                        reader.parse_eof_packet().map(|eof| eof.status_flags)
                    };
                    match flags {
                        Some(flags) => {
                            self.status_flags = flags;
                            exhausted = flags & server_status::SERVER_STATUS_LAST_ROW_SENT != 0
                                || flags & server_status::SERVER_STATUS_CURSOR_EXISTS == 0;
                        }
                        None => exhausted = true,
                    }
                    break;
                }
                PacketType::Error => {
                    let mut reader = PacketReader::new(&payload);
                    let err = match reader.parse_err_packet() {
                        Some(e) => e,
                        None => return Outcome::Err(protocol_error("Invalid error packet")),
                    };
                    return Outcome::Err(query_error(&err));
                }
                _ => {
                    rows.push(self.parse_binary_row(&payload, columns));
                }
            }
        }

        if exhausted {
            self.state = ConnectionState::Ready;
        }

        Outcome::Ok((rows, exhausted))
    }

    /// Close a prepared statement.
    pub async fn close_prepared_async(&mut self, stmt: &PreparedStatement) {
        let stmt_id = stmt.id() as u32;
        self.prepared_stmts.remove(&stmt_id);

        self.sequence_id = 0;
        let packet = prepared::build_stmt_close_packet(stmt_id, self.sequence_id);
        // Best effort - no response expected
        let _ = self.write_packet_raw_async(&packet).await;
    }

    /// Read a binary protocol result set.
    async fn read_binary_result_set_async(
        &mut self,
        first_packet: &[u8],
        columns: &[ColumnDef],
    ) -> Outcome<Vec<Row>, Error> {
        // First packet contains column count
        let mut reader = PacketReader::new(first_packet);
        let column_count = match reader.read_lenenc_int() {
            Some(c) => c as usize,
            None => return Outcome::Err(protocol_error("Invalid column count")),
        };

        // The column definitions were already provided from prepare
        // But server sends them again in binary result set - we need to read them
        let mut result_columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            match self.parse_column_def(&payload) {
                Ok(col) => result_columns.push(col),
                Err(e) => return Outcome::Err(e),
            }
        }

        // Use the columns from the result set if available, otherwise use prepared metadata
        let cols = if result_columns.len() == columns.len() {
            &result_columns
        } else {
            columns
        };

        // Check for EOF packet
        let server_caps = self.server_caps.as_ref().map_or(0, |c| c.capabilities);
        if server_caps & capabilities::CLIENT_DEPRECATE_EOF == 0 {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if payload.first() == Some(&0xFE) {
                // EOF packet - continue to rows
            }
        }

        // Read binary rows until EOF or OK
        let mut rows = Vec::new();
        loop {
            let (payload, _) = match self.read_packet_async().await {
                Outcome::Ok(p) => p,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };

            if payload.is_empty() {
                break;
            }

            match PacketType::from_first_byte(payload[0], payload.len() as u32) {
                PacketType::Eof | PacketType::Ok => {
                    let mut reader = PacketReader::new(&payload);
                    if payload[0] == 0x00 {
                        if let Some(ok) = reader.parse_ok_packet() {
                            self.status_flags = ok.status_flags;
                            self.warnings = ok.warnings;
                        }
                    } else if payload[0] == 0xFE {
                        if let Some(eof) = reader.parse_eof_packet() {
                            self.status_flags = eof.status_flags;
                            self.warnings = eof.warnings;
                        }
                    }
                    break;
                }
                PacketType::Error => {
                    let mut reader = PacketReader::new(&payload);
                    let err = match reader.parse_err_packet() {
                        Some(e) => e,
                        None => return Outcome::Err(protocol_error("Invalid error packet")),
                    };
                    self.state = ConnectionState::Ready;
                    return Outcome::Err(query_error(&err));
                }
                _ => {
                    let row = self.parse_binary_row(&payload, cols);
                    rows.push(row);
                }
            }
        }

        self.state = if self.status_flags
            & crate::protocol::server_status::SERVER_STATUS_IN_TRANS
            != 0
        {
            ConnectionState::InTransaction
        } else {
            ConnectionState::Ready
        };

        Outcome::Ok(rows)
    }

    /// Parse a binary protocol row.
    fn parse_binary_row(&self, data: &[u8], columns: &[ColumnDef]) -> Row {
        // Binary row format:
        // - 0x00 header (1 byte)
        // - NULL bitmap ((column_count + 7 + 2) / 8 bytes)
        // - Column values (only non-NULL)

        let mut values = Vec::with_capacity(columns.len());
        let mut column_names = Vec::with_capacity(columns.len());

        if data.is_empty() {
            return Row::new(column_names, values);
        }

        // Skip header byte (0x00)
        let mut pos = 1;

        // NULL bitmap: (column_count + 7 + 2) / 8 bytes
        // The +2 offset is for the reserved bits at the beginning
        let null_bitmap_len = (columns.len() + 7 + 2) / 8;
        if pos + null_bitmap_len > data.len() {
            return Row::new(column_names, values);
        }
        let null_bitmap = &data[pos..pos + null_bitmap_len];
        pos += null_bitmap_len;

        // Parse column values
        for (i, col) in columns.iter().enumerate() {
            column_names.push(col.name.clone());

            // Check NULL bitmap (bit position is i + 2 due to offset)
            let bit_pos = i + 2;
            let is_null = (null_bitmap[bit_pos / 8] & (1 << (bit_pos % 8))) != 0;

            if is_null {
                values.push(Value::Null);
            } else {
                let is_unsigned = col.flags & 0x20 != 0; // UNSIGNED_FLAG
                let (value, consumed) =
                    decode_binary_value_with_len(&data[pos..], col.column_type, is_unsigned);
                values.push(value);
                pos += consumed;
            }
        }

        Row::new(column_names, values)
    }

    /// Write a pre-built packet (with header already included).
    async fn write_packet_raw_async(&mut self, packet: &[u8]) -> Outcome<(), Error> {
        self.stream_write_all(packet).await
    }

    /// Look up `IN`/`OUT`/`INOUT` parameter directions for a stored procedure
    /// from `INFORMATION_SCHEMA.PARAMETERS` (§4.5.4), in ordinal order.
    ///
    /// Returns an empty vector (not an error) if the server reports no
    /// parameter rows — e.g. the caller lacks privilege on
    /// `INFORMATION_SCHEMA`, or the procedure has no declared parameters —
    /// so callers can fall back to treating every argument as `IN`.
    pub async fn lookup_procedure_param_modes(
        &mut self,
        cx: &Cx,
        procedure: &str,
    ) -> Outcome<Vec<crate::callable::ParamMode>, Error> {
        let sql = crate::callable::parameter_modes_query(procedure);
        let rows = match self.query_async(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let modes = rows
            .iter()
            .filter_map(|row| row.get(0).and_then(Value::as_str))
            .filter_map(crate::callable::ParamMode::from_information_schema)
            .collect();
        Outcome::Ok(modes)
    }

    /// Invoke a stored procedure (§4.5.4), splicing `OUT`/`INOUT` arguments
    /// back from the session-variable fetch described in
    /// [`crate::callable::CallableStatement`].
    ///
    /// `args` supplies one [`Value`] per declared parameter, in order; the
    /// caller is not expected to know parameter directions ahead of time —
    /// they're resolved from `INFORMATION_SCHEMA.PARAMETERS` automatically,
    /// falling back to treating every argument as `IN` if the lookup
    /// returns nothing.
    ///
    /// Returns the procedure's own result set rows alongside a vector the
    /// same length as `args`, with `OUT`/`INOUT` slots replaced by the
    /// post-call value of their bound session variable.
    pub async fn call_procedure_async(
        &mut self,
        cx: &Cx,
        procedure: &str,
        args: Vec<Value>,
    ) -> Outcome<(Vec<Row>, Vec<Value>), Error> {
        let modes = match self.lookup_procedure_param_modes(cx, procedure).await {
            Outcome::Ok(m) => m,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let params: Vec<crate::callable::CallableParam> = args
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mode = modes.get(i).copied().unwrap_or(crate::callable::ParamMode::In);
                crate::callable::CallableParam { mode, value: v.clone() }
            })
            .collect();
        let stmt = crate::callable::CallableStatement::new(procedure, params);
        let no_backslash_escapes = self.no_backslash_escapes();

        let seed_sql = match stmt.build_seed_sql(no_backslash_escapes) {
            Ok(sql) => sql,
            Err(msg) => return Outcome::Err(query_error_msg(msg)),
        };
        if let Some(seed_sql) = seed_sql {
            if let Outcome::Err(e) = self.query_async(cx, &seed_sql, &[]).await {
                return Outcome::Err(e);
            }
        }

        let call_sql = match stmt.build_call_sql(no_backslash_escapes) {
            Ok(sql) => sql,
            Err(msg) => return Outcome::Err(query_error_msg(msg)),
        };
        let result_rows = match self.query_async(cx, &call_sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut out_values = args.clone();
        if let Some(fetch_sql) = stmt.build_fetch_sql() {
            let fetch_rows = match self.query_async(cx, &fetch_sql, &[]).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if let Some(row) = fetch_rows.first() {
                for (col, &idx) in stmt.output_indices().iter().enumerate() {
                    if let Some(value) = row.get(col) {
                        out_values[idx] = value.clone();
                    }
                }
            }
        }

        Outcome::Ok((result_rows, out_values))
    }

    /// Ping the server asynchronously.
    pub async fn ping_async(&mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.sequence_id = 0;

        let mut writer = PacketWriter::new();
        writer.write_u8(Command::Ping as u8);

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if payload.first() == Some(&0x00) {
            Outcome::Ok(())
        } else {
            Outcome::Err(connection_error("Ping failed"))
        }
    }

    /// Switch the default database for this session (`COM_INIT_DB`).
    pub async fn init_db_async(&mut self, _cx: &Cx, schema: &str) -> Outcome<(), Error> {
        self.sequence_id = 0;

        let mut writer = PacketWriter::new();
        writer.write_u8(Command::InitDb as u8);
        writer.write_bytes(schema.as_bytes());

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match PacketType::from_first_byte(payload.first().copied().unwrap_or(0), payload.len() as u32) {
            PacketType::Ok => {
                self.config.database = Some(schema.to_string());
                Outcome::Ok(())
            }
            PacketType::Error => {
                let mut reader = PacketReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(e) => Outcome::Err(query_error(&e)),
                    None => Outcome::Err(protocol_error("Invalid error packet")),
                }
            }
            _ => Outcome::Err(protocol_error("Unexpected response to COM_INIT_DB")),
        }
    }

    /// Request the server's one-line status string (`COM_STATISTICS`).
    ///
    /// Unlike most commands this reply has no packet header discriminator —
    /// it is always a single EOF-terminated human-readable string.
    pub async fn get_statistics_async(&mut self, _cx: &Cx) -> Outcome<String, Error> {
        self.sequence_id = 0;

        let mut writer = PacketWriter::new();
        writer.write_u8(Command::Statistics as u8);

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        Outcome::Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    /// Toggle `CLIENT_MULTI_STATEMENTS` for this session (`COM_SET_OPTION`).
    pub async fn set_option_async(&mut self, _cx: &Cx, multi_statements: bool) -> Outcome<(), Error> {
        self.sequence_id = 0;

        // MYSQL_OPTION_MULTI_STATEMENTS_ON = 0, _OFF = 1
        let option_value: u16 = if multi_statements { 0 } else { 1 };

        let mut writer = PacketWriter::new();
        writer.write_u8(Command::SetOption as u8);
        writer.write_u16_le(option_value);

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match PacketType::from_first_byte(payload.first().copied().unwrap_or(0), payload.len() as u32) {
            PacketType::Ok => Outcome::Ok(()),
            PacketType::Error => {
                let mut reader = PacketReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(e) => Outcome::Err(query_error(&e)),
                    None => Outcome::Err(protocol_error("Invalid error packet")),
                }
            }
            _ => Outcome::Err(protocol_error("Unexpected response to COM_SET_OPTION")),
        }
    }

    /// Reset the session to a freshly-authenticated state without a new TCP
    /// round trip (`COM_RESET_CONNECTION`): clears prepared statements,
    /// transaction state, and session variables, but keeps the connection
    /// and authentication.
    pub async fn reset_connection_async(&mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.sequence_id = 0;

        let mut writer = PacketWriter::new();
        writer.write_u8(Command::ResetConnection as u8);

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        let (payload, _) = match self.read_packet_async().await {
            Outcome::Ok(p) => p,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match PacketType::from_first_byte(payload.first().copied().unwrap_or(0), payload.len() as u32) {
            PacketType::Ok => {
                self.prepared_stmts.clear();
                self.affected_rows = 0;
                self.last_insert_id = 0;
                self.warnings = 0;
                self.state = ConnectionState::Ready;
                Outcome::Ok(())
            }
            PacketType::Error => {
                let mut reader = PacketReader::new(&payload);
                match reader.parse_err_packet() {
                    Some(e) => Outcome::Err(query_error(&e)),
                    None => Outcome::Err(protocol_error("Invalid error packet")),
                }
            }
            _ => Outcome::Err(protocol_error("Unexpected response to COM_RESET_CONNECTION")),
        }
    }

    /// Re-authenticate as a different user (`COM_CHANGE_USER`), resetting
    /// prepared statements and transaction state the same way
    /// `reset_connection_async` does, in addition to swapping credentials.
    pub async fn change_user_async(
        &mut self,
        _cx: &Cx,
        user: &str,
        password: Option<&str>,
        database: Option<&str>,
    ) -> Outcome<(), Error> {
        let (plugin, auth_data) = match self.server_caps.as_ref() {
            Some(c) => (c.auth_plugin.clone(), c.auth_data.clone()),
            None => return Outcome::Err(protocol_error("No server handshake on record")),
        };

        self.config.user = user.to_string();
        self.config.password = password.map(str::to_string);
        if database.is_some() {
            self.config.database = database.map(str::to_string);
        }

        let auth_response = self.compute_auth_response(&plugin, &auth_data);

        self.sequence_id = 0;
        let mut writer = PacketWriter::new();
        writer.write_u8(Command::ChangeUser as u8);
        writer.write_null_string(user);
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u8(auth_response.len() as u8);
        writer.write_bytes(&auth_response);
        writer.write_null_string(self.config.database.as_deref().unwrap_or(""));
        writer.write_u16_le(u16::from(self.config.charset));
        writer.write_null_string(&plugin);

        if let Outcome::Err(e) = self.write_packet_async(writer.as_bytes()).await {
            return Outcome::Err(e);
        }

        if let Outcome::Err(e) = self.handle_auth_result_async().await {
            return Outcome::Err(e);
        }

        self.prepared_stmts.clear();
        self.affected_rows = 0;
        self.last_insert_id = 0;
        self.warnings = 0;
        self.state = ConnectionState::Ready;
        Outcome::Ok(())
    }

    /// Close the connection asynchronously.
    pub async fn close_async(mut self, _cx: &Cx) -> Result<(), Error> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }

        self.sequence_id = 0;

        let mut writer = PacketWriter::new();
        writer.write_u8(Command::Quit as u8);

        // Best effort - ignore errors on close
        let _ = self.write_packet_async(writer.as_bytes()).await;

        self.state = ConnectionState::Closed;
        Ok(())
    }
}

// === Helper functions ===

/// Picks the password for authentication factor `factor` (0-based): factor 0
/// is `primary`; factor `i >= 1` is `additional[i - 1]`. Missing entries (a
/// factor beyond the configured chain) fall back to an empty password rather
/// than erroring, matching the empty-password scramble shortcut in §4.3.
fn select_factor_password<'a>(
    primary: Option<&'a str>,
    additional: &'a [String],
    factor: usize,
) -> &'a str {
    if factor == 0 {
        primary.unwrap_or("")
    } else {
        additional
            .get(factor - 1)
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

fn auth_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Authentication,
        message: msg.into(),
        source: None,
    })
}

fn connection_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message: msg.into(),
        source: None,
    })
}

/// Classify a server ERR packet into the local [`QueryErrorKind`] taxonomy,
/// preferring the SQLSTATE class prefix (§4.8) over the ad-hoc vendor-code
/// checks the distilled driver started with.
fn classify_sqlstate(sqlstate: &str, err: &ErrPacket) -> QueryErrorKind {
    if err.is_duplicate_key() || err.is_foreign_key_violation() {
        return QueryErrorKind::Constraint;
    }
    match sqlstate.get(0..2) {
        Some("08") => QueryErrorKind::Transient,
        Some("22") => QueryErrorKind::Data,
        Some("23") => QueryErrorKind::Constraint,
        Some("28") => QueryErrorKind::Permission,
        Some("42") => QueryErrorKind::Syntax,
        Some("0A") => QueryErrorKind::Unsupported,
        _ => QueryErrorKind::Execution,
    }
}

fn query_error(err: &ErrPacket) -> Error {
    query_error_with_context(err, None, &[])
}

/// Build a [`Error::Query`] from a server ERR packet, attaching the SQL text
/// and a truncated parameter snapshot (spec §9's canonical exception shape).
fn query_error_with_context(err: &ErrPacket, sql: Option<&str>, params: &[Value]) -> Error {
    let kind = classify_sqlstate(&err.sql_state, err);
    let param_snapshot = if params.is_empty() {
        None
    } else {
        Some(dbwire_core::error::snapshot_params(
            &params.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>(),
        ))
    };

    Error::Query(QueryError {
        kind,
        message: err.error_message.clone(),
        sqlstate: Some(err.sql_state.clone()),
        vendor_code: Some(err.error_code),
        sql: sql.map(str::to_string),
        params: param_snapshot,
        detail: None,
        hint: None,
        position: None,
        packet_origin: Some("err_packet"),
        source: None,
    })
}

fn query_error_msg(msg: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        message: msg.into(),
        sqlstate: None,
        vendor_code: None,
        sql: None,
        params: None,
        detail: None,
        hint: None,
        position: None,
        packet_origin: None,
        source: None,
    })
}

/// Validate a savepoint name to prevent SQL injection.
///
/// MySQL identifiers must:
/// - Not be empty
/// - Start with a letter or underscore
/// - Contain only letters, digits, underscores, or dollar signs
/// - Be at most 64 characters
fn validate_savepoint_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(query_error_msg("Savepoint name cannot be empty"));
    }
    if name.len() > 64 {
        return Err(query_error_msg("Savepoint name exceeds maximum length of 64 characters"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(query_error_msg(
            "Savepoint name must start with a letter or underscore",
        ));
    }
    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '$' {
            return Err(query_error_msg(format!(
                "Savepoint name contains invalid character: '{}'",
                c
            )));
        }
    }
    Ok(())
}

// === Shared connection wrapper ===

/// A thread-safe, shared MySQL connection with interior mutability.
///
/// This wrapper allows the `Connection` trait to be implemented properly
/// by wrapping the raw `MySqlAsyncConnection` in an async mutex.
///
/// # Example
///
/// ```ignore
/// let conn = MySqlAsyncConnection::connect(&cx, config).await?;
/// let shared = SharedMySqlConnection::new(conn);
///
/// // Now you can use &shared with the Connection trait
/// let rows = shared.query(&cx, "SELECT * FROM users", &[]).await?;
/// ```
pub struct SharedMySqlConnection {
    inner: Arc<Mutex<MySqlAsyncConnection>>,
}

impl SharedMySqlConnection {
    /// Create a new shared connection from a raw connection.
    pub fn new(conn: MySqlAsyncConnection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Create a new shared connection by connecting to the server.
    pub async fn connect(cx: &Cx, config: MySqlConfig) -> Outcome<Self, Error> {
        match MySqlAsyncConnection::connect(cx, config).await {
            Outcome::Ok(conn) => Outcome::Ok(Self::new(conn)),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(c) => Outcome::Cancelled(c),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Get the inner Arc for cloning.
    pub fn inner(&self) -> &Arc<Mutex<MySqlAsyncConnection>> {
        &self.inner
    }

    /// Execute a prepared statement with a server-side cursor and return a
    /// streaming result set that fetches rows in batches of `fetch_size` via
    /// `COM_STMT_FETCH` instead of materializing the whole result up front.
    pub async fn query_prepared_cursor(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
        fetch_size: u32,
    ) -> Outcome<crate::result_set::StreamingResultSet, Error> {
        let mut guard = self.inner.lock(cx).await;
        let columns = match guard.execute_cursor_async(cx, stmt, params).await {
            Outcome::Ok(cols) => cols,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        drop(guard);
        Outcome::Ok(crate::result_set::StreamingResultSet::new(
            Arc::clone(&self.inner),
            stmt.clone(),
            columns,
            fetch_size,
        ))
    }

    /// Switch the default database for this session.
    pub async fn init_db(&self, cx: &Cx, schema: &str) -> Outcome<(), Error> {
        self.inner.lock(cx).await.init_db_async(cx, schema).await
    }

    /// Fetch the server's one-line `COM_STATISTICS` status string.
    pub async fn get_statistics(&self, cx: &Cx) -> Outcome<String, Error> {
        self.inner.lock(cx).await.get_statistics_async(cx).await
    }

    /// Toggle multi-statement support for this session via `COM_SET_OPTION`.
    pub async fn set_option(&self, cx: &Cx, multi_statements: bool) -> Outcome<(), Error> {
        self.inner.lock(cx).await.set_option_async(cx, multi_statements).await
    }

    /// Reset the session to a freshly-authenticated state (`COM_RESET_CONNECTION`).
    pub async fn reset_connection(&self, cx: &Cx) -> Outcome<(), Error> {
        self.inner.lock(cx).await.reset_connection_async(cx).await
    }

    /// Re-authenticate as a different user (`COM_CHANGE_USER`).
    pub async fn change_user(
        &self,
        cx: &Cx,
        user: &str,
        password: Option<&str>,
        database: Option<&str>,
    ) -> Outcome<(), Error> {
        self.inner
            .lock(cx)
            .await
            .change_user_async(cx, user, password, database)
            .await
    }
}

impl Clone for SharedMySqlConnection {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for SharedMySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMySqlConnection")
            .field("inner", &"Arc<Mutex<MySqlAsyncConnection>>")
            .finish()
    }
}

/// Transaction type for SharedMySqlConnection.
///
/// This transaction holds a clone of the Arc to the connection and executes
/// transaction operations by acquiring the mutex lock for each operation.
/// The transaction must be committed or rolled back explicitly.
///
/// # Warning: Uncommitted Transactions
///
/// If a transaction is dropped without calling `commit()` or `rollback()`,
/// the underlying MySQL transaction will remain open until the connection
/// is closed or a new transaction is started. This is because Rust's `Drop`
/// trait cannot perform async operations.
///
/// **Always explicitly call `commit()` or `rollback()` before dropping.**
///
/// Note: The lifetime parameter is required by the Connection trait but the
/// actual implementation holds an owned Arc, so the transaction can outlive
/// the reference to SharedMySqlConnection if needed.
pub struct SharedMySqlTransaction<'conn> {
    inner: Arc<Mutex<MySqlAsyncConnection>>,
    committed: bool,
    _marker: std::marker::PhantomData<&'conn ()>,
}

impl SharedMySqlConnection {
    /// Internal implementation for beginning a transaction.
    async fn begin_transaction_impl(
        &self,
        cx: &Cx,
        isolation: Option<IsolationLevel>,
    ) -> Outcome<SharedMySqlTransaction<'_>, Error> {
        let inner = Arc::clone(&self.inner);

        // Acquire lock
        let mut guard = match inner.lock(cx).await {
            Ok(g) => g,
            Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
        };

        // Set isolation level if specified
        if let Some(level) = isolation {
            let isolation_sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            match guard.execute_async(cx, &isolation_sql, &[]).await {
                Outcome::Ok(_) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(c) => return Outcome::Cancelled(c),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        // Start transaction
        match guard.execute_async(cx, "BEGIN", &[]).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(c) => return Outcome::Cancelled(c),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        drop(guard);

        Outcome::Ok(SharedMySqlTransaction {
            inner,
            committed: false,
            _marker: std::marker::PhantomData,
        })
    }
}

impl Connection for SharedMySqlConnection {
    type Tx<'conn> = SharedMySqlTransaction<'conn> where Self: 'conn;

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.query_async(cx, &sql, &params).await
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            let rows = match guard.query_async(cx, &sql, &params).await {
                Outcome::Ok(r) => r,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(c) => return Outcome::Cancelled(c),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            Outcome::Ok(rows.into_iter().next())
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.execute_async(cx, &sql, &params).await
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            match guard.execute_async(cx, &sql, &params).await {
                Outcome::Ok(_) => Outcome::Ok(guard.last_insert_id() as i64),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(c) => Outcome::Cancelled(c),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn batch(
        &self,
        cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let statements = statements.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            if statements.len() >= 2 {
                tracing::debug!("db.operation.batch.size" = statements.len(), "dispatching batch");
            }
            let mut results = Vec::with_capacity(statements.len());
            for (sql, params) in &statements {
                match guard.execute_async(cx, sql, params).await {
                    Outcome::Ok(n) => results.push(n),
                    Outcome::Err(e) => {
                        return Outcome::Err(Error::BatchUpdateError {
                            counts: results,
                            cause: Box::new(e),
                        });
                    }
                    Outcome::Cancelled(c) => return Outcome::Cancelled(c),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            Outcome::Ok(results)
        }
    }

    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.begin_transaction_impl(cx, None)
    }

    fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.begin_transaction_impl(cx, Some(isolation))
    }

    fn prepare(
        &self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.prepare_async(cx, &sql).await
        }
    }

    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let stmt = stmt.clone();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.query_prepared_async(cx, &stmt, &params).await
        }
    }

    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let stmt = stmt.clone();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.execute_prepared_async(cx, &stmt, &params).await
        }
    }

    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.ping_async(cx).await
        }
    }

    fn close(self, cx: &Cx) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            // Try to get exclusive access - if we have the only Arc, we can close
            match Arc::try_unwrap(self.inner) {
                Ok(mutex) => {
                    let conn = mutex.into_inner();
                    conn.close_async(cx).await
                }
                Err(_) => {
                    // Other references exist, can't close
                    Err(connection_error(
                        "Cannot close: other references to connection exist",
                    ))
                }
            }
        }
    }
}

impl<'conn> TransactionOps for SharedMySqlTransaction<'conn> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.query_async(cx, &sql, &params).await
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            let rows = match guard.query_async(cx, &sql, &params).await {
                Outcome::Ok(r) => r,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(c) => return Outcome::Cancelled(c),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            Outcome::Ok(rows.into_iter().next())
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let inner = Arc::clone(&self.inner);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            guard.execute_async(cx, &sql, &params).await
        }
    }

    fn savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let inner = Arc::clone(&self.inner);
        // Validate name before building SQL to prevent injection
        let validation_result = validate_savepoint_name(name);
        let sql = format!("SAVEPOINT {}", name);
        async move {
            // Return validation error if name was invalid
            if let Err(e) = validation_result {
                return Outcome::Err(e);
            }
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            match guard.execute_async(cx, &sql, &[]).await {
                Outcome::Ok(_) => Outcome::Ok(()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(c) => Outcome::Cancelled(c),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn rollback_to(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let inner = Arc::clone(&self.inner);
        // Validate name before building SQL to prevent injection
        let validation_result = validate_savepoint_name(name);
        let sql = format!("ROLLBACK TO SAVEPOINT {}", name);
        async move {
            // Return validation error if name was invalid
            if let Err(e) = validation_result {
                return Outcome::Err(e);
            }
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            match guard.execute_async(cx, &sql, &[]).await {
                Outcome::Ok(_) => Outcome::Ok(()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(c) => Outcome::Cancelled(c),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn release(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let inner = Arc::clone(&self.inner);
        // Validate name before building SQL to prevent injection
        let validation_result = validate_savepoint_name(name);
        let sql = format!("RELEASE SAVEPOINT {}", name);
        async move {
            // Return validation error if name was invalid
            if let Err(e) = validation_result {
                return Outcome::Err(e);
            }
            let mut guard = match inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            match guard.execute_async(cx, &sql, &[]).await {
                Outcome::Ok(_) => Outcome::Ok(()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(c) => Outcome::Cancelled(c),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    // Note: clippy incorrectly flags `self.committed = true` as unused, but
    // the Drop impl reads this field to determine if rollback logging is needed.
    #[allow(unused_assignments)]
    fn commit(mut self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            let mut guard = match self.inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            match guard.execute_async(cx, "COMMIT", &[]).await {
                Outcome::Ok(_) => {
                    self.committed = true;
                    Outcome::Ok(())
                }
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(c) => Outcome::Cancelled(c),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            let mut guard = match self.inner.lock(cx).await {
                Ok(g) => g,
                Err(_) => return Outcome::Err(connection_error("Failed to acquire connection lock")),
            };
            match guard.execute_async(cx, "ROLLBACK", &[]).await {
                Outcome::Ok(_) => Outcome::Ok(()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(c) => Outcome::Cancelled(c),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }
}

impl<'conn> Drop for SharedMySqlTransaction<'conn> {
    fn drop(&mut self) {
        if !self.committed {
            // WARNING: Transaction was dropped without commit() or rollback()!
            // We cannot do async work in Drop, so the MySQL transaction will
            // remain open until the connection is closed or a new transaction
            // is started. This may cause unexpected behavior.
            //
            // To fix: Always call tx.commit(cx).await or tx.rollback(cx).await
            // before the transaction goes out of scope.
            #[cfg(debug_assertions)]
            eprintln!(
                "WARNING: SharedMySqlTransaction dropped without commit/rollback. \
                 The MySQL transaction may still be open."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert_eq!(ConnectionState::Disconnected, ConnectionState::Disconnected);
    }

    #[test]
    fn test_select_factor_password() {
        let additional = vec!["second".to_string(), "third".to_string()];

        assert_eq!(select_factor_password(Some("first"), &additional, 0), "first");
        assert_eq!(select_factor_password(Some("first"), &additional, 1), "second");
        assert_eq!(select_factor_password(Some("first"), &additional, 2), "third");
        // Beyond the configured chain: empty, not a panic.
        assert_eq!(select_factor_password(Some("first"), &additional, 3), "");
        assert_eq!(select_factor_password(None, &[], 0), "");
    }

    #[test]
    fn test_error_helpers() {
        let err = protocol_error("test");
        assert!(matches!(err, Error::Protocol(_)));

        let err = auth_error("auth failed");
        assert!(matches!(err, Error::Connection(_)));

        let err = connection_error("conn failed");
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_validate_savepoint_name_valid() {
        // Valid names
        assert!(validate_savepoint_name("sp1").is_ok());
        assert!(validate_savepoint_name("_savepoint").is_ok());
        assert!(validate_savepoint_name("SavePoint_123").is_ok());
        assert!(validate_savepoint_name("sp$test").is_ok());
        assert!(validate_savepoint_name("a").is_ok());
        assert!(validate_savepoint_name("_").is_ok());
    }

    #[test]
    fn test_validate_savepoint_name_invalid() {
        // Empty name
        assert!(validate_savepoint_name("").is_err());

        // Starts with digit
        assert!(validate_savepoint_name("1savepoint").is_err());

        // Contains invalid characters
        assert!(validate_savepoint_name("save-point").is_err());
        assert!(validate_savepoint_name("save point").is_err());
        assert!(validate_savepoint_name("save;drop table").is_err());
        assert!(validate_savepoint_name("sp'--").is_err());

        // Too long (over 64 chars)
        let long_name = "a".repeat(65);
        assert!(validate_savepoint_name(&long_name).is_err());
    }
}
