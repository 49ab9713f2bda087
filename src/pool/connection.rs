use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::protocol::{
    capabilities, is_eof_packet, is_err_packet, is_ok_packet, parse_length_encoded_int,
    AuthPlugin, AuthSwitchRequest, Command, ErrPacket, HandshakeResponse, InitialHandshake,
    Packet, PacketCodec, Row, SslRequest, FAST_AUTH_SUCCESS, FULL_AUTH_REQUIRED,
};

use super::options::{ConnectOptions, Endpoint};

/// Byte stream a session runs over: plain TCP, Unix socket, or TLS
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

type BoxedStream = Box<dyn AsyncStream>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is available for use
    Idle,
    /// Connection is currently in use
    InUse,
    /// Connection is broken/closed
    Closed,
}

/// One authenticated session to the database node
pub struct PooledConnection {
    framed: Framed<BoxedStream, PacketCodec>,
    state: ConnectionState,
    created_at: Instant,
    last_used_at: Instant,
    connection_id: u32,
}

impl PooledConnection {
    /// Open a session, bounded by the configured connect timeout
    pub async fn connect(options: &ConnectOptions) -> Result<Self, ConnectionError> {
        match tokio::time::timeout(options.connect_timeout, Self::establish(options)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(options.connect_timeout)),
        }
    }

    async fn open_stream(endpoint: &Endpoint) -> Result<BoxedStream, ConnectionError> {
        let stream: BoxedStream = match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| ConnectionError::Connect(e.to_string()))?;
                stream.set_nodelay(true).ok();
                Box::new(stream)
            }
            Endpoint::Unix(path) => Box::new(
                UnixStream::connect(path)
                    .await
                    .map_err(|e| ConnectionError::Connect(e.to_string()))?,
            ),
        };
        Ok(stream)
    }

    async fn establish(options: &ConnectOptions) -> Result<Self, ConnectionError> {
        debug!(endpoint = %options.endpoint, "Connecting to database node");

        let stream = Self::open_stream(&options.endpoint).await.map_err(|e| {
            error!(endpoint = %options.endpoint, error = %e, "Failed to connect to database node");
            e
        })?;
        let mut framed = Framed::new(stream, PacketCodec);

        let greeting = next_packet(&mut framed).await?;
        if is_err_packet(&greeting.payload) {
            // e.g. "Host is blocked" or "Too many connections"
            let message = ErrPacket::parse(&greeting.payload)
                .map(|err| err.to_string())
                .unwrap_or_else(|| "Server rejected connection".into());
            return Err(ConnectionError::Connect(message));
        }

        let handshake = InitialHandshake::parse(&greeting.payload)
            .ok_or_else(|| ConnectionError::Protocol("Invalid server handshake".into()))?;

        debug!(
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            "Received server handshake"
        );

        let mut caps = capabilities::DEFAULT_CAPABILITIES & handshake.capability_flags;
        let mut sequence_id = greeting.sequence_id.wrapping_add(1);

        if let Some(tls) = &options.tls {
            if !handshake.supports_tls() {
                return Err(ConnectionError::Tls(
                    "Server does not support TLS".into(),
                ));
            }
            caps |= capabilities::CLIENT_SSL;

            framed
                .send(SslRequest::new(caps).encode(sequence_id))
                .await
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            sequence_id = sequence_id.wrapping_add(1);

            let server_name = ServerName::try_from(options.endpoint.tls_server_name())
                .map_err(|e| ConnectionError::Tls(e.to_string()))?;
            let connector = TlsConnector::from(tls.config.clone());
            let tls_stream = connector
                .connect(server_name, framed.into_inner())
                .await
                .map_err(|e| ConnectionError::Tls(e.to_string()))?;

            debug!(profile = %tls.profile, "TLS session established");
            framed = Framed::new(Box::new(tls_stream) as BoxedStream, PacketCodec);
        }

        // Unknown plugins get a native answer; the server then asks to switch
        let plugin = AuthPlugin::from_name(&handshake.auth_plugin_name)
            .unwrap_or(AuthPlugin::NativePassword);

        let response = HandshakeResponse {
            capability_flags: caps,
            username: options.user.clone(),
            auth_response: plugin.scramble(&options.password, &handshake.auth_plugin_data()),
            database: None,
            auth_plugin_name: plugin.name().to_string(),
        };

        framed
            .send(response.encode(sequence_id))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let secure = options.tls.is_some() || matches!(options.endpoint, Endpoint::Unix(_));
        Self::authenticate(&mut framed, options, plugin, secure).await?;

        debug!("Database authentication successful");

        let now = Instant::now();
        Ok(Self {
            framed,
            state: ConnectionState::Idle,
            created_at: now,
            last_used_at: now,
            connection_id: handshake.connection_id,
        })
    }

    /// Read the server's verdict on the handshake
    ///
    /// Follows at most one auth switch. For caching_sha2_password a full
    /// authentication sends the password in clear, so it is only answered
    /// when the transport is `secure` (TLS or a Unix socket).
    async fn authenticate(
        framed: &mut Framed<BoxedStream, PacketCodec>,
        options: &ConnectOptions,
        mut plugin: AuthPlugin,
        secure: bool,
    ) -> Result<(), ConnectionError> {
        let mut switched = false;

        loop {
            let response = next_packet(framed).await?;
            let reply_id = response.sequence_id.wrapping_add(1);

            match response.header() {
                Some(0x00) => return Ok(()),
                Some(0xFF) => {
                    let err = ErrPacket::parse(&response.payload)
                        .map(|err| err.to_string())
                        .unwrap_or_else(|| "Access denied".into());
                    error!(error = %err, "Database authentication failed");
                    return Err(ConnectionError::Auth(err));
                }
                Some(0xFE) if !switched => {
                    let switch = AuthSwitchRequest::parse(&response.payload).ok_or_else(|| {
                        ConnectionError::Protocol("Invalid auth switch request".into())
                    })?;
                    plugin = AuthPlugin::from_name(&switch.plugin_name).ok_or_else(|| {
                        ConnectionError::Auth(format!(
                            "Unsupported auth plugin {}",
                            switch.plugin_name
                        ))
                    })?;
                    debug!(plugin = plugin.name(), "Server requested auth switch");

                    let scramble = plugin.scramble(&options.password, &switch.plugin_data);
                    send_auth(framed, Packet::new(reply_id, scramble)).await?;
                    switched = true;
                }
                Some(0x01) if plugin == AuthPlugin::CachingSha2 => {
                    match response.payload.get(1).copied() {
                        Some(FAST_AUTH_SUCCESS) => {
                            debug!("caching_sha2_password fast authentication succeeded");
                        }
                        Some(FULL_AUTH_REQUIRED) if secure => {
                            let mut password = options.password.clone().into_bytes();
                            password.push(0);
                            send_auth(framed, Packet::new(reply_id, password)).await?;
                        }
                        Some(FULL_AUTH_REQUIRED) => {
                            return Err(ConnectionError::Auth(
                                "caching_sha2_password full authentication requires TLS or a Unix socket"
                                    .into(),
                            ))
                        }
                        _ => {
                            return Err(ConnectionError::Protocol(
                                "Unexpected caching_sha2_password status".into(),
                            ))
                        }
                    }
                }
                _ => {
                    return Err(ConnectionError::Protocol(
                        "Unexpected packet during authentication".into(),
                    ))
                }
            }
        }
    }

    /// Check if the session is alive by sending COM_PING
    pub async fn ping(&mut self) -> Result<(), ConnectionError> {
        self.begin_exchange();
        self.send(Packet::command(Command::Ping)).await?;

        let response = self.recv().await?;
        if is_ok_packet(&response.payload) {
            self.end_exchange();
            return Ok(());
        }

        Err(ConnectionError::Protocol("Unexpected response to ping".into()))
    }

    /// Run a statement over the text protocol and collect its rows
    ///
    /// A server-side error leaves the session usable; any framing problem
    /// marks it closed so it is never handed out again. So does dropping the
    /// future before the reply has been read in full.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>, ConnectionError> {
        self.begin_exchange();
        self.send(Packet::command_with_text(Command::Query, sql)).await?;

        let first = self.recv().await?;
        if is_err_packet(&first.payload) {
            return Err(self.query_error(&first));
        }
        if is_ok_packet(&first.payload) {
            // Statement without a result set
            self.end_exchange();
            return Ok(Vec::new());
        }

        let (columns, _) = parse_length_encoded_int(&first.payload).map_err(|e| self.broken(e))?;
        let columns = columns as usize;

        // Column definitions carry nothing the checks need
        for _ in 0..columns {
            self.recv().await?;
        }

        let eof = self.recv().await?;
        if !is_eof_packet(&eof.payload) {
            return Err(self.broken("Expected EOF after column definitions"));
        }

        let mut rows = Vec::new();
        loop {
            let packet = self.recv().await?;
            if is_eof_packet(&packet.payload) {
                break;
            }
            if is_err_packet(&packet.payload) {
                return Err(self.query_error(&packet));
            }
            rows.push(Row::parse(&packet.payload, columns).map_err(|e| self.broken(e))?);
        }

        self.end_exchange();
        Ok(rows)
    }

    /// Politely end the session with COM_QUIT
    pub async fn quit(&mut self) {
        if self.state != ConnectionState::Closed {
            if let Err(e) = self.send(Packet::command(Command::Quit)).await {
                debug!(error = %e, "Failed to send quit");
            }
        }
        self.state = ConnectionState::Closed;
    }

    /// The stream is mid-reply until [`end_exchange`](Self::end_exchange)
    fn begin_exchange(&mut self) {
        self.state = ConnectionState::Closed;
    }

    fn end_exchange(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used_at = Instant::now();
    }

    /// An ERR reply ends the exchange cleanly
    fn query_error(&mut self, packet: &Packet) -> ConnectionError {
        self.end_exchange();
        let message = ErrPacket::parse(&packet.payload)
            .map(|err| err.to_string())
            .unwrap_or_else(|| "Unknown query error".into());
        ConnectionError::Query(message)
    }

    fn broken(&mut self, reason: impl ToString) -> ConnectionError {
        self.state = ConnectionState::Closed;
        ConnectionError::Protocol(reason.to_string())
    }

    /// Check if connection has exceeded max age
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() > max_age
    }

    /// Mark connection as in use
    pub fn acquire(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used_at = Instant::now();
    }

    /// Mark connection as available
    pub fn release(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Idle;
        }
    }

    /// Check if connection is usable
    pub fn is_usable(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server-side thread id of this session
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Send a packet to the server
    pub async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        match self.framed.send(packet).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ConnectionState::Closed;
                Err(ConnectionError::Io(e.to_string()))
            }
        }
    }

    /// Receive a packet from the server
    pub async fn recv(&mut self) -> Result<Packet, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(packet)) => Ok(packet),
            Some(Err(e)) => {
                self.state = ConnectionState::Closed;
                Err(ConnectionError::Io(e.to_string()))
            }
            None => {
                self.state = ConnectionState::Closed;
                Err(ConnectionError::Disconnected)
            }
        }
    }
}

async fn send_auth(
    framed: &mut Framed<BoxedStream, PacketCodec>,
    packet: Packet,
) -> Result<(), ConnectionError> {
    framed
        .send(packet)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))
}

async fn next_packet(
    framed: &mut Framed<BoxedStream, PacketCodec>,
) -> Result<Packet, ConnectionError> {
    framed
        .next()
        .await
        .ok_or(ConnectionError::Disconnected)?
        .map_err(|e| ConnectionError::Io(e.to_string()))
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection disconnected")]
    Disconnected,

    #[error("Connection pool is closed")]
    PoolClosed,
}
