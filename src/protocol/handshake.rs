use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::packet::{capabilities::*, Packet};

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";
pub const CACHING_SHA2_PLUGIN: &str = "caching_sha2_password";

/// Status byte following 0x01 in a caching_sha2_password exchange
pub const FAST_AUTH_SUCCESS: u8 = 0x03;
pub const FULL_AUTH_REQUIRED: u8 = 0x04;

/// Password authentication methods the client can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    NativePassword,
    CachingSha2,
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            NATIVE_PASSWORD_PLUGIN => Some(Self::NativePassword),
            CACHING_SHA2_PLUGIN => Some(Self::CachingSha2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NativePassword => NATIVE_PASSWORD_PLUGIN,
            Self::CachingSha2 => CACHING_SHA2_PLUGIN,
        }
    }

    /// Scramble `password` with the server nonce
    pub fn scramble(self, password: &str, nonce: &[u8]) -> Vec<u8> {
        match self {
            Self::NativePassword => compute_auth_response(password, nonce),
            Self::CachingSha2 => compute_caching_sha2_response(password, nonce),
        }
    }
}

/// utf8mb4_general_ci
const DEFAULT_CHARACTER_SET: u8 = 0x2d;
const DEFAULT_MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// MySQL initial handshake packet (server -> client)
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data_part1: [u8; 8],
    pub capability_flags: u32,
    pub auth_plugin_data_part2: Vec<u8>,
    pub auth_plugin_name: String,
}

impl InitialHandshake {
    /// Get full auth plugin data (20 bytes)
    pub fn auth_plugin_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(20);
        data.extend_from_slice(&self.auth_plugin_data_part1);
        data.extend_from_slice(&self.auth_plugin_data_part2);
        data
    }

    /// Whether the server is willing to upgrade the session to TLS
    pub fn supports_tls(&self) -> bool {
        self.capability_flags & CLIENT_SSL != 0
    }

    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 32 {
            return None;
        }

        let mut buf = payload;

        // Protocol version 10 is the only one still spoken
        if buf.get_u8() != 10 {
            return None;
        }

        // Server version (null-terminated string)
        let null_pos = buf.iter().position(|&b| b == 0)?;
        let server_version = String::from_utf8_lossy(&buf[..null_pos]).to_string();
        buf.advance(null_pos + 1);

        // connection id + auth data 1 + filler + caps + charset + status + caps + len + reserved
        if buf.remaining() < 4 + 8 + 1 + 2 + 1 + 2 + 2 + 1 + 10 {
            return None;
        }

        let connection_id = buf.get_u32_le();

        let mut auth_plugin_data_part1 = [0u8; 8];
        auth_plugin_data_part1.copy_from_slice(&buf[..8]);
        buf.advance(8);

        // Filler
        buf.advance(1);

        let capability_flags_lower = buf.get_u16_le() as u32;
        // Character set and status flags
        buf.advance(3);
        let capability_flags_upper = buf.get_u16_le() as u32;
        let capability_flags = capability_flags_lower | (capability_flags_upper << 16);

        let auth_plugin_data_len = buf.get_u8();

        // Reserved
        buf.advance(10);

        // Auth plugin data part 2
        let mut auth_plugin_data_part2 = Vec::new();
        if capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            let len = std::cmp::max(13, (auth_plugin_data_len as usize).saturating_sub(8));
            let len = len.min(buf.remaining());
            let data_len = buf.iter().take(len).position(|&b| b == 0).unwrap_or(len);
            auth_plugin_data_part2.extend_from_slice(&buf[..data_len]);
            buf.advance(len);
        }

        // Auth plugin name
        let auth_plugin_name = if capability_flags & CLIENT_PLUGIN_AUTH != 0 && !buf.is_empty() {
            let null_pos = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            String::from_utf8_lossy(&buf[..null_pos]).to_string()
        } else {
            NATIVE_PASSWORD_PLUGIN.to_string()
        };

        Some(Self {
            server_version,
            connection_id,
            auth_plugin_data_part1,
            capability_flags,
            auth_plugin_data_part2,
            auth_plugin_name,
        })
    }
}

/// Abbreviated handshake response asking the server to switch to TLS
#[derive(Debug, Clone)]
pub struct SslRequest {
    pub capability_flags: u32,
}

impl SslRequest {
    pub fn new(capability_flags: u32) -> Self {
        Self {
            capability_flags: capability_flags | CLIENT_SSL,
        }
    }

    pub fn encode(&self, sequence_id: u8) -> Packet {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u32_le(self.capability_flags);
        buf.put_u32_le(DEFAULT_MAX_PACKET_SIZE);
        buf.put_u8(DEFAULT_CHARACTER_SET);
        buf.extend_from_slice(&[0u8; 23]);
        Packet::new(sequence_id, buf.freeze())
    }
}

/// MySQL handshake response packet (client -> server)
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capability_flags: u32,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin_name: String,
}

impl HandshakeResponse {
    /// Encode to packet
    pub fn encode(&self, sequence_id: u8) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u32_le(self.capability_flags);
        buf.put_u32_le(DEFAULT_MAX_PACKET_SIZE);
        buf.put_u8(DEFAULT_CHARACTER_SET);

        // Reserved (23 bytes)
        buf.extend_from_slice(&[0u8; 23]);

        buf.extend_from_slice(self.username.as_bytes());
        buf.put_u8(0);

        // Auth response (length-prefixed)
        if self.capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            buf.put_u8(self.auth_response.len() as u8);
            buf.extend_from_slice(&self.auth_response);
        } else {
            buf.extend_from_slice(&self.auth_response);
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_CONNECT_WITH_DB != 0 {
            if let Some(ref db) = self.database {
                buf.extend_from_slice(db.as_bytes());
            }
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_PLUGIN_AUTH != 0 {
            buf.extend_from_slice(self.auth_plugin_name.as_bytes());
            buf.put_u8(0);
        }

        Packet::new(sequence_id, buf.freeze())
    }
}

/// Server request to restart authentication with another plugin
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub plugin_data: Vec<u8>,
}

impl AuthSwitchRequest {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.first() != Some(&0xFE) {
            return None;
        }
        let rest = &payload[1..];
        let null_pos = rest.iter().position(|&b| b == 0)?;
        let plugin_name = String::from_utf8_lossy(&rest[..null_pos]).to_string();

        let mut plugin_data = rest[null_pos + 1..].to_vec();
        if plugin_data.last() == Some(&0) {
            plugin_data.pop();
        }

        Some(Self {
            plugin_name,
            plugin_data,
        })
    }
}

/// Compute mysql_native_password auth response
pub fn compute_auth_response(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    // SHA1(password)
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let hash1 = hasher.finalize();

    // SHA1(SHA1(password))
    let mut hasher = Sha1::new();
    hasher.update(hash1);
    let hash2 = hasher.finalize();

    // SHA1(auth_data + SHA1(SHA1(password)))
    let mut hasher = Sha1::new();
    hasher.update(auth_data);
    hasher.update(hash2);
    let hash3 = hasher.finalize();

    // XOR SHA1(password) with SHA1(auth_data + SHA1(SHA1(password)))
    hash1
        .iter()
        .zip(hash3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// Compute caching_sha2_password fast-auth response
///
/// XOR(SHA256(password), SHA256(SHA256(SHA256(password)) + nonce))
pub fn compute_caching_sha2_response(password: &str, nonce: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hash1 = Sha256::digest(password.as_bytes());
    let hash2 = Sha256::digest(hash1);

    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(nonce);
    let hash3 = hasher.finalize();

    hash1
        .iter()
        .zip(hash3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// ERR packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.is_empty() || payload[0] != 0xFF {
            return None;
        }

        let mut buf = &payload[1..];
        if buf.len() < 2 {
            return None;
        }

        let error_code = buf.get_u16_le();

        let (sql_state, error_message) = if !buf.is_empty() && buf[0] == b'#' && buf.len() >= 6 {
            let sql_state = String::from_utf8_lossy(&buf[1..6]).to_string();
            let error_message = String::from_utf8_lossy(&buf[6..]).to_string();
            (sql_state, error_message)
        } else {
            ("HY000".to_string(), String::from_utf8_lossy(buf).to_string())
        };

        Some(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

impl std::fmt::Display for ErrPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Error {} ({}): {}",
            self.error_code, self.sql_state, self.error_message
        )
    }
}

/// Check if packet is OK packet
pub fn is_ok_packet(payload: &Bytes) -> bool {
    !payload.is_empty() && payload[0] == 0x00
}

/// Check if packet is ERR packet
pub fn is_err_packet(payload: &Bytes) -> bool {
    !payload.is_empty() && payload[0] == 0xFF
}

/// Check if packet is EOF packet
pub fn is_eof_packet(payload: &Bytes) -> bool {
    !payload.is_empty() && payload[0] == 0xFE && payload.len() < 9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handshake() -> Vec<u8> {
        let caps = DEFAULT_CAPABILITIES | CLIENT_SSL;
        let mut buf = BytesMut::new();
        buf.put_u8(10);
        buf.extend_from_slice(b"10.6.16-MariaDB-log\0");
        buf.put_u32_le(42);
        buf.extend_from_slice(b"abcdefgh");
        buf.put_u8(0);
        buf.put_u16_le((caps & 0xFFFF) as u16);
        buf.put_u8(0x21);
        buf.put_u16_le(0x0002);
        buf.put_u16_le(((caps >> 16) & 0xFFFF) as u16);
        buf.put_u8(21);
        buf.extend_from_slice(&[0u8; 10]);
        buf.extend_from_slice(b"ijklmnopqrst\0");
        buf.extend_from_slice(b"mysql_native_password\0");
        buf.to_vec()
    }

    #[test]
    fn test_parse_initial_handshake() {
        let handshake = InitialHandshake::parse(&sample_handshake()).unwrap();
        assert_eq!(handshake.server_version, "10.6.16-MariaDB-log");
        assert_eq!(handshake.connection_id, 42);
        assert_eq!(handshake.auth_plugin_data(), b"abcdefghijklmnopqrst".to_vec());
        assert_eq!(handshake.auth_plugin_name, NATIVE_PASSWORD_PLUGIN);
        assert!(handshake.supports_tls());
    }

    #[test]
    fn test_parse_truncated_handshake() {
        let payload = sample_handshake();
        assert!(InitialHandshake::parse(&payload[..20]).is_none());
    }

    #[test]
    fn test_parse_rejects_old_protocol() {
        let mut payload = sample_handshake();
        payload[0] = 9;
        assert!(InitialHandshake::parse(&payload).is_none());
    }

    #[test]
    fn test_auth_plugin_names() {
        assert_eq!(
            AuthPlugin::from_name("caching_sha2_password"),
            Some(AuthPlugin::CachingSha2)
        );
        assert_eq!(
            AuthPlugin::from_name("mysql_native_password"),
            Some(AuthPlugin::NativePassword)
        );
        assert_eq!(AuthPlugin::from_name("auth_gssapi_client"), None);
        assert_eq!(AuthPlugin::CachingSha2.name(), CACHING_SHA2_PLUGIN);
    }

    #[test]
    fn test_caching_sha2_response() {
        let nonce = b"01234567890123456789";
        assert!(compute_caching_sha2_response("", nonce).is_empty());

        let scramble = compute_caching_sha2_response("secret", nonce);
        assert_eq!(scramble.len(), 32);

        // Undo the XOR with the server-side view of the secret
        let stage2 = Sha256::digest(Sha256::digest(b"secret"));
        let mut hasher = Sha256::new();
        hasher.update(stage2);
        hasher.update(nonce);
        let mask = hasher.finalize();
        let stage1: Vec<u8> = scramble.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(stage1, Sha256::digest(b"secret").to_vec());

        assert_eq!(
            AuthPlugin::CachingSha2.scramble("secret", nonce),
            scramble
        );
        assert_eq!(AuthPlugin::NativePassword.scramble("secret", nonce).len(), 20);
    }

    #[test]
    fn test_ssl_request_layout() {
        let packet = SslRequest::new(DEFAULT_CAPABILITIES).encode(1);
        assert_eq!(packet.sequence_id, 1);
        assert_eq!(packet.payload.len(), 32);
        let caps = u32::from_le_bytes([
            packet.payload[0],
            packet.payload[1],
            packet.payload[2],
            packet.payload[3],
        ]);
        assert_ne!(caps & CLIENT_SSL, 0);
    }

    #[test]
    fn test_handshake_response_layout() {
        let response = HandshakeResponse {
            capability_flags: DEFAULT_CAPABILITIES,
            username: "monitor".to_string(),
            auth_response: vec![1, 2, 3],
            database: None,
            auth_plugin_name: NATIVE_PASSWORD_PLUGIN.to_string(),
        };
        let packet = response.encode(1);
        let payload = &packet.payload[..];
        assert_eq!(&payload[32..40], b"monitor\0");
        assert_eq!(&payload[40..44], &[3, 1, 2, 3]);
        assert_eq!(&payload[44..], b"mysql_native_password\0");
    }

    #[test]
    fn test_auth_response() {
        assert!(compute_auth_response("", b"01234567890123456789").is_empty());

        let scramble = compute_auth_response("secret", b"01234567890123456789");
        assert_eq!(scramble.len(), 20);
        assert_eq!(
            scramble,
            compute_auth_response("secret", b"01234567890123456789")
        );
        assert_ne!(
            scramble,
            compute_auth_response("secret", b"98765432109876543210")
        );
    }

    #[test]
    fn test_parse_auth_switch() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(b"mysql_native_password\0");
        payload.extend_from_slice(b"01234567890123456789\0");
        let switch = AuthSwitchRequest::parse(&payload).unwrap();
        assert_eq!(switch.plugin_name, NATIVE_PASSWORD_PLUGIN);
        assert_eq!(switch.plugin_data, b"01234567890123456789".to_vec());
    }

    #[test]
    fn test_parse_err_packet() {
        let mut payload = vec![0xFF, 0x15, 0x04];
        payload.extend_from_slice(b"#28000Access denied for user 'monitor'");
        let err = ErrPacket::parse(&payload).unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.error_message, "Access denied for user 'monitor'");
    }

    #[test]
    fn test_packet_classification() {
        assert!(is_ok_packet(&Bytes::from_static(&[0x00, 0x00, 0x00])));
        assert!(is_err_packet(&Bytes::from_static(&[0xFF, 0x00, 0x00])));
        assert!(is_eof_packet(&Bytes::from_static(&[0xFE, 0x00, 0x00, 0x02, 0x00])));
        assert!(!is_eof_packet(&Bytes::from_static(&[0xFE, 1, 2, 3, 4, 5, 6, 7, 8])));
    }
}
