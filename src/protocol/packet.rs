use bytes::{BufMut, Bytes, BytesMut};

/// MySQL packet header size: 3 bytes length + 1 byte sequence
pub const PACKET_HEADER_SIZE: usize = 4;
/// Maximum packet payload size (16MB - 1)
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// MySQL wire protocol packet
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_id,
            payload: payload.into(),
        }
    }

    /// Build a single-byte command packet (sequence 0 starts a new command phase)
    pub fn command(command: Command) -> Self {
        Self::new(0, vec![command as u8])
    }

    /// Build a command packet carrying a text argument, e.g. COM_QUERY
    pub fn command_with_text(command: Command, text: &str) -> Self {
        let mut payload = BytesMut::with_capacity(1 + text.len());
        payload.put_u8(command as u8);
        payload.extend_from_slice(text.as_bytes());
        Self::new(0, payload.freeze())
    }

    /// Append the 4-byte header and the payload to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(PACKET_HEADER_SIZE + self.payload.len());
        dst.put_uint_le(self.payload.len() as u64, 3);
        dst.put_u8(self.sequence_id);
        dst.put_slice(&self.payload);
    }

    /// First byte of the payload, used to classify server responses
    pub fn header(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

/// MySQL capability flags
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 14;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Capabilities requested by the health check client
    ///
    /// CLIENT_DEPRECATE_EOF is left out so result sets always terminate with
    /// a classic EOF packet, which keeps the row reader simple.
    pub const DEFAULT_CAPABILITIES: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_FOUND_ROWS
        | CLIENT_LONG_FLAG
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH;
}

/// Client commands issued by the health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    Query = 0x03,
    Ping = 0x0e,
}
