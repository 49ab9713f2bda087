pub mod codec;
pub mod handshake;
pub mod packet;
pub mod resultset;

pub use codec::PacketCodec;
pub use handshake::{
    is_eof_packet, is_err_packet, is_ok_packet, AuthPlugin, AuthSwitchRequest, ErrPacket,
    HandshakeResponse, InitialHandshake, SslRequest, FAST_AUTH_SUCCESS, FULL_AUTH_REQUIRED,
};
pub use packet::{capabilities, Command, Packet};
pub use resultset::{parse_length_encoded_int, Row};
