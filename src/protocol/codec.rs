use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::packet::{Packet, MAX_PACKET_SIZE, PACKET_HEADER_SIZE};

/// Frames a byte stream into MySQL packets for tokio `Framed`
#[derive(Debug, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = src.get(..PACKET_HEADER_SIZE) else {
            return Ok(None);
        };
        let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        let sequence_id = header[3];

        let frame_len = PACKET_HEADER_SIZE + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(PACKET_HEADER_SIZE);
        Ok(Some(Packet::new(sequence_id, src.split_to(len).freeze())))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Health check commands are tiny; multi-packet payloads are never sent
        if item.payload.len() >= MAX_PACKET_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "packet payload exceeds a single MySQL frame",
            ));
        }
        item.write_to(dst);
        Ok(())
    }
}
