//! mc-domain-proxy/src/protocol.rs
//! Minecraft wire-protocol decoding. Every decoder here is a pure function
//! over a byte slice: it never touches a socket, so the session pipeline can
//! parse whatever the initial-read coalescer has accumulated so far without
//! re-reading or blocking.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("buffer ended before the value was fully decoded")]
    Incomplete,
    #[error("VarInt did not terminate within 5 bytes")]
    VarIntTooBig,
    #[error("string length exceeds remaining buffer")]
    StringTooLong,
    #[error("decoded string bytes are not valid UTF-8")]
    InvalidUtf8,
    #[error("injected IP header marker missing")]
    MissingMarker,
    #[error("injected IP header shorter than declared")]
    ShortHeader,
    #[error("packet id did not match the expected value")]
    InvalidPacketId,
}

/// Little-endian VarInt: 7 data bits per byte, continuation bit 0x80.
/// Maximum legal length is 5 bytes (32-bit value). Returns the decoded value
/// and the number of bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(i32, usize), CodecError> {
    let mut value: i32 = 0;
    let mut position = 0usize;
    loop {
        let byte = *buf.get(position).ok_or(CodecError::Incomplete)?;
        value |= ((byte & 0x7F) as i32) << (7 * position);
        position += 1;
        if byte & 0x80 == 0 {
            return Ok((value, position));
        }
        if position >= 5 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Writes a VarInt to the buffer.
pub fn write_varint(mut value: i32, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// A Minecraft string: VarInt length `n` followed by exactly `n` UTF-8 bytes.
pub fn read_string(buf: &[u8]) -> Result<(String, usize), CodecError> {
    let (len, len_bytes) = read_varint(buf)?;
    let len = len as usize;
    let remaining = &buf[len_bytes..];
    if remaining.len() < len {
        return Err(CodecError::StringTooLong);
    }
    let s = std::str::from_utf8(&remaining[..len])
        .map_err(|_| CodecError::InvalidUtf8)?
        .to_string();
    Ok((s, len_bytes + len))
}

pub fn write_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    write_varint(bytes.len() as i32, out);
    out.extend_from_slice(bytes);
}

const INJECTED_IP_MARKER: &[u8; 4] = b"MCIP";

/// Strips the proxy-injected client-IP header: `"MCIP" | L | L bytes ASCII IP`.
/// Returns the IP literal and the residual slice with the header removed.
pub fn strip_injected_ip_header(buf: &[u8]) -> Result<(String, &[u8]), CodecError> {
    if buf.len() < 5 || &buf[0..4] != INJECTED_IP_MARKER {
        return Err(CodecError::MissingMarker);
    }
    let len = buf[4] as usize;
    if buf.len() < 5 + len {
        return Err(CodecError::ShortHeader);
    }
    let ip = String::from_utf8_lossy(&buf[5..5 + len]).into_owned();
    Ok((ip, &buf[5 + len..]))
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketClass {
    /// Decodes as `VarInt packetLength, VarInt packetId` with packetId in {0x00, 0x01}.
    Modern,
    /// First byte is 0xFE (or any other shape a modern decode rejects).
    Legacy,
}

/// Classifies the first packet of a post-header stream as modern or legacy,
/// without consuming it (the caller re-parses with `parse_handshake`).
pub fn classify(buf: &[u8]) -> Result<PacketClass, CodecError> {
    if buf.first() == Some(&0xFE) {
        return Ok(PacketClass::Legacy);
    }
    let (_packet_len, len_bytes) = read_varint(buf)?;
    let (packet_id, _id_bytes) = read_varint(&buf[len_bytes..])?;
    match packet_id {
        0x00 | 0x01 => Ok(PacketClass::Modern),
        _ => Ok(PacketClass::Legacy),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHandshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub port: u16,
    pub next_state: i32,
    /// Offset into the input slice immediately after this packet.
    pub consumed: usize,
}

/// Parses the handshake packet (id 0x00): `VarInt packetLen | VarInt id=0x00 |
/// VarInt protoVersion | string addr | u16be port | VarInt nextState`.
/// The caller is responsible for normalising `server_address`.
pub fn parse_handshake(buf: &[u8]) -> Result<ParsedHandshake, CodecError> {
    let (packet_len, len_bytes) = read_varint(buf)?;
    let consumed = len_bytes + packet_len as usize;
    let body = &buf[len_bytes..];
    if body.len() < packet_len as usize {
        return Err(CodecError::Incomplete);
    }

    let (packet_id, mut offset) = read_varint(body)?;
    if packet_id != 0x00 {
        return Err(CodecError::InvalidPacketId);
    }
    let (protocol_version, n) = read_varint(&body[offset..])?;
    offset += n;
    let (server_address, n) = read_string(&body[offset..])?;
    offset += n;
    if body.len() < offset + 2 {
        return Err(CodecError::Incomplete);
    }
    let port = u16::from_be_bytes([body[offset], body[offset + 1]]);
    offset += 2;
    let (next_state, _n) = read_varint(&body[offset..])?;

    Ok(ParsedHandshake {
        protocol_version,
        server_address,
        port,
        next_state,
        consumed,
    })
}

/// Parses Login Start from the residual slice following the handshake:
/// `VarInt packetLen | VarInt id=0x00 | string username`.
pub fn parse_login_start(buf: &[u8]) -> Result<(String, usize), CodecError> {
    let (packet_len, len_bytes) = read_varint(buf)?;
    let consumed = len_bytes + packet_len as usize;
    let body = &buf[len_bytes..];
    if body.len() < packet_len as usize {
        return Err(CodecError::Incomplete);
    }
    let (packet_id, offset) = read_varint(body)?;
    if packet_id != 0x00 {
        return Err(CodecError::InvalidPacketId);
    }
    let (username, _n) = read_string(&body[offset..])?;
    Ok((username, consumed))
}

/// Builds a Login Disconnect packet (packet id 0x00 in the Login state)
/// carrying a plain-text JSON chat component as the reason.
pub fn build_disconnect_packet(msg: &str) -> Vec<u8> {
    let reason = serde_json::json!({ "text": msg }).to_string();
    let mut payload = Vec::new();
    write_varint(0x00, &mut payload);
    write_string(&reason, &mut payload);

    let mut packet = Vec::new();
    write_varint(payload.len() as i32, &mut packet);
    packet.extend(payload);
    packet
}

/// Re-encodes a handshake, used to replay or rewrite the packet toward the
/// upstream.
pub fn build_handshake_packet(hs: &ParsedHandshake) -> Vec<u8> {
    let mut data = Vec::new();
    write_varint(0x00, &mut data);
    write_varint(hs.protocol_version, &mut data);
    write_string(&hs.server_address, &mut data);
    data.extend_from_slice(&hs.port.to_be_bytes());
    write_varint(hs.next_state, &mut data);

    let mut packet = Vec::new();
    write_varint(data.len() as i32, &mut packet);
    packet.extend(data);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for n in [0, 1, 127, 128, 255, 25565, i32::MAX, -1] {
            let mut buf = Vec::new();
            write_varint(n, &mut buf);
            let (decoded, consumed) = read_varint(&buf).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn varint_too_big() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_varint(&buf), Err(CodecError::VarIntTooBig));
    }

    #[test]
    fn varint_incomplete() {
        let buf = [0x80, 0x80];
        assert_eq!(read_varint(&buf), Err(CodecError::Incomplete));
    }

    #[test]
    fn string_round_trip() {
        let mut buf = Vec::new();
        write_string("example.com", &mut buf);
        let (s, consumed) = read_string(&buf).unwrap();
        assert_eq!(s, "example.com");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn string_too_long() {
        let mut buf = Vec::new();
        write_varint(10, &mut buf);
        buf.extend_from_slice(b"short");
        assert_eq!(read_string(&buf), Err(CodecError::StringTooLong));
    }

    #[test]
    fn injected_header_happy_path() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MCIP");
        buf.push(9);
        buf.extend_from_slice(b"1.2.3.4.5");
        buf.extend_from_slice(b"trailing");
        let (ip, residual) = strip_injected_ip_header(&buf).unwrap();
        assert_eq!(ip, "1.2.3.4.5");
        assert_eq!(residual, b"trailing");
    }

    #[test]
    fn injected_header_missing_marker() {
        let buf = b"XXXX\x01a";
        assert_eq!(
            strip_injected_ip_header(buf),
            Err(CodecError::MissingMarker)
        );
    }

    #[test]
    fn injected_header_short() {
        let buf = b"MCIP\x09short";
        assert_eq!(strip_injected_ip_header(buf), Err(CodecError::ShortHeader));
    }

    #[test]
    fn classify_modern_login_and_status() {
        let mut login = Vec::new();
        write_varint(0x00, &mut login);
        assert_eq!(classify(&login), Ok(PacketClass::Modern));

        let mut status = Vec::new();
        write_varint(0x01, &mut status);
        assert_eq!(classify(&status), Ok(PacketClass::Modern));
    }

    #[test]
    fn classify_legacy_ping() {
        let buf = [0xFE, 0x01];
        assert_eq!(classify(&buf), Ok(PacketClass::Legacy));
    }

    #[test]
    fn handshake_parse_and_reencode() {
        let mut packet = Vec::new();
        let mut data = Vec::new();
        write_varint(0x00, &mut data);
        write_varint(47, &mut data);
        write_string("example.com", &mut data);
        data.extend_from_slice(&25565u16.to_be_bytes());
        write_varint(2, &mut data);
        write_varint(data.len() as i32, &mut packet);
        packet.extend(data);
        packet.extend_from_slice(b"trailing-login-bytes");

        let hs = parse_handshake(&packet).unwrap();
        assert_eq!(hs.protocol_version, 47);
        assert_eq!(hs.server_address, "example.com");
        assert_eq!(hs.port, 25565);
        assert_eq!(hs.next_state, 2);
        assert_eq!(&packet[hs.consumed..], b"trailing-login-bytes");

        let reencoded = build_handshake_packet(&hs);
        assert_eq!(reencoded, &packet[..hs.consumed]);
    }

    #[test]
    fn login_start_parse() {
        let mut packet = Vec::new();
        let mut data = Vec::new();
        write_varint(0x00, &mut data);
        write_string("alice", &mut data);
        write_varint(data.len() as i32, &mut packet);
        packet.extend(data);

        let (username, consumed) = parse_login_start(&packet).unwrap();
        assert_eq!(username, "alice");
        assert_eq!(consumed, packet.len());
    }
}
