use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::{
    header::{Header, HEADER_LEN, PROTOCOL_VERSION},
    Error, Message,
};

/// A decoded message together with the header it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Header the message arrived with.
    pub header: Header,
    /// The decoded message.
    pub message: Message,
}

/// Outcome of decoding one message out of a validated buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A decoded message.
    Packet(Packet),
    /// A well-framed message of a type this agent does not know. Skipped.
    Unknown(Header),
    /// A well-framed message whose body could not be parsed.
    Malformed { header: Header, error: Error },
}

/// Encodes `message` with sequence number `seq` at the end of `dst`.
/// Returns the number of bytes written. On error `dst` is left untouched.
pub fn encode(message: &Message, seq: u32, dst: &mut BytesMut) -> Result<usize, Error> {
    let start = dst.len();
    Header::new(message.msg_type(), 0, seq).write(dst);

    if let Err(e) = message.encode_body(dst) {
        dst.truncate(start);
        return Err(e);
    }

    let len = dst.len() - start;
    let Ok(len16) = u16::try_from(len) else {
        dst.truncate(start);
        return Err(Error::TooLong { field: "message", len, max: u16::MAX as usize });
    };

    // Patch the length now that the body size is known
    dst[start + 2..start + 4].copy_from_slice(&len16.to_be_bytes());
    Ok(len)
}

/// Decodes a buffer holding one or more concatenated messages.
///
/// The framing of the whole buffer is checked before any body is parsed: a
/// declared length that is shorter than the header or runs past the end of the
/// buffer fails the entire decode, since every following offset would be a guess.
/// Within a well-framed buffer, unknown types and unparsable bodies are reported
/// per message and do not affect their neighbors.
pub fn decode_all(src: &[u8]) -> Result<Vec<Decoded>, Error> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset < src.len() {
        let rest = &src[offset..];
        let header = Header::peek(rest).ok_or(Error::Truncated {
            what: "header",
            needed: HEADER_LEN,
            remaining: rest.len(),
        })?;
        header.validate(rest.len())?;

        frames.push((offset, header));
        offset += header.length as usize;
    }

    let buf = Bytes::copy_from_slice(src);
    let decoded = frames
        .into_iter()
        .map(|(offset, header)| {
            let start = offset + HEADER_LEN;
            let body = buf.slice(start..start + header.body_len());
            match header.kind() {
                None => Decoded::Unknown(header),
                Some(kind) => match Message::decode_body(kind, body) {
                    Ok(message) => Decoded::Packet(Packet { header, message }),
                    Err(error) => Decoded::Malformed { header, error },
                },
            }
        })
        .collect();

    Ok(decoded)
}

/// Stream codec for the controller connection.
///
/// The decoder skips unknown types and unparsable bodies (their framing is
/// intact), but fails on a header it cannot trust, since the stream can no longer
/// be resynchronized. The encoder stamps each outgoing message with a locally
/// incrementing sequence number.
#[derive(Debug, Default)]
pub struct Codec {
    next_seq: u32,
}

impl Codec {
    /// Codec numbering outgoing messages from zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A codec whose first encoded message carries `seq`. Used to keep
    /// sequence numbers monotonic across reconnects.
    pub const fn starting_at(seq: u32) -> Self {
        Self { next_seq: seq }
    }

    /// The sequence number the next encoded message will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }
}

impl Decoder for Codec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(header) = Header::peek(src) else {
                return Ok(None);
            };

            if header.version != PROTOCOL_VERSION {
                return Err(Error::Version(header.version));
            }

            let len = header.length as usize;
            if len < HEADER_LEN {
                return Err(Error::InvalidLength { declared: len, remaining: src.len() });
            }

            if src.len() < len {
                src.reserve(len - src.len());
                return Ok(None);
            }

            let mut frame = src.split_to(len).freeze();
            frame.advance(HEADER_LEN);

            let Some(kind) = header.kind() else {
                debug!(msg_type = header.msg_type, seq = header.seq, "Skipping unknown message type");
                continue;
            };

            match Message::decode_body(kind, frame) {
                Ok(message) => return Ok(Some(Packet { header, message })),
                Err(e) => {
                    warn!(?kind, seq = header.seq, "Dropping malformed message: {}", e);
                    continue;
                }
            }
        }
    }
}

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode(&item, self.next_seq, dst)?;
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(())
    }
}
