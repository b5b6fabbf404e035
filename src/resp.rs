//! RESP2 wire format for the Redis store client
//!
//! Commands go out as arrays of bulk strings; replies are decoded
//! incrementally from the socket buffer. `RespCodec` plugs into
//! `tokio_util::codec::Framed`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Build a command array from its parts (`SET key value`)
    pub fn command<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        RespValue::Array(Some(
            parts
                .into_iter()
                .map(|p| RespValue::BulkString(Some(Bytes::copy_from_slice(p.as_ref()))))
                .collect(),
        ))
    }

    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        RespValue::BulkString(Some(Bytes::copy_from_slice(data.as_ref())))
    }

    pub fn simple(s: &str) -> Self {
        RespValue::SimpleString(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn error(s: &str) -> Self {
        RespValue::Error(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Text of a simple string, error or bulk string
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespValue::SimpleString(b) | RespValue::Error(b) | RespValue::BulkString(Some(b)) => {
                Some(String::from_utf8_lossy(b).into_owned())
            }
            _ => None,
        }
    }

    /// Parts of a command array as strings, used by test servers
    pub fn command_parts(&self) -> Option<Vec<String>> {
        match self {
            RespValue::Array(Some(items)) => items
                .iter()
                .map(|item| match item {
                    RespValue::BulkString(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RespCodec;

/// Outcome of one parse attempt over a byte slice
enum Parse {
    Complete(RespValue, usize),
    Incomplete,
}

/// Largest bulk string accepted, matching Redis `proto-max-bulk-len`
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Largest array accepted, matching Redis `proto-max-multibulk-len`
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

impl RespCodec {
    /// Parse one value from the front of `input`, advancing past it.
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn parse(input: &mut BytesMut) -> Result<Option<RespValue>, String> {
        if input.is_empty() {
            return Ok(None);
        }

        match Self::try_parse(input)? {
            Parse::Complete(value, consumed) => {
                input.advance(consumed);
                Ok(Some(value))
            }
            Parse::Incomplete => Ok(None),
        }
    }

    fn try_parse(input: &[u8]) -> Result<Parse, String> {
        if input.is_empty() {
            return Ok(Parse::Incomplete);
        }

        match input[0] {
            b'+' => Ok(Self::parse_line(input)
                .map(|(line, n)| Parse::Complete(RespValue::SimpleString(line), n))
                .unwrap_or(Parse::Incomplete)),
            b'-' => Ok(Self::parse_line(input)
                .map(|(line, n)| Parse::Complete(RespValue::Error(line), n))
                .unwrap_or(Parse::Incomplete)),
            b':' => Self::parse_integer(input),
            b'$' => Self::parse_bulk_string(input),
            b'*' => Self::parse_array(input),
            other => Err(format!("Unknown RESP type: {}", other as char)),
        }
    }

    fn parse_line(input: &[u8]) -> Option<(Bytes, usize)> {
        Self::find_crlf(input).map(|pos| (Bytes::copy_from_slice(&input[1..pos]), pos + 2))
    }

    fn parse_length(input: &[u8], pos: usize) -> Result<i64, String> {
        let s = std::str::from_utf8(&input[1..pos]).map_err(|e| e.to_string())?;
        s.parse::<i64>().map_err(|e| e.to_string())
    }

    fn parse_integer(input: &[u8]) -> Result<Parse, String> {
        match Self::find_crlf(input) {
            Some(pos) => {
                let n = Self::parse_length(input, pos)?;
                Ok(Parse::Complete(RespValue::Integer(n), pos + 2))
            }
            None => Ok(Parse::Incomplete),
        }
    }

    fn parse_bulk_string(input: &[u8]) -> Result<Parse, String> {
        let Some(pos) = Self::find_crlf(input) else {
            return Ok(Parse::Incomplete);
        };
        let len = Self::parse_length(input, pos)?;

        if len == -1 {
            return Ok(Parse::Complete(RespValue::BulkString(None), pos + 2));
        }
        if !(0..=MAX_BULK_LEN).contains(&len) {
            return Err(format!("Invalid bulk length: {}", len));
        }

        let start = pos + 2;
        let end = start + len as usize;

        if end + 2 > input.len() {
            return Ok(Parse::Incomplete);
        }
        if &input[end..end + 2] != b"\r\n" {
            return Err("Bulk string not terminated by CRLF".to_string());
        }

        let data = Bytes::copy_from_slice(&input[start..end]);
        Ok(Parse::Complete(RespValue::BulkString(Some(data)), end + 2))
    }

    fn parse_array(input: &[u8]) -> Result<Parse, String> {
        let Some(pos) = Self::find_crlf(input) else {
            return Ok(Parse::Incomplete);
        };
        let len = Self::parse_length(input, pos)?;

        if len == -1 {
            return Ok(Parse::Complete(RespValue::Array(None), pos + 2));
        }
        if !(0..=MAX_ARRAY_LEN).contains(&len) {
            return Err(format!("Invalid array length: {}", len));
        }

        let mut offset = pos + 2;
        // Sized by the buffer, never by the header
        let mut elements = Vec::with_capacity((len as usize).min(input.len() - offset));

        for _ in 0..len {
            match Self::try_parse(&input[offset..])? {
                Parse::Complete(value, consumed) => {
                    elements.push(value);
                    offset += consumed;
                }
                Parse::Incomplete => return Ok(Parse::Incomplete),
            }
        }

        Ok(Parse::Complete(RespValue::Array(Some(elements)), offset))
    }

    #[inline]
    fn find_crlf(input: &[u8]) -> Option<usize> {
        memchr::memmem::find(input, b"\r\n")
    }

    pub fn encode(value: &RespValue) -> BytesMut {
        let mut buf = BytesMut::with_capacity(256);
        Self::encode_into(value, &mut buf);
        buf
    }

    fn encode_into(value: &RespValue, buf: &mut BytesMut) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(s);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.put_u8(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::BulkString(Some(data)) => {
                buf.put_u8(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
            RespValue::Array(Some(elements)) => {
                buf.put_u8(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
        }
    }
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RespValue>, Self::Error> {
        RespCodec::parse(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        RespCodec::encode_into(&item, dst);
        Ok(())
    }
}
