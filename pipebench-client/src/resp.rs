//! RESP (Redis Serialization Protocol) codec
//!
//! Client side of the protocol: commands go out as arrays of bulk strings,
//! replies come back as any RESP2 value and are parsed incrementally from a
//! connection's read buffer.

use bytes::{BufMut, BytesMut};
use std::fmt::Write;
use std::str;

use crate::error::{ClientError, Result};

const MAX_BULK_STRING_SIZE: i64 = 512 * 1024 * 1024; // 512MB max
const MAX_ARRAY_SIZE: i64 = 1024 * 1024; // 1M elements max
const MAX_ARRAY_DEPTH: usize = 128; // Max nesting depth

/// RESP value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -ERR message\r\n
    Error(String),
    /// Integer: :42\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    BulkString(Option<String>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Vec<RespValue>),
    /// Null array: *-1\r\n
    Null,
}

impl RespValue {
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// Incremental RESP reply parser
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Parse one RESP value from the front of `data`
    ///
    /// Returns `Some((value, bytes_consumed))` for a complete value and
    /// `None` if more data is needed.
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<(RespValue, usize)>> {
        if data.is_empty() {
            return Ok(None);
        }

        match data[0] {
            b'+' => Self::parse_line(data, |s| RespValue::SimpleString(s.to_string())),
            b'-' => Self::parse_line(data, |s| RespValue::Error(s.to_string())),
            b':' => Self::parse_integer(data),
            b'$' => Self::parse_bulk_string(data),
            b'*' => self.parse_array(data),
            other => Err(ClientError::Protocol(format!(
                "Invalid RESP type marker: {}",
                other as char
            ))),
        }
    }

    fn parse_line(
        data: &[u8],
        make: impl FnOnce(&str) -> RespValue,
    ) -> Result<Option<(RespValue, usize)>> {
        match read_line(data) {
            Some((line, consumed)) => Ok(Some((make(utf8(&line[1..])?), consumed))),
            None => Ok(None),
        }
    }

    fn parse_integer(data: &[u8]) -> Result<Option<(RespValue, usize)>> {
        match read_line(data) {
            Some((line, consumed)) => {
                let n = parse_number(&line[1..])?;
                Ok(Some((RespValue::Integer(n), consumed)))
            }
            None => Ok(None),
        }
    }

    fn parse_bulk_string(data: &[u8]) -> Result<Option<(RespValue, usize)>> {
        let (length_line, consumed) = match read_line(data) {
            Some(v) => v,
            None => return Ok(None),
        };

        let length = parse_number(&length_line[1..])?;

        if length == -1 {
            return Ok(Some((RespValue::BulkString(None), consumed)));
        }

        if !(0..=MAX_BULK_STRING_SIZE).contains(&length) {
            return Err(ClientError::Protocol(format!(
                "Invalid bulk string length: {length}"
            )));
        }

        let length = length as usize;

        // String + CRLF
        if data.len() < consumed + length + 2 {
            return Ok(None);
        }

        if &data[consumed + length..consumed + length + 2] != b"\r\n" {
            return Err(ClientError::Protocol(
                "Bulk string not terminated by CRLF".to_string(),
            ));
        }

        let s = String::from_utf8_lossy(&data[consumed..consumed + length]).into_owned();

        Ok(Some((RespValue::BulkString(Some(s)), consumed + length + 2)))
    }

    fn parse_array(&mut self, data: &[u8]) -> Result<Option<(RespValue, usize)>> {
        if self.depth >= MAX_ARRAY_DEPTH {
            return Err(ClientError::Protocol(
                "Maximum array nesting depth exceeded".to_string(),
            ));
        }

        let (count_line, consumed) = match read_line(data) {
            Some(v) => v,
            None => return Ok(None),
        };

        let count = parse_number(&count_line[1..])?;

        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }

        if !(0..=MAX_ARRAY_SIZE).contains(&count) {
            return Err(ClientError::Protocol(format!("Invalid array size: {count}")));
        }

        self.depth += 1;
        let result = self.parse_elements(data, count as usize, consumed);
        self.depth -= 1;

        Ok(result?.map(|(elements, consumed)| (RespValue::Array(elements), consumed)))
    }

    fn parse_elements(
        &mut self,
        data: &[u8],
        count: usize,
        mut consumed: usize,
    ) -> Result<Option<(Vec<RespValue>, usize)>> {
        let mut elements = Vec::with_capacity(count.min(1024));

        for _ in 0..count {
            match self.parse(&data[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((elements, consumed)))
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Append one command, encoded as a RESP array of bulk strings
pub fn encode_command<A: AsRef<[u8]>>(buf: &mut BytesMut, args: &[A]) {
    write_array_header(buf, args.len());
    for arg in args {
        write_bulk(buf, arg.as_ref());
    }
}

pub(crate) fn write_array_header(buf: &mut BytesMut, len: usize) {
    // Formatting into BytesMut only fails on allocation failure
    let _ = write!(buf, "*{len}\r\n");
}

pub(crate) fn write_bulk(buf: &mut BytesMut, arg: &[u8]) {
    let _ = write!(buf, "${}\r\n", arg.len());
    buf.put_slice(arg);
    buf.put_slice(b"\r\n");
}

/// RESP value serializer
///
/// Used by mock servers in tests and by anything replaying captured replies.
pub struct RespSerializer;

impl RespSerializer {
    pub fn serialize(value: &RespValue) -> Vec<u8> {
        let mut buf = Vec::new();
        Self::serialize_into(value, &mut buf);
        buf
    }

    fn serialize_into(value: &RespValue, buf: &mut Vec<u8>) {
        match value {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(Some(s)) => {
                buf.push(b'$');
                buf.extend_from_slice(s.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
            RespValue::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for element in elements {
                    Self::serialize_into(element, buf);
                }
            }
            RespValue::Null => buf.extend_from_slice(b"*-1\r\n"),
        }
    }
}

/// Line up to CRLF, and the bytes consumed including the CRLF
fn read_line(data: &[u8]) -> Option<(&[u8], usize)> {
    data.windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| (&data[..i], i + 2))
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    str::from_utf8(bytes).map_err(|e| ClientError::Protocol(format!("Invalid UTF-8: {e}")))
}

fn parse_number(bytes: &[u8]) -> Result<i64> {
    let s = utf8(bytes)?;
    s.parse()
        .map_err(|_| ClientError::Protocol(format!("Invalid integer: {s:?}")))
}
