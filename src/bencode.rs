//! # Bencode Codec
//!
//! Bencoding is the serialization format used by `.torrent` files and tracker
//! responses. It has four kinds of values:
//!
//! ```text
//! i<integer>e          integer         i42e
//! <length>:<bytes>     byte string     4:spam
//! l<values>e           list            l4:spami42ee
//! d<key><value>...e    dictionary      d3:cow3:mooe
//! ```
//!
//! Byte strings are raw bytes and are never assumed to be UTF-8: piece hash
//! blocks and compact peer lists are binary.
//!
//! Dictionaries keep their entries in document order. Re-encoding a decoded
//! `info` dictionary therefore reproduces the original bytes exactly, which is
//! what the info hash is computed over.

use std::str;

use thiserror::Error;

/// Nesting deeper than this is rejected rather than recursed into.
const MAX_DEPTH: usize = 256;

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Entries in document order.
    Dict(Vec<(Vec<u8>, Value)>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),
    #[error("invalid byte string length at offset {0}")]
    InvalidLength(usize),
    #[error("invalid integer at offset {0}")]
    InvalidInteger(usize),
    #[error("dictionary key at offset {0} is not a byte string")]
    NonStringKey(usize),
    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: usize },
    #[error("trailing data after value at offset {0}")]
    TrailingData(usize),
    #[error("nesting too deep at offset {0}")]
    TooDeep(usize),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string interpreted as UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        str::from_utf8(self.as_bytes()?).ok()
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Vec<u8>, Value)]> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a dictionary entry. Returns `None` for non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k.as_slice() == key.as_bytes())
            .map(|(_, v)| v)
    }
}

/// Decode a complete bencoded document. The whole buffer must be consumed.
pub fn decode(buf: &[u8]) -> Result<Value, DecodeError> {
    let mut decoder = Decoder { buf, pos: 0 };
    let value = decoder.value(0)?;
    if decoder.pos != buf.len() {
        return Err(DecodeError::TrailingData(decoder.pos));
    }
    Ok(value)
}

/// Encode a value. Dictionary entries are written in the order they are stored.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => encode_bytes(b, out),
        Value::List(l) => {
            out.push(b'l');
            for v in l {
                encode_into(v, out);
            }
            out.push(b'e');
        }
        Value::Dict(d) => {
            out.push(b'd');
            for (k, v) in d {
                encode_bytes(k, out);
                encode_into(v, out);
            }
            out.push(b'e');
        }
    }
}

fn encode_bytes(b: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(b.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(b);
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8, DecodeError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEnd(self.pos))
    }

    fn value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep(self.pos));
        }

        match self.peek()? {
            b'i' => self.integer().map(Value::Integer),
            b'0'..=b'9' => self.bytes().map(Value::Bytes),
            b'l' => {
                self.pos += 1;
                let mut list = Vec::new();
                while self.peek()? != b'e' {
                    list.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(list))
            }
            b'd' => {
                self.pos += 1;
                let mut dict = Vec::new();
                while self.peek()? != b'e' {
                    if !self.peek()?.is_ascii_digit() {
                        return Err(DecodeError::NonStringKey(self.pos));
                    }
                    let key = self.bytes()?;
                    let value = self.value(depth + 1)?;
                    dict.push((key, value));
                }
                self.pos += 1;
                Ok(Value::Dict(dict))
            }
            byte => Err(DecodeError::UnexpectedByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn integer(&mut self) -> Result<i64, DecodeError> {
        let start = self.pos;
        self.pos += 1;

        let end = self.buf[self.pos..]
            .iter()
            .position(|&c| c == b'e')
            .map(|i| self.pos + i)
            .ok_or(DecodeError::UnexpectedEnd(self.buf.len()))?;
        let digits = &self.buf[self.pos..end];

        // Only canonical forms: no leading zeros, no "-0", no empty integer
        let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
        let canonical = !unsigned.is_empty()
            && unsigned.iter().all(u8::is_ascii_digit)
            && (unsigned == b"0" && digits.len() == 1 || unsigned[0] != b'0');
        if !canonical {
            return Err(DecodeError::InvalidInteger(start));
        }

        let value = str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(DecodeError::InvalidInteger(start))?;

        self.pos = end + 1;
        Ok(value)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        let colon = self.buf[self.pos..]
            .iter()
            .position(|&c| c == b':')
            .map(|i| self.pos + i)
            .ok_or(DecodeError::UnexpectedEnd(self.buf.len()))?;
        let digits = &self.buf[self.pos..colon];

        if digits.is_empty()
            || !digits.iter().all(u8::is_ascii_digit)
            || (digits.len() > 1 && digits[0] == b'0')
        {
            return Err(DecodeError::InvalidLength(start));
        }
        let len = str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(DecodeError::InvalidLength(start))?;

        let data_start = colon + 1;
        let data_end = data_start
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(DecodeError::UnexpectedEnd(self.buf.len()))?;

        self.pos = data_end;
        Ok(self.buf[data_start..data_end].to_vec())
    }
}
