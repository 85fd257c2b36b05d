//! STOMP 1.2 wire codec
//!
//! Encoding writes `COMMAND\n`, `key:value\n` header lines, a blank line, the
//! body and a NUL terminator. Decoding is incremental: bytes are pushed as the
//! transport delivers them and complete frames are pulled out one at a time.

use super::frame::{headers, Command, Frame};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

const TERMINATOR: u8 = 0;
const EOL: u8 = b'\n';
const CR: u8 = b'\r';

/// Default upper bound for a single decoded frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Local decode failures. The stream is no longer trustworthy after any of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },
    #[error("Invalid content-length: {0}")]
    InvalidContentLength(String),
    #[error("Frame body not followed by NUL terminator")]
    MissingTerminator,
    #[error("Frame headers are not valid UTF-8")]
    InvalidUtf8,
}

/// Frame encoder
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame to wire bytes (pure function)
    pub fn encode(frame: &Frame) -> Bytes {
        if frame.is_heartbeat() {
            return Bytes::from_static(b"\n");
        }

        let command = frame.command();
        let body = frame.payload();
        let mut out = BytesMut::with_capacity(64 + body.len());
        out.put_slice(command.as_str().as_bytes());
        out.put_u8(EOL);

        for (key, value) in frame.headers() {
            if command.escapes_headers() {
                out.put_slice(escape(key).as_bytes());
                out.put_u8(b':');
                out.put_slice(escape(value).as_bytes());
            } else {
                out.put_slice(key.as_bytes());
                out.put_u8(b':');
                out.put_slice(value.as_bytes());
            }
            out.put_u8(EOL);
        }

        if !body.is_empty() && frame.get(headers::CONTENT_LENGTH).is_none() {
            out.put_slice(format!("{}:{}", headers::CONTENT_LENGTH, body.len()).as_bytes());
            out.put_u8(EOL);
        }

        out.put_u8(EOL);
        out.put_slice(body);
        out.put_u8(TERMINATOR);
        out.freeze()
    }
}

/// Incremental frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_bytes,
        }
    }

    /// Append bytes received from the transport
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held that do not yet form a complete frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete frame, if the buffer holds one.
    ///
    /// Bare EOLs between frames decode as [`Command::Heartbeat`] markers.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match self.buf.first() {
            None => return Ok(None),
            Some(&EOL) => {
                self.buf.advance(1);
                return Ok(Some(Frame::heartbeat()));
            }
            Some(&CR) => {
                return match self.buf.get(1) {
                    None => Ok(None),
                    Some(&EOL) => {
                        self.buf.advance(2);
                        Ok(Some(Frame::heartbeat()))
                    }
                    Some(_) => Err(ProtocolError::UnknownCommand("\\r".to_string())),
                };
            }
            Some(_) => {}
        }

        let Some((header_lines, body_start)) = self.split_header_block()? else {
            return Ok(None);
        };

        let (command, raw_headers) = parse_header_block(&self.buf[..header_lines])?;
        let mut frame = Frame::new(command);
        for (key, value) in raw_headers {
            frame = frame.header(key, value);
        }

        let (body_end, frame_end) = match frame.get(headers::CONTENT_LENGTH) {
            Some(raw) => {
                let length: usize = raw
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(raw.to_string()))?;
                let body_end = body_start
                    .checked_add(length)
                    .filter(|end| *end < self.max_frame_bytes)
                    .ok_or(ProtocolError::FrameTooLarge {
                        max: self.max_frame_bytes,
                    })?;
                if self.buf.len() < body_end + 1 {
                    return Ok(None);
                }
                if self.buf[body_end] != TERMINATOR {
                    return Err(ProtocolError::MissingTerminator);
                }
                (body_end, body_end + 1)
            }
            None => match memchr(TERMINATOR, &self.buf[body_start..]) {
                Some(offset) => (body_start + offset, body_start + offset + 1),
                None => {
                    self.check_size()?;
                    return Ok(None);
                }
            },
        };

        if frame_end > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                max: self.max_frame_bytes,
            });
        }

        let mut raw = self.buf.split_to(frame_end);
        raw.advance(body_start);
        raw.truncate(body_end - body_start);
        Ok(Some(frame.body(raw.freeze())))
    }

    /// Locate the blank line ending the header block.
    /// Returns (length of command+header lines, offset of the body).
    fn split_header_block(&self) -> Result<Option<(usize, usize)>, ProtocolError> {
        let mut line_start = 0;
        loop {
            let Some(offset) = memchr(EOL, &self.buf[line_start..]) else {
                self.check_size()?;
                return Ok(None);
            };
            let line_end = line_start + offset;
            let line = &self.buf[line_start..line_end];
            let is_blank = line.is_empty() || line == [CR].as_slice();
            if is_blank && line_start > 0 {
                return Ok(Some((line_start, line_end + 1)));
            }
            line_start = line_end + 1;
        }
    }

    fn check_size(&self) -> Result<(), ProtocolError> {
        if self.buf.len() > self.max_frame_bytes {
            Err(ProtocolError::FrameTooLarge {
                max: self.max_frame_bytes,
            })
        } else {
            Ok(())
        }
    }
}

fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn parse_header_block(block: &[u8]) -> Result<(Command, Vec<(String, String)>), ProtocolError> {
    let text = std::str::from_utf8(block).map_err(|_| ProtocolError::InvalidUtf8)?;
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty());

    let command_line = lines.next().unwrap_or_default();
    let command = Command::parse(command_line)
        .ok_or_else(|| ProtocolError::UnknownCommand(command_line.to_string()))?;

    let mut parsed = Vec::new();
    for line in lines {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            parsed.push((unescape(key)?, unescape(value)?));
        } else {
            parsed.push((key.to_string(), value.to_string()));
        }
    }
    Ok((command, parsed))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::MalformedHeader(raw.to_string())),
        }
    }
    Ok(out)
}
