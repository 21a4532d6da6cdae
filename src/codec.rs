use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error};

use crate::{
    error::{Error, Result},
    schema::JSONRPCMessage,
};

/// Frames larger than this are rejected rather than buffered forever.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Newline-delimited JSON-RPC codec.
pub struct JsonRpcCodec {
    max_frame_length: usize,
    // Bytes of the current partial frame already scanned for a newline.
    scanned: usize,
}

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            scanned: 0,
        }
    }

    fn parse(line: &[u8]) -> Result<JSONRPCMessage> {
        debug!("Decoding JSON-RPC frame: {:?}", std::str::from_utf8(line));

        serde_json::from_slice(line).map_err(|e| {
            error!("Failed to parse JSON-RPC frame: {}", e);
            match std::str::from_utf8(line) {
                Ok(text) => Error::InvalidMessageFormat {
                    message: format!("Invalid JSON: {e} (content: {text})"),
                },
                Err(_) => Error::InvalidMessageFormat {
                    message: format!("Invalid JSON: {e} (non-UTF8 content)"),
                },
            }
        })
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Error = Error;
    type Item = JSONRPCMessage;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                if src.len() > self.max_frame_length {
                    return Err(Error::InvalidMessageFormat {
                        message: format!(
                            "frame exceeds {} bytes without a delimiter",
                            self.max_frame_length
                        ),
                    });
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let line = src.split_to(end + 1);
            let line = trim_line(&line[..end]);

            // Blank lines between frames are tolerated
            if line.is_empty() {
                continue;
            }
            return Self::parse(line).map(Some);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        self.scanned = 0;
        if src.is_empty() {
            return Ok(None);
        }

        // A final frame without its trailing newline
        let rest = src.split_to(src.len());
        let line = trim_line(&rest);
        if line.is_empty() {
            return Ok(None);
        }
        Self::parse(line).map(Some)
    }
}

impl Encoder<JSONRPCMessage> for JsonRpcCodec {
    type Error = Error;

    fn encode(&mut self, item: JSONRPCMessage, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        debug!("Encoded JSON-RPC frame: {:?}", std::str::from_utf8(&json));
        Ok(())
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}
