use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    schema::{JSONRPCMessage, INVALID_REQUEST, PARSE_ERROR},
};

/// One decoded line of the stdio channel.
#[derive(Debug)]
pub(crate) enum Frame {
    Message(JSONRPCMessage),
    /// A line that could not be turned into a message. The loop answers it
    /// with a JSON-RPC error and keeps reading.
    Invalid { code: i32, message: String },
}

/// Newline-delimited JSON-RPC codec.
pub(crate) struct JsonRpcCodec;

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Error = Error;
    type Item = Frame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(n) = src.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };

            let line = src.split_to(n + 1);
            let json_bytes = trim_line(&line[..n]);
            if json_bytes.is_empty() {
                continue;
            }

            debug!("Decoding JSON-RPC message: {:?}", std::str::from_utf8(json_bytes));

            let value: serde_json::Value = match serde_json::from_slice(json_bytes) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Failed to parse JSON-RPC message: {}", e);
                    return Ok(Some(Frame::Invalid {
                        code: PARSE_ERROR,
                        message: format!("Parse error: {e}"),
                    }));
                }
            };

            return Ok(Some(match serde_json::from_value::<JSONRPCMessage>(value) {
                Ok(message) => Frame::Message(message),
                Err(e) => Frame::Invalid {
                    code: INVALID_REQUEST,
                    message: format!("Invalid Request: {e}"),
                },
            }));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // A final line without a trailing newline.
        if trim_line(src).is_empty() {
            src.clear();
            return Ok(None);
        }
        src.put_u8(b'\n');
        self.decode(src)
    }
}

impl Encoder<JSONRPCMessage> for JsonRpcCodec {
    type Error = Error;

    fn encode(&mut self, item: JSONRPCMessage, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        debug!("Encoded JSON-RPC message: {:?}", std::str::from_utf8(&json));
        Ok(())
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{JSONRPCRequest, RequestId};

    #[test]
    fn test_encode_decode_request() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::new();

        let request = JSONRPCRequest::new(RequestId::String("test-1".to_string()), "tools/list", None);
        codec.encode(JSONRPCMessage::Request(request), &mut buf).unwrap();

        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Message(JSONRPCMessage::Request(req))) => {
                assert_eq!(req.id, RequestId::String("test-1".to_string()));
                assert_eq!(req.method, "tools/list");
            }
            other => panic!("Expected request message, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bad_lines_do_not_stop_decoding() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::from(
            "\r\n{not json}\n[1,2]\n{\"jsonrpc\":\"2.0\",\"id\":null,\"method\":\"ping\"}\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\r\n",
        );

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Invalid { code: PARSE_ERROR, .. })
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Invalid { code: INVALID_REQUEST, .. })
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Invalid { code: INVALID_REQUEST, .. })
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Message(JSONRPCMessage::Notification(_)))
        ));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
