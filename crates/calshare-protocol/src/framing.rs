//! Length-prefixed message framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```
//!
//! These helpers operate on complete byte buffers; the daemon's connection
//! type does the equivalent incremental reads/writes on the socket itself.

use serde::{Serialize, de::DeserializeOwned};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Encodes a message into a framed byte buffer ready for transmission.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    let len = json.len() as u32;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(4 + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes a message from a complete framed byte buffer.
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    if data.len() < 4 {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4,
            received: data.len(),
        });
    }

    let len_bytes: [u8; 4] = data[0..4].try_into().expect("slice length checked above");
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: len as u32,
            max: MAX_MESSAGE_SIZE,
        });
    }

    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }

    if data.len() < 4 + len {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4 + len,
            received: data.len(),
        });
    }

    let message = serde_json::from_slice(&data[4..4 + len])?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandRequest, Envelope, Reply};
    use calshare_core::ChatId;

    fn ping_request() -> Envelope<CommandRequest> {
        Envelope::request(
            "req-1",
            CommandRequest::new(ChatId(7), "ping", Vec::new()),
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let envelope = ping_request();
        let bytes = encode_message(&envelope).unwrap();

        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded: Envelope<CommandRequest> = decode_message(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn reply_roundtrip() {
        let envelope = Envelope::response("req-1", Reply::Pong);
        let bytes = encode_message(&envelope).unwrap();
        let decoded: Envelope<Reply> = decode_message(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn decode_incomplete_length() {
        let result: ProtocolResult<Envelope<Reply>> = decode_message(&[0, 0]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteMessage { expected: 4, .. })
        ));
    }

    #[test]
    fn decode_incomplete_payload() {
        // Claim 64 bytes but provide 8.
        let mut data = vec![0, 0, 0, 64];
        data.extend_from_slice(&[0u8; 8]);

        let result: ProtocolResult<Envelope<Reply>> = decode_message(&data);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteMessage { .. })
        ));
    }

    #[test]
    fn decode_empty_message() {
        let data = 0u32.to_be_bytes().to_vec();
        let result: ProtocolResult<Envelope<Reply>> = decode_message(&data);
        assert!(matches!(result, Err(ProtocolError::EmptyMessage)));
    }

    #[test]
    fn decode_oversized_message() {
        let data = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let result: ProtocolResult<Envelope<Reply>> = decode_message(&data);
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }
}
