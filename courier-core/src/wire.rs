//! Wire codec: request framing and response decoding. All multi-byte
//! integers are little-endian. Lengths in responses are server-controlled
//! and validated before any record is produced.

use crate::identity::{PeerId, PeerName};
use crate::protocol::{
    AwaitingMessageRecord, DirectoryRecord, Request, ResponsePayload, CLIENT_VERSION,
    DIRECTORY_RECORD_LEN, MESSAGE_RECORD_HEADER_LEN, MESSAGE_SENT_PAYLOAD_LEN,
    MESSAGE_SENT_RESPONSE, NAME_SLOT_LEN, PEER_ID_LEN, PUBLIC_KEY_LEN, PUBLIC_KEY_PAYLOAD_LEN,
    QUEUED_MESSAGES_RESPONSE, REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN, SERVER_ERROR_RESPONSE,
    SIGNUP_SUCCESS_RESPONSE, USER_LIST_RESPONSE, USER_PUBLIC_KEY_RESPONSE,
};

/// Error decoding server-supplied bytes or encoding an oversized request.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated data: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("malformed {what} payload ({len} bytes)")]
    Malformed { what: &'static str, len: usize },
    #[error("request payload exceeds the addressable length")]
    PayloadTooLarge,
}

/// Decoded fixed response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub server_version: u8,
    pub code: u16,
    pub payload_size: u32,
}

/// Encode a full request frame:
/// `client_id[16] | version:u8 | code:u16 | payload_len:u32 | payload`.
pub fn encode_request(client_id: PeerId, request: &Request) -> Result<Vec<u8>, ProtocolError> {
    let payload = request.payload();
    if payload.len() > u32::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge);
    }
    let mut out = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len());
    out.extend_from_slice(client_id.as_bytes());
    out.push(CLIENT_VERSION);
    out.extend_from_slice(&request.code().to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode the fixed 7-byte response header.
pub fn decode_response_header(bytes: &[u8]) -> Result<ResponseHeader, ProtocolError> {
    if bytes.len() < RESPONSE_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            expected: RESPONSE_HEADER_LEN,
            got: bytes.len(),
        });
    }
    Ok(ResponseHeader {
        server_version: bytes[0],
        code: u16_at(bytes, 1),
        payload_size: u32_at(bytes, 3),
    })
}

/// Decode a response payload according to the header code. Unknown codes
/// decode as [`ResponsePayload::ServerError`] rather than failing: the code
/// space is server-controlled and a new code is a server-side condition.
pub fn decode_payload(
    header: &ResponseHeader,
    bytes: &[u8],
) -> Result<ResponsePayload, ProtocolError> {
    match header.code {
        SIGNUP_SUCCESS_RESPONSE => decode_signup_success(bytes),
        USER_LIST_RESPONSE => decode_peer_list(bytes),
        USER_PUBLIC_KEY_RESPONSE => decode_peer_public_key(bytes),
        MESSAGE_SENT_RESPONSE => decode_message_sent(bytes),
        QUEUED_MESSAGES_RESPONSE => decode_awaiting_messages(bytes),
        SERVER_ERROR_RESPONSE => Ok(ResponsePayload::ServerError),
        code => {
            tracing::warn!(code, "unrecognized response code, treating as server error");
            Ok(ResponsePayload::ServerError)
        }
    }
}

fn decode_signup_success(bytes: &[u8]) -> Result<ResponsePayload, ProtocolError> {
    if bytes.len() != PEER_ID_LEN {
        return Err(ProtocolError::Malformed {
            what: "signup success",
            len: bytes.len(),
        });
    }
    Ok(ResponsePayload::SignupSuccess {
        client_id: peer_id_at(bytes, 0),
    })
}

fn decode_peer_list(bytes: &[u8]) -> Result<ResponsePayload, ProtocolError> {
    // Length must divide exactly; no partial record list is ever produced.
    if bytes.len() % DIRECTORY_RECORD_LEN != 0 {
        return Err(ProtocolError::Malformed {
            what: "peer list",
            len: bytes.len(),
        });
    }
    let mut records = Vec::with_capacity(bytes.len() / DIRECTORY_RECORD_LEN);
    for chunk in bytes.chunks_exact(DIRECTORY_RECORD_LEN) {
        let mut slot = [0u8; NAME_SLOT_LEN];
        slot.copy_from_slice(&chunk[PEER_ID_LEN..]);
        records.push(DirectoryRecord {
            id: peer_id_at(chunk, 0),
            name: PeerName::from_wire(&slot),
        });
    }
    Ok(ResponsePayload::PeerList(records))
}

fn decode_peer_public_key(bytes: &[u8]) -> Result<ResponsePayload, ProtocolError> {
    if bytes.len() != PUBLIC_KEY_PAYLOAD_LEN {
        return Err(ProtocolError::Malformed {
            what: "peer public key",
            len: bytes.len(),
        });
    }
    let mut public_key = [0u8; PUBLIC_KEY_LEN];
    public_key.copy_from_slice(&bytes[PEER_ID_LEN..]);
    Ok(ResponsePayload::PeerPublicKey {
        client_id: peer_id_at(bytes, 0),
        public_key,
    })
}

fn decode_message_sent(bytes: &[u8]) -> Result<ResponsePayload, ProtocolError> {
    if bytes.len() != MESSAGE_SENT_PAYLOAD_LEN {
        return Err(ProtocolError::Malformed {
            what: "message sent",
            len: bytes.len(),
        });
    }
    Ok(ResponsePayload::MessageSent {
        client_id: peer_id_at(bytes, 0),
        message_id: u32_at(bytes, PEER_ID_LEN),
    })
}

/// Records are packed back-to-back with no count; parsing consumes until the
/// payload is exhausted. A record whose declared content length would overrun
/// the remaining bytes fails the whole decode.
fn decode_awaiting_messages(bytes: &[u8]) -> Result<ResponsePayload, ProtocolError> {
    let mut records = Vec::new();
    let mut off = 0;
    while off < bytes.len() {
        let remaining = bytes.len() - off;
        if remaining < MESSAGE_RECORD_HEADER_LEN {
            return Err(ProtocolError::Malformed {
                what: "queued message record",
                len: remaining,
            });
        }
        let content_len = u32_at(bytes, off + PEER_ID_LEN + 5) as usize;
        if content_len > remaining - MESSAGE_RECORD_HEADER_LEN {
            return Err(ProtocolError::Malformed {
                what: "queued message content",
                len: content_len,
            });
        }
        let content_start = off + MESSAGE_RECORD_HEADER_LEN;
        records.push(AwaitingMessageRecord {
            sender: peer_id_at(bytes, off),
            message_id: u32_at(bytes, off + PEER_ID_LEN),
            kind: bytes[off + PEER_ID_LEN + 4],
            content: bytes[content_start..content_start + content_len].to_vec(),
        });
        off = content_start + content_len;
    }
    Ok(ResponsePayload::AwaitingMessages(records))
}

// Field extraction helpers. Callers validate bounds first.

fn u16_at(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([bytes[off], bytes[off + 1]])
}

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([
        bytes[off],
        bytes[off + 1],
        bytes[off + 2],
        bytes[off + 3],
    ])
}

fn peer_id_at(bytes: &[u8], off: usize) -> PeerId {
    let mut id = [0u8; PEER_ID_LEN];
    id.copy_from_slice(&bytes[off..off + PEER_ID_LEN]);
    PeerId::from_bytes(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        MessageKind, MESSAGE_SENT_RESPONSE, QUEUED_MESSAGES_REQUEST, SERVER_ERROR_RESPONSE,
    };

    fn header(code: u16, payload_size: u32) -> ResponseHeader {
        ResponseHeader {
            server_version: 2,
            code,
            payload_size,
        }
    }

    fn record_bytes(sender: [u8; 16], message_id: u32, kind: u8, content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&sender);
        out.extend_from_slice(&message_id.to_le_bytes());
        out.push(kind);
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(content);
        out
    }

    #[test]
    fn request_frame_layout() {
        let id = PeerId::from_bytes([0x11; 16]);
        let frame = encode_request(id, &Request::QueuedMessages).unwrap();
        assert_eq!(frame.len(), REQUEST_HEADER_LEN);
        assert_eq!(&frame[..16], &[0x11; 16]);
        assert_eq!(frame[16], CLIENT_VERSION);
        assert_eq!(u16_at(&frame, 17), QUEUED_MESSAGES_REQUEST);
        assert_eq!(u32_at(&frame, 19), 0);
    }

    #[test]
    fn request_frame_carries_payload_len() {
        let id = PeerId::from_bytes([1u8; 16]);
        let req = Request::MessageUser {
            target: PeerId::from_bytes([2u8; 16]),
            kind: MessageKind::Regular,
            content: vec![0xFF; 10],
        };
        let frame = encode_request(id, &req).unwrap();
        let declared = u32_at(&frame, 19) as usize;
        assert_eq!(declared, frame.len() - REQUEST_HEADER_LEN);
        assert_eq!(declared, 16 + 1 + 4 + 10);
    }

    #[test]
    fn header_roundtrip() {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(&2001u16.to_le_bytes());
        bytes.extend_from_slice(&542u32.to_le_bytes());
        let h = decode_response_header(&bytes).unwrap();
        assert_eq!(h.server_version, 3);
        assert_eq!(h.code, 2001);
        assert_eq!(h.payload_size, 542);
    }

    #[test]
    fn header_truncated() {
        assert!(matches!(
            decode_response_header(&[1, 2, 3]),
            Err(ProtocolError::Truncated { expected: 7, got: 3 })
        ));
        assert!(matches!(
            decode_response_header(&[]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn signup_success_roundtrip() {
        let payload = [0xAA; 16];
        let decoded = decode_payload(&header(SIGNUP_SUCCESS_RESPONSE, 16), &payload).unwrap();
        match decoded {
            ResponsePayload::SignupSuccess { client_id } => {
                assert_eq!(client_id, PeerId::from_bytes([0xAA; 16]));
            }
            other => panic!("expected SignupSuccess, got {}", other.kind_name()),
        }
    }

    #[test]
    fn signup_success_wrong_size() {
        assert!(matches!(
            decode_payload(&header(SIGNUP_SUCCESS_RESPONSE, 15), &[0u8; 15]),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn peer_list_two_records() {
        let mut payload = Vec::new();
        for (byte, name) in [(1u8, "alice"), (2u8, "bob")] {
            payload.extend_from_slice(&[byte; 16]);
            let mut slot = [0u8; NAME_SLOT_LEN];
            slot[..name.len()].copy_from_slice(name.as_bytes());
            payload.extend_from_slice(&slot);
        }
        let decoded =
            decode_payload(&header(USER_LIST_RESPONSE, payload.len() as u32), &payload).unwrap();
        match decoded {
            ResponsePayload::PeerList(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].id, PeerId::from_bytes([1u8; 16]));
                assert_eq!(records[0].name.as_str(), "alice");
                assert_eq!(records[1].name.as_str(), "bob");
            }
            other => panic!("expected PeerList, got {}", other.kind_name()),
        }
    }

    #[test]
    fn peer_list_rejects_non_multiple_lengths() {
        for len in [1, 270, 272, 271 * 2 - 1, 271 * 2 + 5] {
            let payload = vec![0u8; len];
            assert!(
                matches!(
                    decode_payload(&header(USER_LIST_RESPONSE, len as u32), &payload),
                    Err(ProtocolError::Malformed { .. })
                ),
                "length {} should be rejected",
                len
            );
        }
    }

    #[test]
    fn peer_list_empty_is_valid() {
        let decoded = decode_payload(&header(USER_LIST_RESPONSE, 0), &[]).unwrap();
        assert!(matches!(decoded, ResponsePayload::PeerList(r) if r.is_empty()));
    }

    #[test]
    fn public_key_exact_size_only() {
        let mut payload = vec![5u8; 16];
        payload.extend_from_slice(&[6u8; PUBLIC_KEY_LEN]);
        let decoded = decode_payload(
            &header(USER_PUBLIC_KEY_RESPONSE, payload.len() as u32),
            &payload,
        )
        .unwrap();
        match decoded {
            ResponsePayload::PeerPublicKey {
                client_id,
                public_key,
            } => {
                assert_eq!(client_id, PeerId::from_bytes([5u8; 16]));
                assert_eq!(public_key, [6u8; PUBLIC_KEY_LEN]);
            }
            other => panic!("expected PeerPublicKey, got {}", other.kind_name()),
        }
        assert!(matches!(
            decode_payload(&header(USER_PUBLIC_KEY_RESPONSE, 175), &vec![0u8; 175]),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn message_sent_roundtrip() {
        let mut payload = vec![9u8; 16];
        payload.extend_from_slice(&77u32.to_le_bytes());
        let decoded = decode_payload(&header(MESSAGE_SENT_RESPONSE, 20), &payload).unwrap();
        match decoded {
            ResponsePayload::MessageSent {
                client_id,
                message_id,
            } => {
                assert_eq!(client_id, PeerId::from_bytes([9u8; 16]));
                assert_eq!(message_id, 77);
            }
            other => panic!("expected MessageSent, got {}", other.kind_name()),
        }
    }

    #[test]
    fn awaiting_messages_two_back_to_back() {
        let mut payload = record_bytes([0xEE; 16], 1, 3, b"ciphertext");
        payload.extend_from_slice(&record_bytes([0xEE; 16], 2, 1, b""));
        let decoded = decode_payload(
            &header(QUEUED_MESSAGES_RESPONSE, payload.len() as u32),
            &payload,
        )
        .unwrap();
        match decoded {
            ResponsePayload::AwaitingMessages(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].message_id, 1);
                assert_eq!(records[0].kind, 3);
                assert_eq!(records[0].content, b"ciphertext");
                assert_eq!(records[1].message_id, 2);
                assert_eq!(records[1].kind, 1);
                assert!(records[1].content.is_empty());
            }
            other => panic!("expected AwaitingMessages, got {}", other.kind_name()),
        }
    }

    #[test]
    fn awaiting_messages_content_overrun_fails() {
        // Declared content length exceeds what remains: must fail, never over-read.
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1u8; 16]);
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(3);
        payload.extend_from_slice(&100u32.to_le_bytes()); // only 4 bytes follow
        payload.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            decode_payload(
                &header(QUEUED_MESSAGES_RESPONSE, payload.len() as u32),
                &payload
            ),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn awaiting_messages_truncated_record_header_fails() {
        let mut payload = record_bytes([1u8; 16], 1, 1, b"");
        payload.extend_from_slice(&[0u8; 10]); // partial second record
        assert!(matches!(
            decode_payload(
                &header(QUEUED_MESSAGES_RESPONSE, payload.len() as u32),
                &payload
            ),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn awaiting_messages_empty_batch() {
        let decoded = decode_payload(&header(QUEUED_MESSAGES_RESPONSE, 0), &[]).unwrap();
        assert!(matches!(decoded, ResponsePayload::AwaitingMessages(r) if r.is_empty()));
    }

    #[test]
    fn content_len_overflow_does_not_panic() {
        // u32::MAX content length with a few trailing bytes: the subtraction
        // guard must catch it on 32-bit-sized arithmetic too.
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1u8; 16]);
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(3);
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        payload.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            decode_payload(
                &header(QUEUED_MESSAGES_RESPONSE, payload.len() as u32),
                &payload
            ),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn server_error_and_unknown_codes() {
        assert!(matches!(
            decode_payload(&header(SERVER_ERROR_RESPONSE, 0), &[]).unwrap(),
            ResponsePayload::ServerError
        ));
        // Unknown code is surfaced as a server error, not a decode failure.
        assert!(matches!(
            decode_payload(&header(4242, 3), &[1, 2, 3]).unwrap(),
            ResponsePayload::ServerError
        ));
    }
}
