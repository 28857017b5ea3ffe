//! Binary payload frames.
//!
//! Image bytes pushed by `SaveImageWebsocket` arrive as binary frames
//! prefixed with an 8-byte header: a big-endian `u32` event kind
//! followed by a big-endian `u32` image format. The header is stripped
//! and everything after it is the artifact.

use atelier_core::artifact::ImageFormat;

/// Size of the binary frame header in bytes.
pub const PAYLOAD_HEADER_LEN: usize = 8;

/// Header kinds that carry image bytes (`PREVIEW_IMAGE`,
/// `UNENCODED_PREVIEW_IMAGE`). Kind 3 is text from custom nodes.
const IMAGE_KINDS: [u32; 2] = [1, 2];

/// A decoded binary frame. Carries no job id.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Event kind from the header (1 = preview image).
    pub kind: u32,
    pub format: ImageFormat,
    /// Artifact bytes with the header removed.
    pub data: Vec<u8>,
}

/// Reasons a binary frame cannot be used.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("binary frame of {0} bytes is shorter than the {PAYLOAD_HEADER_LEN}-byte header")]
    TooShort(usize),

    #[error("binary frame has a header but no body")]
    EmptyBody,

    #[error("binary frame kind {0} does not carry an image")]
    UnsupportedKind(u32),
}

/// Strip the header from a binary frame. Non-image kinds are rejected.
pub fn decode_payload(mut bytes: Vec<u8>) -> Result<Payload, FrameError> {
    if bytes.len() < PAYLOAD_HEADER_LEN {
        return Err(FrameError::TooShort(bytes.len()));
    }
    if bytes.len() == PAYLOAD_HEADER_LEN {
        return Err(FrameError::EmptyBody);
    }

    let kind = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if !IMAGE_KINDS.contains(&kind) {
        return Err(FrameError::UnsupportedKind(kind));
    }
    let format = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let data = bytes.split_off(PAYLOAD_HEADER_LEN);

    Ok(Payload {
        kind,
        format: ImageFormat::from_code(format),
        data,
    })
}

/// Build a binary frame the way ComfyUI does. Used by tests and mocks.
pub fn encode_payload(kind: u32, format: u32, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(PAYLOAD_HEADER_LEN + body.len());
    frame.extend_from_slice(&kind.to_be_bytes());
    frame.extend_from_slice(&format.to_be_bytes());
    frame.extend_from_slice(body);
    frame
}
