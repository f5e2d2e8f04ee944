use super::budget::Quality;

pub const JPEG_MIME_TYPE: &str = "image/jpeg";

// ファイル選択時に作られ、Normalizer に一度だけ渡される
#[derive(Debug, Clone)]
pub struct RawImageInput {
    bytes: Vec<u8>,
    mime_type: String,
}

impl RawImageInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub encoded_byte_size: usize,
    pub quality: Quality,
}

impl NormalizedImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32, quality: Quality) -> Self {
        Self {
            encoded_byte_size: data.len(),
            data,
            mime_type: JPEG_MIME_TYPE,
            width,
            height,
            quality,
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, base64::encode(&self.data))
    }
}

/// Byte length of the payload behind a base64 data URI, without decoding it.
pub fn data_uri_payload_len(data_uri: &str) -> Option<usize> {
    let (_, payload) = data_uri.split_once(',')?;
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
    (payload.len() * 3 / 4).checked_sub(padding)
}
