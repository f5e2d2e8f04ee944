use super::error::InfrastructureError;
use crate::domain::image::RawImageInput;

// "data:image/png;base64,...." 形式を RawImageInput に変換する
pub fn parse_data_uri(uri: &str) -> Result<RawImageInput, InfrastructureError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| InfrastructureError::DecodingError("Invalid data URL: missing data: scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| InfrastructureError::DecodingError("Invalid data URL: missing comma".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| InfrastructureError::DecodingError("Invalid data URL: only base64 payloads are supported".to_string()))?;
    let bytes = base64::decode(payload.trim()).map_err(InfrastructureError::Base64DecodeError)?;
    let mime_type = if mime_type.is_empty() { "application/octet-stream" } else { mime_type };
    Ok(RawImageInput::new(bytes, mime_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_uri() {
        let base64_image = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";
        let input = parse_data_uri(&format!("data:image/png;base64,{}", base64_image)).unwrap();
        assert_eq!(input.mime_type(), "image/png");
        assert_eq!(&input.bytes()[1..4], b"PNG");
    }

    #[test]
    fn test_parse_data_uri_rejects_malformed_input() {
        assert!(matches!(parse_data_uri("https://example.com/a.png"), Err(InfrastructureError::DecodingError(_))));
        assert!(matches!(parse_data_uri("data:image/png;base64"), Err(InfrastructureError::DecodingError(_))));
        assert!(matches!(parse_data_uri("data:image/png,rawtext"), Err(InfrastructureError::DecodingError(_))));
        assert!(matches!(parse_data_uri("data:image/png;base64,@@@"), Err(InfrastructureError::Base64DecodeError(_))));
    }
}
