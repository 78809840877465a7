use encoding_rs::Encoding;

use crate::error::ParserError;

/// Decode raw script bytes, preferring strict UTF-8.
///
/// Legacy engines ship Shift-JIS-family scripts alongside newer UTF-8 ones,
/// sometimes within the same game directory, so each document is resolved
/// independently. The fallback decode is permissive: undecodable sequences
/// become U+FFFD instead of aborting.
///
/// Returns the decoded text and the encoding that produced it; the same
/// encoding must be used to re-encode at export time.
pub fn resolve(data: &[u8], fallback: &'static Encoding) -> (String, &'static Encoding) {
    match std::str::from_utf8(data) {
        // WHY: std strict validation, not encoding_rs UTF_8.decode — the
        // latter strips a BOM, which would break byte-exact round-trips.
        Ok(text) => (text.to_string(), encoding_rs::UTF_8),
        Err(_) => {
            let (text, _had_errors) = fallback.decode_without_bom_handling(data);
            (text.into_owned(), fallback)
        }
    }
}

/// Decode with a known encoding, permissively.
pub fn decode_with(encoding: &'static Encoding, data: &[u8]) -> String {
    if encoding == encoding_rs::UTF_8 {
        // Invalid sequences were already ruled out at parse time; lossy
        // conversion keeps this path infallible anyway.
        return String::from_utf8_lossy(data).into_owned();
    }
    let (text, _had_errors) = encoding.decode_without_bom_handling(data);
    text.into_owned()
}

/// Encode text with a known encoding.
/// Unencodable characters are replaced rather than raising, matching the
/// permissive decode policy.
pub fn encode_with(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    if encoding == encoding_rs::UTF_8 {
        return text.as_bytes().to_vec();
    }
    let (bytes, _, _had_errors) = encoding.encode(text);
    bytes.into_owned()
}

/// Resolve a recorded encoding tag (e.g. "UTF-8", "Shift_JIS") back to a codec.
pub fn for_tag(tag: &str) -> Result<&'static Encoding, ParserError> {
    Encoding::for_label(tag.as_bytes()).ok_or_else(|| ParserError::UnknownEncoding(tag.to_string()))
}
