use thiserror::Error;

/// Prefix that marks a file-transfer header on the wire.
pub const FILE_SENTINEL: &str = "FILE|";

/// Prefix that marks a display-name announcement.
pub const NAME_SENTINEL: &str = "_NAME:";

/// Parsed file-transfer header: `FILE|<name>|<len>|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    pub len: u64,
}

/// Errors produced while parsing a file-transfer header
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("missing FILE| sentinel")]
    MissingSentinel,

    #[error("header has fewer than 3 |-separated fields")]
    TruncatedHeader,

    #[error("empty file name field")]
    EmptyFileName,

    #[error("file name field is not valid UTF-8")]
    InvalidFileName,

    #[error("length field {0:?} is not a non-negative integer")]
    BadLength(String),
}

/// True iff the chunk starts with the file-transfer sentinel.
pub fn is_file_header(chunk: &[u8]) -> bool {
    chunk.starts_with(FILE_SENTINEL.as_bytes())
}

/// Split a raw read chunk into a parsed file header and whatever payload
/// bytes arrived coalesced into the same read. The header occupies the
/// chunk up to and including the third `|`; everything after it is the
/// start of the declared payload.
pub fn split_file_header(chunk: &[u8]) -> Result<(FileHeader, &[u8]), CodecError> {
    if !is_file_header(chunk) {
        return Err(CodecError::MissingSentinel);
    }
    let body = &chunk[FILE_SENTINEL.len()..];

    let name_end = body
        .iter()
        .position(|&b| b == b'|')
        .ok_or(CodecError::TruncatedHeader)?;
    let after_name = &body[name_end + 1..];
    let len_end = after_name
        .iter()
        .position(|&b| b == b'|')
        .ok_or(CodecError::TruncatedHeader)?;

    if name_end == 0 {
        return Err(CodecError::EmptyFileName);
    }
    let name = std::str::from_utf8(&body[..name_end])
        .map_err(|_| CodecError::InvalidFileName)?
        .to_string();

    let len_field = &after_name[..len_end];
    let len = std::str::from_utf8(len_field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| CodecError::BadLength(String::from_utf8_lossy(len_field).into_owned()))?;

    Ok((FileHeader { name, len }, &after_name[len_end + 1..]))
}

/// Parse a file header from decoded text, discarding any trailing bytes.
pub fn parse_file_header(text: &str) -> Result<FileHeader, CodecError> {
    split_file_header(text.as_bytes()).map(|(header, _)| header)
}

/// Render a file header block for the send path.
pub fn encode_file_header(name: &str, len: u64) -> String {
    format!("{FILE_SENTINEL}{name}|{len}|")
}

/// True iff the text is a display-name announcement.
pub fn is_name_announcement(text: &str) -> bool {
    text.starts_with(NAME_SENTINEL)
}

/// Extract the announced display name, if the text is an announcement.
pub fn parse_announcement(text: &str) -> Option<&str> {
    text.strip_prefix(NAME_SENTINEL)
}

/// Render a display-name announcement.
pub fn encode_announcement(name: &str) -> String {
    format!("{NAME_SENTINEL}{name}")
}
