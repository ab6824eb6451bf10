/// Errors raised while decoding command output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid address: {0:?}")]
    Address(String),
    #[error("invalid cidr: {0:?}")]
    Cidr(String),
    #[error("invalid number: {0:?}")]
    Number(String),
    #[error("invalid fwmark: {0:?}")]
    FwMark(String),
    #[error("unknown rule action: {0:?}")]
    Action(String),
    #[error("malformed {what} line: {line:?}")]
    Line { what: &'static str, line: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for parsing.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn parse_u32(s: &str) -> Result<u32> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| Error::Number(s.to_string()))
}
