//! Helpers for `ip -j` output, where iproute2 prints some fields as numbers or names depending
//! on flags and on whether a name is known.

use serde::Deserialize;

use crate::{error::parse_u32, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumOrStr {
    Num(u64),
    Str(String),
}

impl NumOrStr {
    pub(crate) fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Str(s) => s,
        }
    }

    pub(crate) fn to_u32(&self) -> Result<u32> {
        match self {
            Self::Num(n) => {
                u32::try_from(*n).map_err(|_| crate::Error::Number(n.to_string()))
            }
            Self::Str(s) => parse_u32(s),
        }
    }
}

/// Decodes a JSON array of records, tolerating empty output.
pub(crate) fn records<T: serde::de::DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(output)?)
}
