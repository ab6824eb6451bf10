use std::{convert::Infallible, fmt, str::FromStr};

/// Reachability domain of an address or route.
///
/// Routes call the widest scope `universe`, addresses call it `global`. Both spellings parse to
/// [`Scope::Global`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    #[default]
    Global,
    Site,
    Link,
    Host,
    Nowhere,
    /// A scope without a well-known name.
    Other(u8),
}

impl Scope {
    /// Decodes a numeric `RT_SCOPE_*` value. Unknown codes are global.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Global,
            200 => Self::Site,
            253 => Self::Link,
            254 => Self::Host,
            255 => Self::Nowhere,
            other => Self::Other(other),
        }
    }
}

impl FromStr for Scope {
    type Err = Infallible;

    /// iproute2 prints either a known name or the raw number. Anything else is taken as global.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "global" | "universe" => Self::Global,
            "site" => Self::Site,
            "link" => Self::Link,
            "host" => Self::Host,
            "nowhere" => Self::Nowhere,
            other => other.parse().map_or(Self::Global, Self::from_code),
        })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Site => f.write_str("site"),
            Self::Link => f.write_str("link"),
            Self::Host => f.write_str("host"),
            Self::Nowhere => f.write_str("nowhere"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}
