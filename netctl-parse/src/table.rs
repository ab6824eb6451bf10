use std::{convert::Infallible, fmt, str::FromStr};

/// A routing table, by well-known name or by number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Table {
    /// 255
    Local,
    /// 254
    Main,
    /// 253
    Default,
    /// Any other numeric table.
    Id(u32),
    /// A name from `/etc/iproute2/rt_tables`.
    Named(String),
}

impl Table {
    /// Maps the reserved ids to their names. Used when reading kernel output, never when
    /// writing: a numeric table is passed through as given.
    pub const fn from_id(id: u32) -> Self {
        match id {
            255 => Self::Local,
            254 => Self::Main,
            253 => Self::Default,
            id => Self::Id(id),
        }
    }
}

impl From<u32> for Table {
    fn from(id: u32) -> Self {
        Self::from_id(id)
    }
}

impl From<&str> for Table {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(table) => table,
            Err(never) => match never {},
        }
    }
}

impl FromStr for Table {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "local" => Self::Local,
            "main" => Self::Main,
            "default" => Self::Default,
            other => other.parse().map_or_else(|_| Self::Named(other.to_string()), Self::from_id),
        })
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Main => f.write_str("main"),
            Self::Default => f.write_str("default"),
            Self::Id(id) => write!(f, "{id}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}
