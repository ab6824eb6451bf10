//! Policy routing rules and their canonical form.
//!
//! Rules come from three places: callers building a [`RuleSpec`], `ip rule show` text and
//! `ip -j rule show` records. All of them go through [`RuleSpec::canonicalize`] so that rules
//! from different sources compare equal when they select the same traffic:
//!
//! - a missing or `all` source or destination becomes the family's zero network,
//! - `lookup` and `table` are the same key,
//! - fwmarks are normalized to `0x<mark>/0x<mask>`, the mask defaulting to `0xffffffff`,
//! - the action defaults to `unicast`,
//! - the reserved table ids resolve to `local`, `main` and `default`.
//!
//! Priority is kept out of [`RuleFields`], so callers can tell "same rule" from "same rule at
//! the same priority".

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::{error::parse_u32, json::NumOrStr, Error, IpVersion, Result, Table};

/// What a rule does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RuleAction {
    #[default]
    Unicast,
    Goto,
    Nop,
    Blackhole,
    Unreachable,
    Prohibit,
}

impl RuleAction {
    /// Decodes an `FR_ACT_*` value.
    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            1 => Self::Unicast,
            2 => Self::Goto,
            3 => Self::Nop,
            6 => Self::Blackhole,
            7 => Self::Unreachable,
            8 => Self::Prohibit,
            other => return Err(Error::Action(other.to_string())),
        })
    }

    /// The keyword iproute2 uses for this action.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unicast => "unicast",
            Self::Goto => "goto",
            Self::Nop => "nop",
            Self::Blackhole => "blackhole",
            Self::Unreachable => "unreachable",
            Self::Prohibit => "prohibit",
        }
    }
}

impl FromStr for RuleAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "unicast" | "to_tbl" => Self::Unicast,
            "goto" => Self::Goto,
            "nop" => Self::Nop,
            "blackhole" => Self::Blackhole,
            "unreachable" => Self::Unreachable,
            "prohibit" => Self::Prohibit,
            other => {
                let code = parse_u32(other).map_err(|_| Error::Action(other.to_string()))?;
                Self::from_code(code)?
            }
        })
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A firewall mark and mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FwMark {
    /// Mark value.
    pub mark: u32,
    /// Bits of the mark that are compared.
    pub mask: u32,
}

impl FwMark {
    /// Compares every bit.
    pub const FULL_MASK: u32 = 0xffff_ffff;

    /// A mark compared on every bit.
    pub const fn new(mark: u32) -> Self {
        Self { mark, mask: Self::FULL_MASK }
    }

    /// A mark compared on the bits of `mask`.
    pub const fn with_mask(mark: u32, mask: u32) -> Self {
        Self { mark, mask }
    }
}

impl fmt::Display for FwMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{:#x}", self.mark, self.mask)
    }
}

impl FromStr for FwMark {
    type Err = Error;

    /// Accepts `mark` or `mark/mask`, each decimal or `0x` hex.
    fn from_str(s: &str) -> Result<Self> {
        let number = |n: &str| parse_u32(n).map_err(|_| Error::FwMark(s.to_string()));
        match s.split_once('/') {
            Some((mark, mask)) => Ok(Self::with_mask(number(mark)?, number(mask)?)),
            None => Ok(Self::new(number(s)?)),
        }
    }
}

/// Values accepted as a fwmark: an integer, a `"mark[/mask]"` string or a `(mark, mask)` pair.
pub trait IntoFwMark {
    /// Converts into a mark and mask.
    fn into_fwmark(self) -> Result<FwMark>;
}

impl IntoFwMark for FwMark {
    fn into_fwmark(self) -> Result<FwMark> {
        Ok(self)
    }
}

impl IntoFwMark for u32 {
    fn into_fwmark(self) -> Result<FwMark> {
        Ok(FwMark::new(self))
    }
}

impl IntoFwMark for (u32, u32) {
    fn into_fwmark(self) -> Result<FwMark> {
        Ok(FwMark::with_mask(self.0, self.1))
    }
}

impl IntoFwMark for &str {
    fn into_fwmark(self) -> Result<FwMark> {
        self.parse()
    }
}

impl IntoFwMark for String {
    fn into_fwmark(self) -> Result<FwMark> {
        self.parse()
    }
}

/// The fields that decide which traffic a rule selects and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleFields {
    /// Source selector, `from`.
    pub from: String,
    /// Destination selector, `to`.
    pub to: Option<String>,
    /// Table consulted on a match.
    pub table: Option<Table>,
    /// Firewall mark selector.
    pub fwmark: Option<FwMark>,
    /// Incoming interface selector.
    pub iif: Option<String>,
    /// Outgoing interface selector.
    pub oif: Option<String>,
    /// What happens on a match.
    pub action: RuleAction,
}

/// A canonical policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    /// Evaluation order, lower first.
    pub priority: Option<u32>,
    /// Everything except the priority.
    pub fields: RuleFields,
}

impl Rule {
    /// Whether both rules select the same traffic, regardless of priority.
    pub fn same_as(&self, other: &Self) -> bool {
        self.fields == other.fields
    }

    /// Arguments for `ip rule add`/`ip rule del`.
    pub fn to_args(&self) -> Vec<String> {
        let fields = &self.fields;
        let mut args = vec!["from".to_string(), fields.from.clone()];

        if let Some(ref to) = fields.to {
            args.extend(["to".to_string(), to.clone()]);
        }
        if let Some(priority) = self.priority {
            args.extend(["priority".to_string(), priority.to_string()]);
        }
        if let Some(ref table) = fields.table {
            args.extend(["table".to_string(), table.to_string()]);
        }
        if let Some(fwmark) = fields.fwmark {
            args.extend(["fwmark".to_string(), fwmark.to_string()]);
        }
        if let Some(ref iif) = fields.iif {
            args.extend(["iif".to_string(), iif.clone()]);
        }
        if let Some(ref oif) = fields.oif {
            args.extend(["oif".to_string(), oif.clone()]);
        }
        args.extend(["type".to_string(), fields.action.to_string()]);

        args
    }
}

/// A possibly partial rule, as given by a caller or decoded from kernel output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSpec {
    priority: Option<u32>,
    from: Option<String>,
    to: Option<String>,
    table: Option<Table>,
    fwmark: Option<FwMark>,
    iif: Option<String>,
    oif: Option<String>,
    action: Option<RuleAction>,
}

impl RuleSpec {
    /// An empty spec. Canonicalization fills in the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Source selector: a CIDR, an address or `all`.
    pub fn src(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Destination selector: a CIDR, an address or `all`.
    pub fn dst(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sets the table consulted on a match.
    pub fn table(mut self, table: impl Into<Table>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Same as [`table`](Self::table), matching the `lookup` keyword.
    pub fn lookup(self, table: impl Into<Table>) -> Self {
        self.table(table)
    }

    /// Sets the firewall mark selector. Fails on a malformed mark string.
    pub fn fwmark(mut self, fwmark: impl IntoFwMark) -> Result<Self> {
        self.fwmark = Some(fwmark.into_fwmark()?);
        Ok(self)
    }

    /// Sets the incoming interface selector.
    pub fn iif(mut self, iif: impl Into<String>) -> Self {
        self.iif = Some(iif.into());
        self
    }

    /// Sets the outgoing interface selector.
    pub fn oif(mut self, oif: impl Into<String>) -> Self {
        self.oif = Some(oif.into());
        self
    }

    /// Sets the action. Defaults to unicast.
    pub fn action(mut self, action: RuleAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Builds a spec from `ip rule` style key/value pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut spec = Self::new();

        for (key, value) in pairs {
            spec = match key {
                "from" => spec.src(value),
                "to" => spec.dst(value),
                "lookup" | "table" => spec.table(value),
                "fwmark" => spec.fwmark(value)?,
                "iif" | "iifname" => spec.iif(value),
                "oif" | "oifname" => spec.oif(value),
                "priority" | "pref" | "prio" => spec.priority(parse_u32(value)?),
                "type" | "action" => spec.action(value.parse()?),
                "goto" => spec.action(RuleAction::Goto),
                other => {
                    tracing::trace!(key = other, value, "ignoring rule selector");
                    spec
                }
            };
        }

        Ok(spec)
    }

    /// Produces the canonical form used for comparison and submission.
    pub fn canonicalize(self, version: IpVersion) -> Rule {
        let any = || version.any().to_string();
        let from = self.from.filter(|from| from != "all").unwrap_or_else(any);
        let to = self.to.map(|to| if to == "all" { any() } else { to });

        Rule {
            priority: self.priority,
            fields: RuleFields {
                from,
                to,
                table: self.table,
                fwmark: self.fwmark,
                iif: self.iif,
                oif: self.oif,
                action: self.action.unwrap_or_default(),
            },
        }
    }
}

/// Selectors printed without a value.
const BARE_ACTIONS: &[&str] = &["blackhole", "unreachable", "prohibit", "nop"];
const BARE_FLAGS: &[&str] = &["not", "l3mdev", "[detached]"];

/// Parses one `ip rule show` line such as `101:\tfrom 192.168.45.100 lookup 2`.
pub fn parse_rule_line(version: IpVersion, line: &str) -> Result<Option<Rule>> {
    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else { return Ok(None) };
    let Some(priority) = head.strip_suffix(':') else {
        return Err(Error::Line { what: "rule", line: line.to_string() });
    };

    let mut pairs = vec![("priority", priority)];
    while let Some(token) = tokens.next() {
        if BARE_ACTIONS.contains(&token) {
            pairs.push(("action", token));
        } else if BARE_FLAGS.contains(&token) {
            continue;
        } else if let Some(value) = tokens.next() {
            pairs.push((token, value));
        }
    }

    Ok(Some(RuleSpec::from_pairs(pairs)?.canonicalize(version)))
}

/// Parses `ip rule show` output.
pub fn parse_rules(version: IpVersion, output: &str) -> Result<Vec<Rule>> {
    output.lines().filter_map(|line| parse_rule_line(version, line).transpose()).collect()
}

#[derive(Debug, Deserialize)]
struct RuleRecord {
    priority: Option<u32>,
    src: Option<String>,
    srclen: Option<u8>,
    dst: Option<String>,
    dstlen: Option<u8>,
    table: Option<NumOrStr>,
    fwmark: Option<NumOrStr>,
    fwmask: Option<NumOrStr>,
    iif: Option<String>,
    oif: Option<String>,
    action: Option<NumOrStr>,
}

fn selector(addr: Option<String>, len: Option<u8>) -> Option<String> {
    match (addr, len) {
        (Some(addr), Some(len)) => Some(format!("{addr}/{len}")),
        (addr, _) => addr,
    }
}

impl RuleRecord {
    fn into_rule(self, version: IpVersion) -> Result<Rule> {
        let mut spec = RuleSpec::new().priority(self.priority.unwrap_or(0));

        if let Some(from) = selector(self.src, self.srclen) {
            spec = spec.src(from);
        }
        if let Some(to) = selector(self.dst, self.dstlen) {
            spec = spec.dst(to);
        }
        if let Some(table) = self.table {
            spec = spec.table(table.into_string().as_str());
        }
        if let Some(mark) = self.fwmark {
            let mask = self.fwmask.as_ref().map_or(Ok(FwMark::FULL_MASK), NumOrStr::to_u32)?;
            spec = spec.fwmark((mark.to_u32()?, mask))?;
        }
        if let Some(iif) = self.iif {
            spec = spec.iif(iif);
        }
        if let Some(oif) = self.oif {
            spec = spec.oif(oif);
        }
        if let Some(action) = self.action {
            spec = spec.action(action.into_string().parse()?);
        }

        Ok(spec.canonicalize(version))
    }
}

/// Parses `ip -j rule show` output.
pub fn parse_rules_json(version: IpVersion, output: &str) -> Result<Vec<Rule>> {
    let records: Vec<RuleRecord> = crate::json::records(output)?;
    records.into_iter().map(|record| record.into_rule(version)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(spec: RuleSpec, version: IpVersion) -> RuleFields {
        spec.canonicalize(version).fields
    }

    #[test]
    fn any_source_is_the_zero_network() {
        for spec in [RuleSpec::new(), RuleSpec::new().src("all")] {
            assert_eq!(canonical(spec.clone(), IpVersion::V4).from, "0.0.0.0/0");
            assert_eq!(canonical(spec, IpVersion::V6).from, "::/0");
        }
        let to = canonical(RuleSpec::new().dst("all"), IpVersion::V6).to;
        assert_eq!(to.as_deref(), Some("::/0"));
        assert_eq!(canonical(RuleSpec::new().src("10.0.0.0/8"), IpVersion::V4).from, "10.0.0.0/8");
    }

    #[test]
    fn fwmark_forms() {
        let mark = |spec: Result<RuleSpec>| {
            canonical(spec.unwrap(), IpVersion::V4).fwmark.unwrap().to_string()
        };

        assert_eq!(mark(RuleSpec::new().fwmark(0x400)), "0x400/0xffffffff");
        assert_eq!(mark(RuleSpec::new().fwmark("0x400")), "0x400/0xffffffff");
        assert_eq!(mark(RuleSpec::new().fwmark("0x400/0xff")), "0x400/0xff");
        assert_eq!(mark(RuleSpec::new().fwmark((0x400, 0xffff))), "0x400/0xffff");
        assert_eq!(mark(RuleSpec::new().fwmark("1024/255")), "0x400/0xff");
        assert!(RuleSpec::new().fwmark("0x40g").is_err());
    }

    #[test]
    fn lookup_is_table_and_unicast_is_default() {
        let fields = canonical(RuleSpec::new().lookup(10u32), IpVersion::V4);
        assert_eq!(fields.table, Some(Table::Id(10)));
        assert_eq!(fields.action, RuleAction::Unicast);
        assert_eq!(
            canonical(RuleSpec::new().table(10u32), IpVersion::V4),
            canonical(RuleSpec::new().lookup("10"), IpVersion::V4)
        );
    }

    #[test]
    fn priority_is_not_part_of_identity() {
        let spec = RuleSpec::new().src("1.2.3.4").table(5u32);
        let a = spec.clone().priority(100).canonicalize(IpVersion::V4);
        let b = spec.priority(200).canonicalize(IpVersion::V4);
        assert!(a.same_as(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn add_arguments() {
        let rule = RuleSpec::new().src("192.168.45.100").table(2u32).priority(101);
        assert_eq!(
            rule.canonicalize(IpVersion::V4).to_args().join(" "),
            "from 192.168.45.100 priority 101 table 2 type unicast"
        );
    }

    #[test]
    fn parses_text_lines() {
        let rule = parse_rule_line(IpVersion::V4, "4030201:\tfrom 1.2.3.4/24 lookup 10203040")
            .unwrap()
            .unwrap();
        assert_eq!(rule.priority, Some(4030201));
        assert_eq!(rule.fields.from, "1.2.3.4/24");
        assert_eq!(rule.fields.table.unwrap().to_string(), "10203040");
        assert_eq!(rule.fields.action, RuleAction::Unicast);

        let line = "1024:    from all iif qg-c43b1928-48 lookup noscope";
        let rule = parse_rule_line(IpVersion::V6, line).unwrap().unwrap();
        assert_eq!(rule.fields.from, "::/0");
        assert_eq!(rule.fields.iif.as_deref(), Some("qg-c43b1928-48"));
        assert_eq!(rule.fields.table, Some(Table::Named("noscope".into())));

        let rule = parse_rule_line(
            IpVersion::V4,
            "200:\tfrom all fwmark 0x400/0xff lookup main suppress_prefixlength 0",
        )
        .unwrap()
        .unwrap();
        assert_eq!(rule.fields.fwmark, Some(FwMark::with_mask(0x400, 0xff)));
        assert_eq!(rule.fields.table, Some(Table::Main));

        let line = "300:\tfrom 10.0.0.0/8 blackhole";
        let rule = parse_rule_line(IpVersion::V4, line).unwrap().unwrap();
        assert_eq!(rule.fields.action, RuleAction::Blackhole);
        assert_eq!(rule.fields.table, None);

        assert!(parse_rule_line(IpVersion::V4, "   ").unwrap().is_none());
        assert!(parse_rule_line(IpVersion::V4, "from all lookup main").is_err());
    }

    #[test]
    fn parses_text_listing() {
        let sample = "
0:      from all lookup local
32766:  from all lookup main
32767:  from all lookup default
101:    from 192.168.45.100 lookup 2
";
        let rules = parse_rules(IpVersion::V4, sample).unwrap();
        let tables: Vec<_> =
            rules.iter().map(|r| r.fields.table.as_ref().unwrap().to_string()).collect();
        assert_eq!(tables, ["local", "main", "default", "2"]);

        let wanted = RuleSpec::new().src("192.168.45.100").table(2u32).priority(101);
        assert!(rules.contains(&wanted.canonicalize(IpVersion::V4)));
    }

    #[test]
    fn parses_json_records() {
        let sample = r#"[
            {"priority":0,"src":"all","table":"255"},
            {"priority":32766,"src":"all","table":254},
            {"src":"192.168.0.1","srclen":24,"table":"1000","fwmark":1000,"fwmask":10,"action":6},
            {"priority":5,"src":"10.0.0.1","dst":"10.1.0.0","dstlen":16,"fwmark":"0x400",
             "iif":"tap0","oif":"tap1","table":"253","action":"unreachable"}
        ]"#;

        let rules = parse_rules_json(IpVersion::V4, sample).unwrap();
        assert_eq!(rules.len(), 4);

        assert_eq!(rules[0].fields.table, Some(Table::Local));
        assert_eq!(rules[0].fields.from, "0.0.0.0/0");
        assert_eq!(rules[1].fields.table, Some(Table::Main));

        assert_eq!(rules[2].priority, Some(0));
        assert_eq!(rules[2].fields.from, "192.168.0.1/24");
        assert_eq!(rules[2].fields.table.as_ref().unwrap().to_string(), "1000");
        assert_eq!(rules[2].fields.fwmark.unwrap().to_string(), "0x3e8/0xa");
        assert_eq!(rules[2].fields.action, RuleAction::Blackhole);

        let last = &rules[3].fields;
        assert_eq!(last.from, "10.0.0.1");
        assert_eq!(last.to.as_deref(), Some("10.1.0.0/16"));
        assert_eq!(last.fwmark, Some(FwMark::new(0x400)));
        assert_eq!((last.iif.as_deref(), last.oif.as_deref()), (Some("tap0"), Some("tap1")));
        assert_eq!(last.table, Some(Table::Default));
        assert_eq!(last.action, RuleAction::Unreachable);
    }
}
