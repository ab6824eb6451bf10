//! An in-memory stand-in for the kernel, answering the commands the controllers issue.

use std::{collections::BTreeMap, sync::Arc};

use netctl_exec::{Command, FakeExecutor, Reply};
use parking_lot::Mutex;
use serde_json::json;

#[derive(Debug, Clone)]
struct InstalledRule {
    priority: u32,
    from: String,
    table: String,
}

#[derive(Debug)]
struct Namespace {
    devices: Vec<String>,
    peers: BTreeMap<String, String>,
    /// `(device, inet line)`
    addresses: Vec<(String, String)>,
    rules: Vec<InstalledRule>,
}

impl Default for Namespace {
    fn default() -> Self {
        let rule = |priority, table: &str| InstalledRule {
            priority,
            from: "all".to_string(),
            table: table.to_string(),
        };

        Self {
            devices: vec!["lo".to_string()],
            peers: BTreeMap::new(),
            addresses: Vec::new(),
            rules: vec![rule(0, "local"), rule(32766, "main"), rule(32767, "default")],
        }
    }
}

impl Namespace {
    fn has_device(&self, name: &str) -> bool {
        self.devices.iter().any(|d| d == name)
    }

    fn show_addresses(&self, device: &str) -> String {
        let mut out = format!("2: {device}: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n");
        for (_, line) in self.addresses.iter().filter(|(dev, _)| dev == device) {
            out.push_str(&format!("    {line}\n"));
        }
        out
    }

    fn show_rules(&self) -> String {
        self.rules
            .iter()
            .map(|r| format!("{}:\tfrom {} lookup {}\n", r.priority, r.from, r.table))
            .collect()
    }

    fn show_rules_json(&self) -> String {
        let records: Vec<_> = self
            .rules
            .iter()
            .map(|r| match r.from.split_once('/') {
                Some((src, len)) => json!({
                    "priority": r.priority,
                    "src": src,
                    "srclen": len.parse::<u8>().unwrap(),
                    "table": r.table,
                }),
                None => json!({ "priority": r.priority, "src": r.from, "table": r.table }),
            })
            .collect();
        serde_json::to_string(&records).unwrap()
    }

    fn add_rule(&mut self, args: &[&str]) {
        let mut rule = InstalledRule {
            priority: 0,
            from: "all".to_string(),
            table: "main".to_string(),
        };
        let mut priority = None;

        for pair in args.chunks(2) {
            match pair {
                ["from", from] if *from != "0.0.0.0/0" => rule.from = from.to_string(),
                ["priority", p] => priority = Some(p.parse().unwrap()),
                ["table", table] => rule.table = table.to_string(),
                _ => {}
            }
        }

        rule.priority = priority.unwrap_or_else(|| {
            self.rules.iter().map(|r| r.priority).filter(|p| *p > 0).min().unwrap_or(32766) - 1
        });
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority);
    }
}

#[derive(Debug, Default)]
pub struct Kernel {
    namespaces: BTreeMap<String, Namespace>,
}

fn no_device(name: &str) -> Reply {
    Reply::fail(1, format!("Cannot find device \"{name}\""))
}

impl Kernel {
    fn handle(&mut self, command: &Command) -> Option<Reply> {
        let argv: Vec<&str> = command.argv().iter().map(String::as_str).collect();

        match argv.as_slice() {
            ["ip", "netns", "add", name] => {
                if self.namespaces.contains_key(*name) {
                    let stderr =
                        format!("Cannot create namespace file \"/run/netns/{name}\": File exists");
                    return Some(Reply::fail(1, stderr));
                }
                self.namespaces.insert(name.to_string(), Namespace::default());
                return Some(Reply::default());
            }
            ["ip", "netns", "list"] => {
                let names: String = self.namespaces.keys().map(|n| format!("{n}\n")).collect();
                return Some(Reply::stdout(names));
            }
            ["ip", "netns", "delete", name] => {
                if self.namespaces.remove(*name).is_none() {
                    let stderr = format!(
                        "Cannot remove namespace file \"/run/netns/{name}\": No such file or \
                         directory"
                    );
                    return Some(Reply::fail(1, stderr));
                }
                return Some(Reply::default());
            }
            _ => {}
        }

        let ns_name = command.namespace()?;
        let Some(ns) = self.namespaces.get_mut(ns_name) else {
            let stderr =
                format!("Cannot open network namespace \"{ns_name}\": No such file or directory");
            return Some(Reply::fail(1, stderr));
        };

        let reply = match argv.as_slice() {
            ["ip", "link", "add", name, "type", "veth", "peer", "name", peer] => {
                ns.devices.extend([name.to_string(), peer.to_string()]);
                ns.peers.insert(name.to_string(), peer.to_string());
                ns.peers.insert(peer.to_string(), name.to_string());
                Reply::default()
            }
            ["ip", "link", "del", name] => {
                if !ns.has_device(name) {
                    return Some(no_device(name));
                }
                let peer = ns.peers.remove(*name);
                ns.devices.retain(|d| d != name && Some(d) != peer.as_ref());
                ns.addresses.retain(|(d, _)| d != name && Some(d) != peer.as_ref());
                Reply::default()
            }
            ["ip", "link", "set", name, ..] if !ns.has_device(name) => no_device(name),
            ["ip", .., "link", "show", "dev", name] if !ns.has_device(name) => {
                Reply::fail(1, format!("Device \"{name}\" does not exist."))
            }
            ["find", ..] => {
                let names: String = ns.devices.iter().map(|d| format!("{d} ")).collect();
                Reply::stdout(names)
            }
            ["ip", _, "addr", "add", cidr, "scope", scope, "dev", dev, rest @ ..] => {
                if !ns.has_device(dev) {
                    return Some(no_device(dev));
                }
                let line = match rest {
                    ["brd", brd] => format!("inet {cidr} brd {brd} scope {scope} {dev}"),
                    _ => format!("inet {cidr} scope {scope} {dev}"),
                };
                ns.addresses.push((dev.to_string(), line));
                Reply::default()
            }
            ["ip", "addr", "show", "dev", dev, ..] => {
                if !ns.has_device(dev) {
                    return Some(Reply::fail(1, format!("Device \"{dev}\" does not exist.")));
                }
                Reply::stdout(ns.show_addresses(dev))
            }
            ["ip", _, "rule", "show"] => Reply::stdout(ns.show_rules()),
            ["ip", _, "-j", "rule", "show"] => Reply::stdout(ns.show_rules_json()),
            ["ip", _, "rule", "add", args @ ..] => {
                ns.add_rule(args);
                Reply::default()
            }
            _ => Reply::default(),
        };

        Some(reply)
    }
}

/// A [`FakeExecutor`] backed by a fresh [`Kernel`].
pub fn fake_kernel() -> FakeExecutor {
    let kernel = Arc::new(Mutex::new(Kernel::default()));
    FakeExecutor::with_handler(move |command| kernel.lock().handle(command))
}
