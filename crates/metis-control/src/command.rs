//! The control message grammar (spec.md §6, "CLI / control command set
//! (exactly)"). The embedded text CLI itself is out of scope (spec.md §1);
//! this is the wire shape it and `metisd` agree on — a line of
//! whitespace-separated tokens in, the same textual form back out.

use std::fmt;

use metis_core::StrategyKind;

use crate::error::ControlParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
    Ether,
}

impl TransportKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "ether" => Some(Self::Ether),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Ether => "ether",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Tcp,
    Udp,
    Ether,
    Local,
}

impl ListenerKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "ether" => Some(Self::Ether),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Ether => "ether",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListResource {
    Connections,
    Routes,
    Interfaces,
}

impl ListResource {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "connections" => Some(Self::Connections),
            "routes" => Some(Self::Routes),
            "interfaces" => Some(Self::Interfaces),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Connections => "connections",
            Self::Routes => "routes",
            Self::Interfaces => "interfaces",
        }
    }
}

impl fmt::Display for ListResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyName {
    All,
    Random,
    LoadBalancer,
}

impl StrategyName {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "all" => Some(Self::All),
            "random" => Some(Self::Random),
            "loadbalancer" => Some(Self::LoadBalancer),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Random => "random",
            Self::LoadBalancer => "loadbalancer",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StrategyName> for StrategyKind {
    fn from(name: StrategyName) -> Self {
        match name {
            StrategyName::All => StrategyKind::All,
            StrategyName::Random => StrategyKind::Random,
            StrategyName::LoadBalancer => StrategyKind::LoadBalancer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn as_bool(self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Serve,
    Store,
}

impl CacheKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "serve" => Some(Self::Serve),
            "store" => Some(Self::Store),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Serve => "serve",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed line of the control grammar (spec.md §6). `Display` produces
/// the same textual form `parse` accepts, so the (out-of-scope) CLI and
/// `metisd` can round-trip a command for logging or replay.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    AddConnection { transport: TransportKind, symbolic: String, remote: String, local: String },
    AddListener { kind: ListenerKind, symbolic: String, addr: String, port_or_ifname: String },
    AddRoute { symbolic: String, prefix: String, cost: u32 },
    RemoveConnection { symbolic: String },
    RemoveRoute { symbolic: String, prefix: String },
    List(ListResource),
    SetStrategy { prefix: String, strategy: StrategyName },
    SetWldr { toggle: Toggle, symbolic: String },
    SetDebug,
    UnsetDebug,
    Cache { kind: CacheKind, toggle: Toggle },
    CacheClear,
    Quit,
    Help(Option<String>),
}

impl ControlCommand {
    /// Parses one line of the control grammar. Unknown leading tokens and
    /// wrong argument counts are both `ControlParseError` (exit code 1 per
    /// spec.md §6); there is no execution-error path at parse time.
    pub fn parse(line: &str) -> Result<Self, ControlParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, rest)) = tokens.split_first() else {
            return Err(ControlParseError::Empty);
        };

        match head {
            "add" => Self::parse_add(rest),
            "remove" => Self::parse_remove(rest),
            "list" => Self::parse_list(rest),
            "set" => Self::parse_set(rest),
            "unset" => Self::parse_unset(rest),
            "cache" => Self::parse_cache(rest),
            "quit" => {
                if rest.is_empty() {
                    Ok(Self::Quit)
                } else {
                    Err(ControlParseError::BadArity { command: "quit", expected: "no arguments" })
                }
            }
            "help" => Ok(Self::Help(rest.first().map(|s| s.to_string()))),
            other => Err(ControlParseError::UnknownCommand(other.to_string())),
        }
    }

    fn parse_add(rest: &[&str]) -> Result<Self, ControlParseError> {
        match rest {
            ["route", symbolic, prefix, cost] => {
                let cost = cost
                    .parse::<u32>()
                    .map_err(|_| ControlParseError::InvalidValue { field: "cost", value: cost.to_string() })?;
                Ok(Self::AddRoute { symbolic: symbolic.to_string(), prefix: prefix.to_string(), cost })
            }
            ["connection", kind, symbolic, remote, local] => {
                let transport = TransportKind::parse(kind)
                    .ok_or_else(|| ControlParseError::InvalidValue { field: "transport", value: kind.to_string() })?;
                Ok(Self::AddConnection {
                    transport,
                    symbolic: symbolic.to_string(),
                    remote: remote.to_string(),
                    local: local.to_string(),
                })
            }
            ["listener", kind, symbolic, addr, port_or_ifname] => {
                let kind = ListenerKind::parse(kind)
                    .ok_or_else(|| ControlParseError::InvalidValue { field: "listener kind", value: kind.to_string() })?;
                Ok(Self::AddListener {
                    kind,
                    symbolic: symbolic.to_string(),
                    addr: addr.to_string(),
                    port_or_ifname: port_or_ifname.to_string(),
                })
            }
            _ => Err(ControlParseError::BadArity {
                command: "add",
                expected: "connection {tcp|udp|ether} <symbolic> <remote> <local> | listener {tcp|udp|ether|local} <symbolic> <addr> <port|ifname> | route <symbolic> <prefix> <cost>",
            }),
        }
    }

    fn parse_remove(rest: &[&str]) -> Result<Self, ControlParseError> {
        match rest {
            ["connection", symbolic] => Ok(Self::RemoveConnection { symbolic: symbolic.to_string() }),
            ["route", symbolic, prefix] => {
                Ok(Self::RemoveRoute { symbolic: symbolic.to_string(), prefix: prefix.to_string() })
            }
            _ => Err(ControlParseError::BadArity {
                command: "remove",
                expected: "connection <symbolic> | route <symbolic> <prefix>",
            }),
        }
    }

    fn parse_list(rest: &[&str]) -> Result<Self, ControlParseError> {
        match rest {
            [resource] => ListResource::parse(resource)
                .map(Self::List)
                .ok_or_else(|| ControlParseError::InvalidValue { field: "resource", value: resource.to_string() }),
            _ => Err(ControlParseError::BadArity { command: "list", expected: "{connections|routes|interfaces}" }),
        }
    }

    fn parse_set(rest: &[&str]) -> Result<Self, ControlParseError> {
        match rest {
            ["strategy", prefix, strategy] => StrategyName::parse(strategy)
                .map(|strategy| Self::SetStrategy { prefix: prefix.to_string(), strategy })
                .ok_or_else(|| ControlParseError::InvalidValue { field: "strategy", value: strategy.to_string() }),
            ["wldr", toggle, symbolic] => Toggle::parse(toggle)
                .map(|toggle| Self::SetWldr { toggle, symbolic: symbolic.to_string() })
                .ok_or_else(|| ControlParseError::InvalidValue { field: "toggle", value: toggle.to_string() }),
            ["debug"] => Ok(Self::SetDebug),
            _ => Err(ControlParseError::BadArity {
                command: "set",
                expected: "strategy <prefix> {all|random|loadbalancer} | wldr {on|off} <symbolic> | debug",
            }),
        }
    }

    fn parse_unset(rest: &[&str]) -> Result<Self, ControlParseError> {
        match rest {
            ["debug"] => Ok(Self::UnsetDebug),
            _ => Err(ControlParseError::BadArity { command: "unset", expected: "debug" }),
        }
    }

    fn parse_cache(rest: &[&str]) -> Result<Self, ControlParseError> {
        match rest {
            ["clear"] => Ok(Self::CacheClear),
            [kind, toggle] => {
                let kind = CacheKind::parse(kind)
                    .ok_or_else(|| ControlParseError::InvalidValue { field: "cache kind", value: kind.to_string() })?;
                let toggle = Toggle::parse(toggle)
                    .ok_or_else(|| ControlParseError::InvalidValue { field: "toggle", value: toggle.to_string() })?;
                Ok(Self::Cache { kind, toggle })
            }
            _ => Err(ControlParseError::BadArity { command: "cache", expected: "{serve|store} {on|off} | clear" }),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddConnection { transport, symbolic, remote, local } => {
                write!(f, "add connection {transport} {symbolic} {remote} {local}")
            }
            Self::AddListener { kind, symbolic, addr, port_or_ifname } => {
                write!(f, "add listener {kind} {symbolic} {addr} {port_or_ifname}")
            }
            Self::AddRoute { symbolic, prefix, cost } => write!(f, "add route {symbolic} {prefix} {cost}"),
            Self::RemoveConnection { symbolic } => write!(f, "remove connection {symbolic}"),
            Self::RemoveRoute { symbolic, prefix } => write!(f, "remove route {symbolic} {prefix}"),
            Self::List(resource) => write!(f, "list {resource}"),
            Self::SetStrategy { prefix, strategy } => write!(f, "set strategy {prefix} {strategy}"),
            Self::SetWldr { toggle, symbolic } => write!(f, "set wldr {toggle} {symbolic}"),
            Self::SetDebug => write!(f, "set debug"),
            Self::UnsetDebug => write!(f, "unset debug"),
            Self::Cache { kind, toggle } => write!(f, "cache {kind} {toggle}"),
            Self::CacheClear => write!(f, "cache clear"),
            Self::Quit => write!(f, "quit"),
            Self::Help(None) => write!(f, "help"),
            Self::Help(Some(topic)) => write!(f, "help {topic}"),
        }
    }
}
