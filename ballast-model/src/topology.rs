use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ballast_base::{err, Result};

// Arena indices. These are positions in Cluster::stripes / Cluster::nodes,
// not stable identifiers: a detach rebuilds the arena and reindexes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct StripeIdx(pub i64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeIdx(pub i64);

// The public address of a node, unique across the cluster.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddr {
            host: host.into(),
            port,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| err("address must be host:port"))?;
        if host.is_empty() {
            return Err(err("address must have a non-empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| err("address port must be a 16-bit integer"))?;
        Ok(NodeAddr::new(host, port))
    }
}

impl std::fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Free-form per-node settings (offheap resources, data dirs, log dir,
// backup dir, tc-properties and the like), keyed by dotted setting names.
// A few settings are structural and live as typed fields on Node instead;
// those are the ones that cannot change after activation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Settings {
    entries: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Settings that are fixed once a node has been activated into a cluster.
/// Mutating them requires detaching and re-attaching the node.
pub fn immutable_after_activation(key: &str) -> bool {
    matches!(key, "name" | "group-port" | "bind-address")
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub addr: NodeAddr,
    /// Port used for stripe-internal replication traffic, on the same host
    /// as `addr`.
    pub group_port: u16,
    /// Index of the owning stripe in the cluster arena.
    pub stripe: StripeIdx,
    pub settings: Settings,
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Stripe {
    pub name: String,
    /// Indices of member nodes in the cluster arena.
    pub members: Vec<NodeIdx>,
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub stripes: Vec<Stripe>,
    pub nodes: Vec<Node>,
    pub settings: Settings,
}

impl Cluster {
    /// The configuration a brand-new node runs before any change has ever
    /// been committed: a single stripe holding just itself.
    pub fn bootstrap(
        cluster_name: impl Into<String>,
        node_name: impl Into<String>,
        addr: NodeAddr,
        group_port: u16,
    ) -> Self {
        Cluster {
            name: cluster_name.into(),
            stripes: vec![Stripe {
                name: "stripe-1".to_string(),
                members: vec![NodeIdx(0)],
            }],
            nodes: vec![Node {
                name: node_name.into(),
                addr,
                group_port,
                stripe: StripeIdx(0),
                settings: Settings::new(),
            }],
            settings: Settings::new(),
        }
    }

    pub fn stripe(&self, idx: StripeIdx) -> Option<&Stripe> {
        usize::try_from(idx.0).ok().and_then(|i| self.stripes.get(i))
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        usize::try_from(idx.0).ok().and_then(|i| self.nodes.get(i))
    }

    pub fn stripe_by_name(&self, name: &str) -> Option<StripeIdx> {
        self.stripes
            .iter()
            .position(|s| s.name == name)
            .map(|i| StripeIdx(i as i64))
    }

    pub fn node_by_addr(&self, addr: &NodeAddr) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .position(|n| n.addr == *addr)
            .map(|i| NodeIdx(i as i64))
    }

    /// All member addresses, reconstructed on demand.
    pub fn addresses(&self) -> BTreeSet<NodeAddr> {
        self.nodes.iter().map(|n| n.addr.clone()).collect()
    }

    /// Member nodes of one stripe, in arena order.
    pub fn stripe_members(&self, idx: StripeIdx) -> Vec<&Node> {
        match self.stripe(idx) {
            None => Vec::new(),
            Some(s) => s.members.iter().filter_map(|m| self.node(*m)).collect(),
        }
    }

    /// True when some existing node on `host` already listens on `port`,
    /// either as its public port or its group port.
    pub fn port_in_use(&self, host: &str, port: u16) -> bool {
        self.nodes
            .iter()
            .any(|n| n.addr.host == host && (n.addr.port == port || n.group_port == port))
    }

    /// Rebuild stripe membership and back-links from scratch. Every
    /// mutation of the arena ends by calling this; it keeps the cyclic
    /// stripe <-> node relationship consistent without shared ownership.
    pub(crate) fn reindex(&mut self) {
        for stripe in &mut self.stripes {
            stripe.members.clear();
        }
        for (i, node) in self.nodes.iter().enumerate() {
            let s = node.stripe.0 as usize;
            debug_assert!(s < self.stripes.len());
            self.stripes[s].members.push(NodeIdx(i as i64));
        }
    }

    /// Internal consistency of the arena: every link in range, every node
    /// in exactly one stripe, no duplicate addresses.
    pub fn check(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if self.stripe(node.stripe).is_none() {
                return Err(err("node points at a stripe outside the arena"));
            }
            if !seen.insert(node.addr.clone()) {
                return Err(err("duplicate node address in arena"));
            }
        }
        let mut member_count = 0usize;
        for stripe in &self.stripes {
            for m in &stripe.members {
                if self.node(*m).is_none() {
                    return Err(err("stripe member outside the arena"));
                }
                member_count += 1;
            }
        }
        if member_count != self.nodes.len() {
            return Err(err("stripe membership does not cover the arena exactly"));
        }
        Ok(())
    }
}
