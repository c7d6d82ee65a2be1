// The change evaluator: (current configuration, change op) -> candidate
// configuration or rejection. Every node runs this independently against
// its own copy of the current configuration, and all copies are identical,
// so the function must be a pure deterministic value computation: no
// clocks, no randomness, no iteration over unordered containers.

use crate::change::{ChangeOp, NodeSpec, StripeSpec, Target};
use crate::topology::{immutable_after_activation, Cluster, Node, NodeIdx, Stripe, StripeIdx};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// The op is legal; the candidate configuration is the op applied to
    /// the input.
    Accept(Box<Cluster>),
    Reject(String),
}

impl Verdict {
    pub fn rejection(&self) -> Option<&str> {
        match self {
            Verdict::Accept(_) => None,
            Verdict::Reject(reason) => Some(reason),
        }
    }
}

fn reject(reason: impl Into<String>) -> Verdict {
    Verdict::Reject(reason.into())
}

pub fn evaluate(current: &Cluster, op: &ChangeOp) -> Verdict {
    match op {
        ChangeOp::SetSetting { target, key, value } => set_setting(current, target, key, value),
        ChangeOp::UnsetSetting { target, key } => unset_setting(current, target, key),
        ChangeOp::AttachNode { stripe, node } => attach_node(current, stripe, node),
        ChangeOp::DetachNode { addr } => detach_node(current, addr),
        ChangeOp::AttachStripe { stripe } => attach_stripe(current, stripe),
        ChangeOp::DetachStripe { name } => detach_stripe(current, name),
    }
}

fn set_setting(current: &Cluster, target: &Target, key: &str, value: &str) -> Verdict {
    if immutable_after_activation(key) {
        return reject(format!("setting {} cannot change after activation", key));
    }
    if key.is_empty() {
        return reject("setting name must be non-empty");
    }
    let mut next = current.clone();
    match target {
        Target::Cluster => next.settings.set(key, value),
        Target::Stripe(name) => {
            let Some(idx) = next.stripe_by_name(name) else {
                return reject(format!("no stripe named {}", name));
            };
            // Stripe-scoped settings fan out to every member node.
            let members = next.stripe(idx).map(|s| s.members.clone()).unwrap_or_default();
            for m in members {
                if let Some(node) = node_mut(&mut next, m) {
                    node.settings.set(key, value);
                }
            }
        }
        Target::Node(addr) => {
            let Some(idx) = next.node_by_addr(addr) else {
                return reject(format!("no node at {}", addr));
            };
            if let Some(node) = node_mut(&mut next, idx) {
                node.settings.set(key, value);
            }
        }
    }
    Verdict::Accept(Box::new(next))
}

fn unset_setting(current: &Cluster, target: &Target, key: &str) -> Verdict {
    if immutable_after_activation(key) {
        return reject(format!("setting {} cannot change after activation", key));
    }
    let mut next = current.clone();
    let removed = match target {
        Target::Cluster => next.settings.unset(key),
        Target::Stripe(name) => {
            let Some(idx) = next.stripe_by_name(name) else {
                return reject(format!("no stripe named {}", name));
            };
            let members = next.stripe(idx).map(|s| s.members.clone()).unwrap_or_default();
            let mut any = false;
            for m in members {
                if let Some(node) = node_mut(&mut next, m) {
                    any |= node.settings.unset(key);
                }
            }
            any
        }
        Target::Node(addr) => {
            let Some(idx) = next.node_by_addr(addr) else {
                return reject(format!("no node at {}", addr));
            };
            match node_mut(&mut next, idx) {
                Some(node) => node.settings.unset(key),
                None => false,
            }
        }
    };
    if !removed {
        return reject(format!("setting {} is not set on {}", key, target));
    }
    Verdict::Accept(Box::new(next))
}

fn check_new_member(current: &Cluster, spec: &NodeSpec) -> Option<Verdict> {
    if spec.name.is_empty() {
        return Some(reject("node name must be non-empty"));
    }
    if current.node_by_addr(&spec.addr).is_some() {
        return Some(reject(format!("{} already belongs to the cluster", spec.addr)));
    }
    if current.port_in_use(&spec.addr.host, spec.addr.port) {
        return Some(reject(format!("port {} already in use on {}", spec.addr.port, spec.addr.host)));
    }
    if current.port_in_use(&spec.addr.host, spec.group_port) {
        return Some(reject(format!(
            "group port {} already in use on {}",
            spec.group_port, spec.addr.host
        )));
    }
    if spec.addr.port == spec.group_port {
        return Some(reject("node port and group port must differ"));
    }
    None
}

fn push_node(next: &mut Cluster, stripe: StripeIdx, spec: &NodeSpec) {
    next.nodes.push(Node {
        name: spec.name.clone(),
        addr: spec.addr.clone(),
        group_port: spec.group_port,
        stripe,
        settings: spec.settings.clone(),
    });
}

fn attach_node(current: &Cluster, stripe: &str, spec: &NodeSpec) -> Verdict {
    let Some(idx) = current.stripe_by_name(stripe) else {
        return reject(format!("no stripe named {}", stripe));
    };
    if let Some(v) = check_new_member(current, spec) {
        return v;
    }
    if current.nodes.iter().any(|n| n.name == spec.name) {
        return reject(format!("a node named {} already exists", spec.name));
    }
    let mut next = current.clone();
    push_node(&mut next, idx, spec);
    next.reindex();
    Verdict::Accept(Box::new(next))
}

fn detach_node(current: &Cluster, addr: &crate::topology::NodeAddr) -> Verdict {
    let Some(idx) = current.node_by_addr(addr) else {
        return reject(format!("no node at {}", addr));
    };
    let stripe = current.node(idx).map(|n| n.stripe).unwrap_or(StripeIdx(0));
    let members = current.stripe(stripe).map(|s| s.members.len()).unwrap_or(0);
    if members <= 1 {
        return reject(format!(
            "{} is the last node of its stripe; detach the stripe instead",
            addr
        ));
    }
    let mut next = current.clone();
    let gone = idx.0 as usize;
    next.nodes.remove(gone);
    // Removal shifts arena positions; rebuild membership from the
    // surviving nodes' stripe links.
    next.reindex();
    Verdict::Accept(Box::new(next))
}

fn attach_stripe(current: &Cluster, spec: &StripeSpec) -> Verdict {
    if spec.name.is_empty() {
        return reject("stripe name must be non-empty");
    }
    if spec.nodes.is_empty() {
        return reject("a stripe needs at least one node");
    }
    if current.stripe_by_name(&spec.name).is_some() {
        return reject(format!("a stripe named {} already exists", spec.name));
    }
    // New members must not clash with the cluster nor with each other.
    let mut widened = current.clone();
    widened.stripes.push(Stripe {
        name: spec.name.clone(),
        members: Vec::new(),
    });
    let idx = StripeIdx((widened.stripes.len() - 1) as i64);
    for node in &spec.nodes {
        if let Some(v) = check_new_member(&widened, node) {
            return v;
        }
        if widened.nodes.iter().any(|n| n.name == node.name) {
            return reject(format!("a node named {} already exists", node.name));
        }
        push_node(&mut widened, idx, node);
    }
    widened.reindex();
    Verdict::Accept(Box::new(widened))
}

fn detach_stripe(current: &Cluster, name: &str) -> Verdict {
    let Some(idx) = current.stripe_by_name(name) else {
        return reject(format!("no stripe named {}", name));
    };
    if current.stripes.len() <= 1 {
        return reject("cannot detach the last remaining stripe");
    }
    let mut next = current.clone();
    let gone = idx.0 as usize;
    next.stripes.remove(gone);
    next.nodes.retain(|n| n.stripe != idx);
    // Surviving nodes that pointed past the removed stripe shift down one.
    for node in &mut next.nodes {
        if node.stripe.0 > idx.0 {
            node.stripe = StripeIdx(node.stripe.0 - 1);
        }
    }
    next.reindex();
    Verdict::Accept(Box::new(next))
}

fn node_mut(cluster: &mut Cluster, idx: NodeIdx) -> Option<&mut Node> {
    usize::try_from(idx.0).ok().and_then(|i| cluster.nodes.get_mut(i))
}
