use serde::{Deserialize, Serialize};

use crate::topology::{NodeAddr, Settings};

// A node as described by the operator when attaching: everything needed
// to place it into the arena except the stripe index, which the evaluator
// assigns.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub addr: NodeAddr,
    pub group_port: u16,
    pub settings: Settings,
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct StripeSpec {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
}

// What a setting mutation applies to.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Target {
    Cluster,
    Stripe(String),
    Node(NodeAddr),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Cluster => write!(f, "cluster"),
            Target::Stripe(name) => write!(f, "stripe {}", name),
            Target::Node(addr) => write!(f, "node {}", addr),
        }
    }
}

// The unit of mutation carried through the whole protocol: opaque to the
// journal and the wire, interpreted only by the evaluator.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum ChangeOp {
    SetSetting {
        target: Target,
        key: String,
        value: String,
    },
    UnsetSetting {
        target: Target,
        key: String,
    },
    AttachNode {
        stripe: String,
        node: NodeSpec,
    },
    DetachNode {
        addr: NodeAddr,
    },
    AttachStripe {
        stripe: StripeSpec,
    },
    DetachStripe {
        name: String,
    },
}

impl ChangeOp {
    /// One-line operator-facing description, used in audit output and logs.
    pub fn describe(&self) -> String {
        match self {
            ChangeOp::SetSetting { target, key, value } => {
                format!("set {}={} on {}", key, value, target)
            }
            ChangeOp::UnsetSetting { target, key } => format!("unset {} on {}", key, target),
            ChangeOp::AttachNode { stripe, node } => {
                format!("attach node {} to stripe {}", node.addr, stripe)
            }
            ChangeOp::DetachNode { addr } => format!("detach node {}", addr),
            ChangeOp::AttachStripe { stripe } => {
                format!("attach stripe {} ({} nodes)", stripe.name, stripe.nodes.len())
            }
            ChangeOp::DetachStripe { name } => format!("detach stripe {}", name),
        }
    }
}
