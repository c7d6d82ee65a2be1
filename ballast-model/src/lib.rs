// The configuration domain model: a cluster is a set of stripes
// (replication groups), each a set of nodes. The protocol treats a whole
// configuration as a value: the evaluator takes the current Cluster and a
// ChangeOp and produces a candidate Cluster (or a rejection), and the
// change log stores full candidate clusters as record results.
//
// Server / stripe / cluster relationships are cyclic when expressed as
// object references, so the model is an arena: stripes and nodes live in
// flat vectors on the Cluster and point at each other with integer
// indices. Views (member lists, address sets) are reconstructed on
// demand rather than stored.

#[cfg(test)]
mod test;

mod change;
mod evaluate;
mod export;
mod topology;

pub use change::{ChangeOp, NodeSpec, StripeSpec, Target};
pub use evaluate::{evaluate, Verdict};
pub use export::{to_json, to_properties};
pub use topology::{Cluster, Node, NodeAddr, NodeIdx, Settings, Stripe, StripeIdx};
