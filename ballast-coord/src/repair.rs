// Recovery of an interrupted change. When a coordinator dies between
// prepare and commit, the cluster is left with prepared tails that block
// every new session. Repair discovers where each node got to, decides a
// single outcome for the stranded change, takes the change over from the
// dead session, and drives the outcome everywhere reachable.
//
// The outcome rule keeps the one invariant that matters: a change that
// committed anywhere must commit everywhere, and a change rolled back
// anywhere must roll back everywhere. Only when no node reached a
// terminal state is there a genuine choice, and there the default is
// rollback; commit is an operator override for the case where the
// stragglers are known to be gone for good.

use std::collections::BTreeMap;

use tracing::{info, warn};

use ballast_base::{ChangeId, NodeId, Result};
use ballast_log::ChangeState;
use ballast_net::{Discovery, MutationReply, Req, Resp, Transport};

use crate::session::{Abort, Divergence, Session};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RepairPolicy {
    /// Commit if any node committed, roll back if any rolled back,
    /// otherwise roll back.
    Default,
    /// As Default, but an all-prepared cluster commits instead. Refused
    /// when any node already rolled the change back.
    ForceCommit,
    /// As Default, but refuse rather than commit. Refused when any node
    /// already committed.
    ForceRollback,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RepairVerdict {
    /// Nothing was in flight; no node log was touched.
    NothingToRepair,
    Repaired {
        change: ChangeId,
        outcome: ChangeState,
        resolved: Vec<NodeId>,
        /// Prepared nodes that could not be driven to the outcome.
        stuck: Vec<NodeId>,
        /// Nodes that never saw the change; they need a follow-up
        /// session targeting just them once repair is done.
        behind: Vec<NodeId>,
    },
    Aborted(Abort),
}

struct Partition {
    change: ChangeId,
    prepared: Vec<(NodeId, i64)>,
    committed: Vec<NodeId>,
    rolled_back: Vec<NodeId>,
    behind: Vec<NodeId>,
}

// Split the discovered tails by where each node got to with the stranded
// change. More than one distinct in-flight change id is a state this
// procedure must not guess about.
fn partition(discoveries: &BTreeMap<NodeId, Discovery>) -> std::result::Result<Option<Partition>, Abort> {
    let mut in_flight: Option<ChangeId> = None;
    for d in discoveries.values() {
        if let Some(tail) = &d.tail {
            if tail.state == ChangeState::Prepared {
                match in_flight {
                    None => in_flight = Some(tail.id),
                    Some(other) if other != tail.id => {
                        return Err(Abort::InconsistentCluster {
                            divergence: divergence_of(discoveries),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }
    let Some(change) = in_flight else {
        return Ok(None);
    };

    let mut p = Partition {
        change,
        prepared: Vec::new(),
        committed: Vec::new(),
        rolled_back: Vec::new(),
        behind: Vec::new(),
    };
    for (&node, d) in discoveries {
        match &d.tail {
            Some(tail) if tail.id == change => match tail.state {
                ChangeState::Prepared => p.prepared.push((node, d.mutative_message_count)),
                ChangeState::Committed => p.committed.push(node),
                ChangeState::RolledBack => p.rolled_back.push(node),
            },
            _ => p.behind.push(node),
        }
    }
    Ok(Some(p))
}

fn divergence_of(discoveries: &BTreeMap<NodeId, Discovery>) -> Vec<Divergence> {
    discoveries
        .iter()
        .map(|(&node, d)| Divergence {
            node,
            current_version: d.current_version,
            current_id: d.current_id,
        })
        .collect()
}

fn decide(p: &Partition, policy: RepairPolicy) -> std::result::Result<ChangeState, Abort> {
    if !p.committed.is_empty() {
        if policy == RepairPolicy::ForceRollback {
            return Err(Abort::Rejected {
                node: p.committed[0],
                kind: None,
                reason: "cannot force rollback: the change already committed there".to_string(),
            });
        }
        return Ok(ChangeState::Committed);
    }
    if !p.rolled_back.is_empty() {
        if policy == RepairPolicy::ForceCommit {
            return Err(Abort::Rejected {
                node: p.rolled_back[0],
                kind: None,
                reason: "cannot force commit: the change already rolled back there".to_string(),
            });
        }
        return Ok(ChangeState::RolledBack);
    }
    match policy {
        RepairPolicy::ForceCommit => Ok(ChangeState::Committed),
        RepairPolicy::Default | RepairPolicy::ForceRollback => Ok(ChangeState::RolledBack),
    }
}

/// Resolve an interrupted change across `targets`.
pub fn repair<T: Transport>(
    session: &Session<T>,
    targets: &[NodeId],
    policy: RepairPolicy,
) -> Result<RepairVerdict> {
    let discoveries = match session.discover_all(targets)? {
        Ok(d) => d,
        Err(unreachable) => {
            return Ok(RepairVerdict::Aborted(Abort::PartialCluster { unreachable }));
        }
    };

    let p = match partition(&discoveries) {
        Ok(Some(p)) => p,
        Ok(None) => return Ok(RepairVerdict::NothingToRepair),
        Err(abort) => return Ok(RepairVerdict::Aborted(abort)),
    };
    let outcome = match decide(&p, policy) {
        Ok(o) => o,
        Err(abort) => return Ok(RepairVerdict::Aborted(abort)),
    };
    info!(
        target: "ballast",
        change = %p.change,
        %outcome,
        prepared = p.prepared.len(),
        committed = p.committed.len(),
        rolled_back = p.rolled_back.len(),
        behind = p.behind.len(),
        "repair decided"
    );

    let mut resolved: Vec<NodeId> = p.committed.clone();
    resolved.extend(&p.rolled_back);
    let mut stuck = Vec::new();

    for &(node, expected) in &p.prepared {
        match drive(session, node, expected, p.change, outcome) {
            Ok(true) => resolved.push(node),
            Ok(false) => stuck.push(node),
            Err(e) => return Err(e),
        }
    }
    resolved.sort();

    if !stuck.is_empty() {
        warn!(
            target: "ballast",
            change = %p.change,
            stuck = stuck.len(),
            "repair left prepared nodes behind"
        );
    }
    Ok(RepairVerdict::Repaired {
        change: p.change,
        outcome,
        resolved,
        stuck,
        behind: p.behind,
    })
}

// Take the change over on one prepared node, then apply the outcome.
// Returns Ok(false) when the node declined or went away; the caller
// reports it stuck and the next repair picks it up again.
fn drive<T: Transport>(
    session: &Session<T>,
    node: NodeId,
    expected: i64,
    change: ChangeId,
    outcome: ChangeState,
) -> Result<bool> {
    let who = session.identity().clone();
    let deadline = session.deadline();
    let take = Req::TakeOver {
        who: who.clone(),
        expected_mutative_count: expected,
        change,
    };
    let granted = match session.transport().call(node, &take, deadline) {
        Ok(Resp::TakeOver { reply, .. }) => reply.accepted(),
        Ok(_) => return Err(ballast_base::err("mismatched response to take-over")),
        Err(_) => false,
    };
    if !granted {
        return Ok(false);
    }
    let req = match outcome {
        ChangeState::Committed => Req::Commit {
            who,
            expected_mutative_count: expected,
            change,
        },
        _ => Req::Rollback {
            who,
            expected_mutative_count: expected,
            change,
        },
    };
    let resp = match session.transport().call(node, &req, deadline) {
        Ok(Resp::Commit(reply)) | Ok(Resp::Rollback(reply)) => reply,
        Ok(_) => return Err(ballast_base::err("mismatched response to repair outcome")),
        Err(_) => return Ok(false),
    };
    Ok(matches!(resp, MutationReply::Accepted { .. }))
}
