use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use ballast_base::{ChangeId, Identity, NodeId, Result, Version};
use ballast_model::ChangeOp;
use ballast_net::{is_unreachable, Discovery, MutationReply, RejectKind, Req, Resp, Transport};

/// Operator-side cancellation. Cancelling between prepare and the commit
/// decision rolls the change back; once any commit has been sent the
/// commit fan-out always runs to completion.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One node's answer to the agreement check, surfaced when the cluster
/// disagrees with itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Divergence {
    pub node: NodeId,
    pub current_version: Version,
    pub current_id: Option<ChangeId>,
}

// Why a session stopped without committing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Abort {
    /// One or more targets did not answer discovery.
    PartialCluster { unreachable: Vec<NodeId> },
    /// Some target still has a prepared tail from an earlier session;
    /// run repair first.
    PriorChangeInFlight { nodes: Vec<NodeId> },
    /// Targets disagree on the current committed configuration.
    InconsistentCluster { divergence: Vec<Divergence> },
    /// A node declined the prepare (or went away mid-prepare).
    Rejected {
        node: NodeId,
        kind: Option<RejectKind>,
        reason: String,
    },
    /// A concurrent coordinator moved a node's tail between our prepare
    /// and our commit decision.
    RaceDetected { node: NodeId },
    /// The operator cancelled before the commit decision.
    Cancelled,
}

impl std::fmt::Display for Abort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Abort::PartialCluster { unreachable } => {
                write!(f, "unreachable nodes: {:?}", unreachable)
            }
            Abort::PriorChangeInFlight { nodes } => {
                write!(f, "a prior change is still in flight on {:?}", nodes)
            }
            Abort::InconsistentCluster { divergence } => {
                write!(f, "cluster disagrees on its configuration: {:?}", divergence)
            }
            Abort::Rejected { node, kind, reason } => match kind {
                Some(kind) => write!(f, "{} rejected ({}): {}", node, kind, reason),
                None => write!(f, "{} failed: {}", node, reason),
            },
            Abort::RaceDetected { node } => {
                write!(f, "another coordinator intervened at {}", node)
            }
            Abort::Cancelled => write!(f, "cancelled by operator"),
        }
    }
}

// How a session ended. `Committed` and `RolledBack` are clean outcomes;
// the partial variants mean the cluster needs repair before the next
// change (some nodes answered the final fan-out, some did not).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Committed {
        change: ChangeId,
        version: Version,
    },
    PartiallyCommitted {
        change: ChangeId,
        version: Version,
        committed: Vec<NodeId>,
        stuck: Vec<NodeId>,
    },
    RolledBack {
        change: ChangeId,
        abort: Abort,
    },
    PartiallyRolledBack {
        change: ChangeId,
        rolled_back: Vec<NodeId>,
        stuck: Vec<NodeId>,
        abort: Abort,
    },
    /// Stopped before any node accepted anything.
    Aborted(Abort),
}

impl Verdict {
    pub fn clean(&self) -> bool {
        matches!(self, Verdict::Committed { .. })
    }
}

pub struct Session<T: Transport> {
    transport: T,
    who: Identity,
    deadline: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, who: Identity) -> Self {
        Session {
            transport,
            who,
            deadline: Duration::from_secs(10),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Discover every target. Transport failures become the unreachable
    /// list; any other fault propagates.
    pub fn discover_all(
        &self,
        targets: &[NodeId],
    ) -> Result<std::result::Result<BTreeMap<NodeId, Discovery>, Vec<NodeId>>> {
        let mut out = BTreeMap::new();
        let mut unreachable = Vec::new();
        for &node in targets {
            match self.transport.call(node, &Req::Discover, self.deadline) {
                Ok(Resp::Discover(d)) => {
                    out.insert(node, *d);
                }
                Ok(_) => return Err(ballast_base::err("mismatched response to discover")),
                Err(e) if is_unreachable(&e) => unreachable.push(node),
                Err(e) => return Err(e),
            }
        }
        if unreachable.is_empty() {
            Ok(Ok(out))
        } else {
            Ok(Err(unreachable))
        }
    }

    /// Run one complete change session against `targets`.
    pub fn run(&self, targets: &[NodeId], op: &ChangeOp, cancel: &CancelToken) -> Result<Verdict> {
        // Phase A: first discovery.
        let discoveries = match self.discover_all(targets)? {
            Ok(d) => d,
            Err(unreachable) => {
                return Ok(Verdict::Aborted(Abort::PartialCluster { unreachable }));
            }
        };
        let in_flight: Vec<NodeId> = discoveries
            .iter()
            .filter(|(_, d)| d.prepared())
            .map(|(n, _)| *n)
            .collect();
        if !in_flight.is_empty() {
            return Ok(Verdict::Aborted(Abort::PriorChangeInFlight { nodes: in_flight }));
        }
        if let Some(divergence) = disagreement(&discoveries) {
            return Ok(Verdict::Aborted(Abort::InconsistentCluster { divergence }));
        }

        // Phase B: mint identity and version, pin expected counters.
        // The new version extends the longest chain, not the committed
        // version: a rolled-back tail still owns its version number.
        let change = ChangeId::mint();
        let version = discoveries
            .values()
            .map(|d| d.highest_version)
            .max()
            .unwrap_or(Version::BOOTSTRAP)
            .next();
        info!(
            target: "ballast",
            %change,
            %version,
            op = %op.describe(),
            targets = targets.len(),
            "change session start"
        );

        if cancel.is_cancelled() {
            return Ok(Verdict::Aborted(Abort::Cancelled));
        }

        // Phase C: prepare fan-out. Stop at the first failure and unwind.
        let mut accepted: Vec<(NodeId, i64)> = Vec::new();
        for (&node, d) in &discoveries {
            if cancel.is_cancelled() {
                return Ok(self.unwind(change, &accepted, Abort::Cancelled));
            }
            let req = Req::Prepare {
                who: self.who.clone(),
                expected_mutative_count: d.mutative_message_count,
                change,
                version,
                op: op.clone(),
            };
            let failure = match self.transport.call(node, &req, self.deadline) {
                Ok(Resp::Prepare(MutationReply::Accepted { counters })) => {
                    accepted.push((node, counters.mutative_message_count));
                    None
                }
                Ok(Resp::Prepare(reply)) => {
                    let (kind, reason) = reply.rejection().expect("non-accepted reply rejects");
                    Some(Abort::Rejected {
                        node,
                        kind: Some(kind),
                        reason: reason.to_string(),
                    })
                }
                Ok(_) => return Err(ballast_base::err("mismatched response to prepare")),
                Err(e) if is_unreachable(&e) => Some(Abort::Rejected {
                    node,
                    kind: None,
                    reason: format!("unreachable during prepare: {}", e),
                }),
                Err(e) => return Err(e),
            };
            if let Some(abort) = failure {
                return Ok(self.unwind(change, &accepted, abort));
            }
        }

        // Phase D: second discovery. Every tail must be our change.
        match self.discover_all(targets)? {
            Ok(again) => {
                for (&node, d) in &again {
                    let ours = d.tail.as_ref().map(|t| t.id) == Some(change);
                    if !ours {
                        return Ok(self.unwind(change, &accepted, Abort::RaceDetected { node }));
                    }
                }
            }
            Err(unreachable) => {
                let abort = Abort::PartialCluster { unreachable };
                return Ok(self.unwind(change, &accepted, abort));
            }
        }

        if cancel.is_cancelled() {
            return Ok(self.unwind(change, &accepted, Abort::Cancelled));
        }

        // Phase E: the outcome is decided; the commit fan-out runs to the
        // end no matter what answers come back.
        let mut committed = Vec::new();
        let mut stuck = Vec::new();
        for &(node, expected) in &accepted {
            let req = Req::Commit {
                who: self.who.clone(),
                expected_mutative_count: expected,
                change,
            };
            match self.transport.call(node, &req, self.deadline) {
                Ok(Resp::Commit(MutationReply::Accepted { .. })) => committed.push(node),
                Ok(Resp::Commit(reply)) => {
                    let (kind, reason) = reply.rejection().expect("non-accepted reply rejects");
                    warn!(target: "ballast", %node, %kind, %reason, "commit rejected");
                    stuck.push(node);
                }
                Ok(_) => return Err(ballast_base::err("mismatched response to commit")),
                Err(e) if is_unreachable(&e) => {
                    warn!(target: "ballast", %node, "unreachable during commit");
                    stuck.push(node);
                }
                Err(e) => return Err(e),
            }
        }
        if stuck.is_empty() {
            info!(target: "ballast", %change, %version, "change committed");
            Ok(Verdict::Committed { change, version })
        } else {
            warn!(
                target: "ballast",
                %change,
                committed = committed.len(),
                stuck = stuck.len(),
                "partial commit; repair required"
            );
            Ok(Verdict::PartiallyCommitted {
                change,
                version,
                committed,
                stuck,
            })
        }
    }

    // Roll back every node that accepted our prepare, then report the
    // abort that sent us here.
    fn unwind(&self, change: ChangeId, accepted: &[(NodeId, i64)], abort: Abort) -> Verdict {
        if accepted.is_empty() {
            return Verdict::Aborted(abort);
        }
        warn!(target: "ballast", %change, %abort, "unwinding prepare");
        let mut rolled_back = Vec::new();
        let mut stuck = Vec::new();
        for &(node, expected) in accepted {
            let req = Req::Rollback {
                who: self.who.clone(),
                expected_mutative_count: expected,
                change,
            };
            match self.transport.call(node, &req, self.deadline) {
                Ok(Resp::Rollback(MutationReply::Accepted { .. })) => rolled_back.push(node),
                Ok(_) | Err(_) => stuck.push(node),
            }
        }
        if stuck.is_empty() {
            Verdict::RolledBack { change, abort }
        } else {
            Verdict::PartiallyRolledBack {
                change,
                rolled_back,
                stuck,
                abort,
            }
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.who
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn deadline(&self) -> Duration {
        self.deadline
    }
}

// Pairwise agreement on the committed configuration: everyone must report
// the same current version and the same latest committed change id.
fn disagreement(discoveries: &BTreeMap<NodeId, Discovery>) -> Option<Vec<Divergence>> {
    let mut first: Option<(Version, Option<ChangeId>)> = None;
    let mut diverged = false;
    for d in discoveries.values() {
        let this = (d.current_version, d.current_id);
        match first {
            None => first = Some(this),
            Some(f) if f != this => diverged = true,
            Some(_) => {}
        }
    }
    if !diverged {
        return None;
    }
    Some(
        discoveries
            .iter()
            .map(|(&node, d)| Divergence {
                node,
                current_version: d.current_version,
                current_id: d.current_id,
            })
            .collect(),
    )
}
