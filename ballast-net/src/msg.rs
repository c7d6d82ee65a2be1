use serde::{Deserialize, Serialize};

use ballast_base::{ChangeId, Identity, Stamp, Version};
use ballast_log::{ChangeRecord, ChangeState, Checkpoint};
use ballast_model::ChangeOp;

// Whether a node is the write-accepting head of its stripe or a mirror.
// Only actives accept mutative traffic from a coordinator; passives learn
// committed configurations through platform replication.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Mode {
    ActiveCoordinator,
    Passive,
}

// The tail record of a node's log, as seen by discover: enough for a
// coordinator to verify agreement and to drive recovery, without
// shipping the whole record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TailInfo {
    pub id: ChangeId,
    pub state: ChangeState,
    pub version: Version,
    pub summary: String,
}

// The read-only status snapshot every protocol session starts from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub mode: Mode,
    pub mutative_message_count: i64,
    pub last_mutation: Option<Stamp>,
    /// Version of the highest committed configuration (0 = bootstrap).
    pub current_version: Version,
    /// Id of the highest committed change, if any ever committed.
    pub current_id: Option<ChangeId>,
    /// Version of the tail record, committed or prepared.
    pub highest_version: Version,
    pub tail: Option<TailInfo>,
    pub checkpoints: Vec<Checkpoint>,
}

impl Discovery {
    pub fn prepared(&self) -> bool {
        matches!(
            self.tail,
            Some(TailInfo {
                state: ChangeState::Prepared,
                ..
            })
        )
    }
}

// Counter snapshot attached to every mutation reply, accepted or not, so
// the coordinator always learns where the node ended up.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub mutative_message_count: i64,
    pub current_version: Version,
    pub highest_version: Version,
}

// Typed rejection kinds, mirrored verbatim to the operator. Rejections
// are values: the request was understood and declined, the node is fine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum RejectKind {
    /// The node accepted a mutation since the coordinator's discovery.
    Concurrent,
    /// A prepare arrived while the tail is already prepared.
    AlreadyPrepared,
    /// A commit/rollback/take-over arrived but the tail is not prepared.
    NotPrepared,
    /// The tail is prepared, but for a different change id.
    UuidMismatch,
    /// The prepare's version does not extend this node's chain.
    BadVersion,
    /// The evaluator declined the change.
    EvaluationReject,
    /// Mutative traffic sent to a passive node.
    PassiveMode,
}

impl std::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectKind::Concurrent => "concurrent mutation",
            RejectKind::AlreadyPrepared => "already prepared",
            RejectKind::NotPrepared => "not prepared",
            RejectKind::UuidMismatch => "uuid mismatch",
            RejectKind::BadVersion => "bad version",
            RejectKind::EvaluationReject => "evaluation rejected",
            RejectKind::PassiveMode => "passive mode",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MutationReply {
    Accepted {
        counters: Counters,
    },
    Rejected {
        kind: RejectKind,
        reason: String,
        counters: Counters,
    },
}

impl MutationReply {
    pub fn accepted(&self) -> bool {
        matches!(self, MutationReply::Accepted { .. })
    }

    pub fn counters(&self) -> Counters {
        match self {
            MutationReply::Accepted { counters } => *counters,
            MutationReply::Rejected { counters, .. } => *counters,
        }
    }

    pub fn rejection(&self) -> Option<(RejectKind, &str)> {
        match self {
            MutationReply::Accepted { .. } => None,
            MutationReply::Rejected { kind, reason, .. } => Some((*kind, reason)),
        }
    }
}

// Requests. Every mutative request names the originating operator and the
// mutative-message count it observed at discovery; the count is the
// optimistic-concurrency check that keeps two coordinators from
// interleaving.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Req {
    Discover,
    Prepare {
        who: Identity,
        expected_mutative_count: i64,
        change: ChangeId,
        version: Version,
        op: ChangeOp,
    },
    Commit {
        who: Identity,
        expected_mutative_count: i64,
        change: ChangeId,
    },
    Rollback {
        who: Identity,
        expected_mutative_count: i64,
        change: ChangeId,
    },
    TakeOver {
        who: Identity,
        expected_mutative_count: i64,
        change: ChangeId,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Resp {
    Discover(Box<Discovery>),
    Prepare(MutationReply),
    Commit(MutationReply),
    Rollback(MutationReply),
    TakeOver {
        reply: MutationReply,
        /// The prepared tail record, on success, so the new coordinator
        /// can decide commit vs rollback with full context.
        tail: Option<Box<ChangeRecord>>,
    },
}
