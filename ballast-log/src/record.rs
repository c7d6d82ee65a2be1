use serde::{Deserialize, Serialize};

use ballast_base::{ChangeId, Stamp, Version};
use ballast_model::{ChangeOp, Cluster};

// The three states a change record can be in. Prepared is the only
// non-terminal state, and only the tail record of a log may carry it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum ChangeState {
    Prepared,
    Committed,
    RolledBack,
}

impl ChangeState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChangeState::Prepared)
    }
}

impl std::fmt::Display for ChangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeState::Prepared => write!(f, "PREPARED"),
            ChangeState::Committed => write!(f, "COMMITTED"),
            ChangeState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

// One link of a node's change chain. Written once at prepare time; the
// only later mutation is the seal that moves state to a terminal value
// and fills the approval stamp. Everything else is immutable.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: ChangeId,
    /// Id of the immediately preceding record; absent only on the first
    /// record of the chain.
    pub parent: Option<ChangeId>,
    /// Contiguous from 1; also the version of `result` once committed.
    pub version: Version,
    pub state: ChangeState,
    /// The operation that was proposed.
    pub op: ChangeOp,
    /// The full candidate configuration the evaluator produced for `op`
    /// against this record's parent configuration.
    pub result: Cluster,
    /// Host/user/time of the accepted prepare. Time is assigned by the
    /// node at durable append, never by the client.
    pub created: Stamp,
    /// Host/user/time of the commit or rollback; None while prepared.
    pub approved: Option<Stamp>,
}

impl ChangeRecord {
    pub fn summary(&self) -> String {
        format!(
            "{} {} {} ({})",
            self.version,
            self.state,
            self.id,
            self.op.describe()
        )
    }
}
