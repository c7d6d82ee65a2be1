use std::path::Path;

use tracing::{info, warn};

use ballast_base::{ChangeId, Identity, NodeId, Result, Stamp, Version};
use ballast_log::{ChangeLog, ChangeRecord, ChangeState};
use ballast_model::{evaluate, ChangeOp, Cluster, Verdict};
use ballast_net::{Counters, Discovery, Mode, MutationReply, RejectKind, TailInfo};

// The protocol engine for one node. Owns the change log and the node's
// bootstrap configuration; everything else it reports (state, counters,
// current configuration) is derived from the log.
pub struct Engine {
    node: NodeId,
    mode: Mode,
    log: ChangeLog,
    bootstrap: Cluster,
}

impl Engine {
    pub fn open(node: NodeId, mode: Mode, journal: &Path, bootstrap: Cluster) -> Result<Engine> {
        let log = ChangeLog::open(journal)?;
        Ok(Engine {
            node,
            mode,
            log,
            bootstrap,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The configuration this node is currently running.
    pub fn current_config(&self) -> &Cluster {
        self.log.current_config(&self.bootstrap)
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    fn counters(&self) -> Counters {
        Counters {
            mutative_message_count: self.log.mutative_message_count(),
            current_version: self.log.current_version(),
            highest_version: self.log.highest_version(),
        }
    }

    fn reject(&self, what: &str, kind: RejectKind, reason: impl Into<String>) -> MutationReply {
        let reason = reason.into();
        warn!(target: "ballast", node = %self.node, what, %kind, %reason, "rejected");
        MutationReply::Rejected {
            kind,
            reason,
            counters: self.counters(),
        }
    }

    // The optimistic-concurrency gate: the caller states the mutative
    // count it saw at discovery; any intervening accepted mutation makes
    // the counts disagree and the request bounces.
    fn check_counter(&self, what: &str, expected: i64) -> Option<MutationReply> {
        let count = self.log.mutative_message_count();
        if expected != count {
            return Some(self.reject(
                what,
                RejectKind::Concurrent,
                format!("expected mutative count {}, node is at {}", expected, count),
            ));
        }
        None
    }

    fn check_active(&self, what: &str) -> Option<MutationReply> {
        if self.mode != Mode::ActiveCoordinator {
            return Some(self.reject(
                what,
                RejectKind::PassiveMode,
                "node is a passive mirror; address the stripe's active",
            ));
        }
        None
    }

    /// Read-only status snapshot.
    pub fn discover(&self) -> Discovery {
        Discovery {
            mode: self.mode,
            mutative_message_count: self.log.mutative_message_count(),
            last_mutation: self.log.last_mutation().cloned(),
            current_version: self.log.current_version(),
            current_id: self.log.current().map(|r| r.id),
            highest_version: self.log.highest_version(),
            tail: self.log.head().map(|r| TailInfo {
                id: r.id,
                state: r.state,
                version: r.version,
                summary: r.summary(),
            }),
            checkpoints: self.log.checkpoints().to_vec(),
        }
    }

    /// Evaluate and durably stage a change. Legal only while the tail is
    /// terminal; the accepted record is the new prepared tail.
    pub fn prepare(
        &mut self,
        who: &Identity,
        expected_mutative_count: i64,
        change: ChangeId,
        version: Version,
        op: &ChangeOp,
    ) -> Result<MutationReply> {
        if let Some(r) = self.check_active("prepare") {
            return Ok(r);
        }
        if let Some(tail) = self.log.head() {
            if tail.state == ChangeState::Prepared {
                let reason = format!("change {} is already prepared", tail.id);
                return Ok(self.reject("prepare", RejectKind::AlreadyPrepared, reason));
            }
        }
        if let Some(r) = self.check_counter("prepare", expected_mutative_count) {
            return Ok(r);
        }
        if version != self.log.highest_version().next() {
            let reason = format!(
                "version {} does not extend {}",
                version,
                self.log.highest_version()
            );
            return Ok(self.reject("prepare", RejectKind::BadVersion, reason));
        }
        let candidate = match evaluate(self.current_config(), op) {
            Verdict::Accept(c) => c,
            Verdict::Reject(reason) => {
                return Ok(self.reject("prepare", RejectKind::EvaluationReject, reason));
            }
        };
        let record = ChangeRecord {
            id: change,
            parent: self.log.head().map(|r| r.id),
            version,
            state: ChangeState::Prepared,
            op: op.clone(),
            result: *candidate,
            created: Stamp::applied_now(who),
            approved: None,
        };
        self.log.append(record)?;
        info!(
            target: "ballast",
            node = %self.node,
            change = %change,
            %version,
            op = %op.describe(),
            "prepared"
        );
        Ok(MutationReply::Accepted {
            counters: self.counters(),
        })
    }

    // Commit and rollback share their legality rules: the tail must be
    // the prepared record for `change` and the counter must match.
    fn close(
        &mut self,
        what: &str,
        who: &Identity,
        expected_mutative_count: i64,
        change: ChangeId,
        state: ChangeState,
    ) -> Result<MutationReply> {
        if let Some(r) = self.check_active(what) {
            return Ok(r);
        }
        match self.log.head() {
            Some(tail) if tail.state == ChangeState::Prepared => {
                if tail.id != change {
                    let reason = format!("prepared change is {}, not {}", tail.id, change);
                    return Ok(self.reject(what, RejectKind::UuidMismatch, reason));
                }
            }
            _ => {
                return Ok(self.reject(what, RejectKind::NotPrepared, "no prepared change"));
            }
        }
        if let Some(r) = self.check_counter(what, expected_mutative_count) {
            return Ok(r);
        }
        self.log.seal(change, state, Stamp::applied_now(who))?;
        info!(
            target: "ballast",
            node = %self.node,
            change = %change,
            outcome = %state,
            current = %self.log.current_version(),
            "sealed"
        );
        Ok(MutationReply::Accepted {
            counters: self.counters(),
        })
    }

    /// Make the prepared change current.
    pub fn commit(
        &mut self,
        who: &Identity,
        expected_mutative_count: i64,
        change: ChangeId,
    ) -> Result<MutationReply> {
        self.close("commit", who, expected_mutative_count, change, ChangeState::Committed)
    }

    /// Abandon the prepared change; the current configuration stands.
    pub fn rollback(
        &mut self,
        who: &Identity,
        expected_mutative_count: i64,
        change: ChangeId,
    ) -> Result<MutationReply> {
        self.close(
            "rollback",
            who,
            expected_mutative_count,
            change,
            ChangeState::RolledBack,
        )
    }

    /// Grant a new coordinator the right to resolve an abandoned prepared
    /// change. Read-only: the grant is advisory and does not advance the
    /// mutative count; the commit or rollback that follows does.
    pub fn take_over(
        &mut self,
        who: &Identity,
        expected_mutative_count: i64,
        change: ChangeId,
    ) -> Result<(MutationReply, Option<Box<ChangeRecord>>)> {
        if let Some(r) = self.check_active("take-over") {
            return Ok((r, None));
        }
        let tail = match self.log.head() {
            Some(tail) if tail.state == ChangeState::Prepared => tail.clone(),
            _ => {
                let r = self.reject("take-over", RejectKind::NotPrepared, "no prepared change");
                return Ok((r, None));
            }
        };
        if tail.id != change {
            let reason = format!("prepared change is {}, not {}", tail.id, change);
            return Ok((self.reject("take-over", RejectKind::UuidMismatch, reason), None));
        }
        if let Some(r) = self.check_counter("take-over", expected_mutative_count) {
            return Ok((r, None));
        }
        info!(
            target: "ballast",
            node = %self.node,
            change = %change,
            by_host = %who.host,
            by_user = %who.user,
            "take-over granted"
        );
        Ok((
            MutationReply::Accepted {
                counters: self.counters(),
            },
            Some(Box::new(tail)),
        ))
    }

    /// Append an opaque audit marker to the journal.
    pub fn checkpoint(&mut self, note: impl Into<String>) -> Result<()> {
        self.log.checkpoint(note)
    }
}
