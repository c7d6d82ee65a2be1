use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use ballast_base::{err, ChangeId, Result, Stamp, Version};
use ballast_model::Cluster;

use crate::journal::{Frame, Journal};
use crate::record::{ChangeRecord, ChangeState};

// Opaque audit marker. The protocol never interprets these; they are
// appended by operators/tooling and handed back verbatim by discover.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub at: Version,
    pub note: String,
}

// The chain-level view over one node's journal. Holds every record in
// version order (records[i] has version i+1) and enforces the chain
// invariants on every mutation:
//
//   - records link parent-to-child with contiguous versions from 1
//   - at most one non-terminal record, and only as the tail
//   - terminal states never change
//
// Violations coming in through the API are log conflicts (a protocol bug
// or a competing writer); violations found at replay are corruption and
// refuse startup.
pub struct ChangeLog {
    journal: Journal,
    records: Vec<ChangeRecord>,
    checkpoints: Vec<Checkpoint>,
    /// Count of seal frames replayed or appended; prepares + seals is the
    /// node's mutative message count.
    seals: i64,
}

impl ChangeLog {
    pub fn open(path: &Path) -> Result<ChangeLog> {
        let (journal, frames) = Journal::open(path)?;
        let mut log = ChangeLog {
            journal,
            records: Vec::new(),
            checkpoints: Vec::new(),
            seals: 0,
        };
        for frame in frames {
            log.replay(frame)?;
        }
        info!(
            target: "ballast",
            path = %log.journal.path().display(),
            records = log.records.len(),
            "change log open"
        );
        Ok(log)
    }

    // Replayed frames went through the journal's CRC, so any chain
    // violation here is real corruption, not a torn write.
    fn replay(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Record(r) => {
                self.check_chain(&r).map_err(|_| err("journal chain is broken"))?;
                self.records.push(*r);
            }
            Frame::Seal { id, state, approved } => {
                self.check_seal(id, state)
                    .map_err(|_| err("journal seal does not match its tail"))?;
                self.apply_seal(state, approved);
            }
            Frame::Checkpoint(c) => self.checkpoints.push(c),
        }
        Ok(())
    }

    fn check_chain(&self, r: &ChangeRecord) -> Result<()> {
        if r.state != ChangeState::Prepared {
            return Err(err("log conflict: appended record must be prepared"));
        }
        match self.records.last() {
            None => {
                if r.parent.is_some() {
                    return Err(err("log conflict: first record must have no parent"));
                }
                if r.version != Version(1) {
                    return Err(err("log conflict: first record must be version 1"));
                }
            }
            Some(tail) => {
                if !tail.state.is_terminal() {
                    return Err(err("log conflict: tail is not terminal"));
                }
                if r.parent != Some(tail.id) {
                    return Err(err("log conflict: parent does not match tail"));
                }
                if r.version != tail.version.next() {
                    return Err(err("log conflict: version is not contiguous"));
                }
            }
        }
        Ok(())
    }

    fn check_seal(&self, id: ChangeId, state: ChangeState) -> Result<()> {
        if !state.is_terminal() {
            return Err(err("log conflict: seal state must be terminal"));
        }
        match self.records.last() {
            Some(tail) if tail.state == ChangeState::Prepared && tail.id == id => Ok(()),
            _ => Err(err("log conflict: seal does not match a prepared tail")),
        }
    }

    fn apply_seal(&mut self, state: ChangeState, approved: Stamp) {
        let tail = self.records.last_mut().expect("seal checked against tail");
        tail.state = state;
        tail.approved = Some(approved);
        self.seals += 1;
    }

    /// Durably append a freshly prepared record. Fails with a log
    /// conflict if the record does not extend the current tail.
    pub fn append(&mut self, record: ChangeRecord) -> Result<()> {
        self.check_chain(&record)?;
        self.journal.append(&Frame::Record(Box::new(record.clone())))?;
        self.records.push(record);
        Ok(())
    }

    /// Durably move the prepared tail to a terminal state, recording the
    /// approval stamp. Fails with a log conflict if the tail is not the
    /// prepared record `id`.
    pub fn seal(&mut self, id: ChangeId, state: ChangeState, approved: Stamp) -> Result<()> {
        self.check_seal(id, state)?;
        self.journal.append(&Frame::Seal {
            id,
            state,
            approved: approved.clone(),
        })?;
        self.apply_seal(state, approved);
        Ok(())
    }

    /// Durably append an opaque checkpoint marker.
    pub fn checkpoint(&mut self, note: impl Into<String>) -> Result<()> {
        let c = Checkpoint {
            at: self.highest_version(),
            note: note.into(),
        };
        self.journal.append(&Frame::Checkpoint(c.clone()))?;
        self.checkpoints.push(c);
        Ok(())
    }

    pub fn head(&self) -> Option<&ChangeRecord> {
        self.records.last()
    }

    pub fn get(&self, version: Version) -> Option<&ChangeRecord> {
        if version.0 < 1 {
            return None;
        }
        self.records.get((version.0 - 1) as usize)
    }

    /// The highest committed record, if any. Its result is the node's
    /// current configuration.
    pub fn current(&self) -> Option<&ChangeRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.state == ChangeState::Committed)
    }

    /// Version of the current committed configuration; BOOTSTRAP when no
    /// change has ever committed.
    pub fn current_version(&self) -> Version {
        self.current().map(|r| r.version).unwrap_or(Version::BOOTSTRAP)
    }

    /// Version of the tail record, prepared or terminal.
    pub fn highest_version(&self) -> Version {
        self.head().map(|r| r.version).unwrap_or(Version::BOOTSTRAP)
    }

    /// The configuration to run: latest committed result, or the given
    /// bootstrap configuration when nothing has committed yet.
    pub fn current_config<'a>(&'a self, bootstrap: &'a Cluster) -> &'a Cluster {
        self.current().map(|r| &r.result).unwrap_or(bootstrap)
    }

    /// Total accepted mutative messages (prepares + commits + rollbacks),
    /// derived from the journal rather than stored.
    pub fn mutative_message_count(&self) -> i64 {
        self.records.len() as i64 + self.seals
    }

    /// Stamp of the most recent accepted mutation, for discover.
    pub fn last_mutation(&self) -> Option<&Stamp> {
        let tail = self.head()?;
        tail.approved.as_ref().or(Some(&tail.created))
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }
}
