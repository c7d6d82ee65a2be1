// The durable half of the protocol: every node owns one append-only
// journal file holding its chain of configuration change records. The
// journal is the only thing that has to survive a crash; everything else
// (current configuration, counters, node state) is rebuilt from it at
// startup.
//
// Layering:
//
//   ChangeRecord   the immutable unit: id, parent link, version, state,
//                  payload op, evaluated result, creation/approval stamps.
//   Journal        frame-level file access: magic header, format version,
//                  length + crc32c framed msgpack bodies, fsync before
//                  acknowledge, truncate-at-tail recovery.
//   ChangeLog      the chain-level view: enforces parent/version
//                  contiguity, one non-terminal tail at most, seal
//                  transitions, and derives the audit counters.


mod journal;
mod log;
mod record;

pub use journal::{Frame, Journal};
pub use log::{ChangeLog, Checkpoint};
pub use record::{ChangeRecord, ChangeState};
