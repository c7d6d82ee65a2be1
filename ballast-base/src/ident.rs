use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
use test_log::test;

// Every node of the realm has a unique NodeId. Transport endpoints,
// journal directories and coordinator target sets are all keyed by it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

// A change is identified by a 128-bit id, unique across the history of
// the cluster. Minted once per coordinator session, never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub Uuid);

impl ChangeId {
    pub fn mint() -> Self {
        ChangeId(Uuid::new_v4())
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Versions number the records of a node's change log, contiguously from 1.
// Version 0 is reserved for the bootstrap (empty) configuration, which has
// no record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Version(pub i64);

impl Version {
    pub const BOOTSTRAP: Version = Version(0);

    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// WallTime is a wall-clock time-point in signed 64-bit microseconds since
// the epoch. This is sufficient to span 292,471 years. Timestamps are
// always assigned server-side at the moment of durable append; clients
// never set them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct WallTime(pub i64);

impl WallTime {
    pub fn now() -> Self {
        WallTime(chrono::Utc::now().timestamp_micros())
    }

    pub fn micros(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for WallTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp_micros(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
            None => write!(f, "@{}us", self.0),
        }
    }
}

// Who is asking: the originating host and user of a mutative request.
// Carried on the wire with every prepare/commit/rollback/take-over.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub host: String,
    pub user: String,
}

impl Identity {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Identity {
            host: host.into(),
            user: user.into(),
        }
    }

    /// Best-effort identity of the calling process, for the operator CLI.
    pub fn from_env() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        Identity { host, user }
    }
}

// An identity plus the server-assigned instant it acted. Creation and
// approval stamps on change records are both of this shape.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub host: String,
    pub user: String,
    pub at: WallTime,
}

impl Stamp {
    pub fn applied_now(who: &Identity) -> Self {
        Stamp {
            host: who.host.clone(),
            user: who.user.clone(),
            at: WallTime::now(),
        }
    }
}

#[test]
fn test_version_chain() {
    let v = Version::BOOTSTRAP;
    assert_eq!(v.next(), Version(1));
    assert_eq!(v.next().next(), Version(2));
    assert!(v < v.next());
}

#[test]
fn test_change_ids_unique() {
    assert_ne!(ChangeId::mint(), ChangeId::mint());
}

#[test]
fn test_walltime_display() {
    let t = WallTime(0);
    assert_eq!(format!("{}", t), "1970-01-01T00:00:00.000000Z");
}
