// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
//
// Note that protocol _rejections_ (a node declining a prepare, say) are not errors:
// they are ordinary values carried in responses. Error is reserved for faults:
// I/O, corrupt journals, codec failures, unreachable peers, broken invariants.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

#[derive(Debug)]
pub struct Error {
    inner: DynBacktraceError,
    msg: String,
    io_kind: Option<std::io::ErrorKind>,
}
pub type Result<T> = std::result::Result<T, Error>;

struct MsgErr(Cow<'static, str>);
impl std::fmt::Debug for MsgErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for MsgErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for MsgErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

fn find_io_kind(err: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if let Some(ioe) = e.downcast_ref::<std::io::Error>() {
            return Some(ioe.kind());
        }
        cur = e.source();
    }
    None
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        error!(target: "ballast", "{:?}", err);
        let io_kind = find_io_kind(&err);
        let msg = err.to_string();
        Error {
            inner: DynBacktraceError::from(err),
            msg,
            io_kind,
        }
    }

    /// True when the underlying fault is the given std::io error kind. The
    /// coordinator uses this to tell an unreachable peer apart from a local fault.
    pub fn is_io_kind(&self, kind: std::io::ErrorKind) -> bool {
        self.io_kind == Some(kind)
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(MsgErr(msg.into()))
}

#[test]
fn test_error() {
    let e = err("boom");
    assert!(format!("{}", e).contains("boom"));
}

#[test]
fn test_io_kind() {
    let ioe = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
    let e = Error::new(ioe);
    assert!(e.is_io_kind(std::io::ErrorKind::TimedOut));
    assert!(!e.is_io_kind(std::io::ErrorKind::NotFound));
    assert!(!err("plain").is_io_kind(std::io::ErrorKind::TimedOut));
}
