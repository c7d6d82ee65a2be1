use std::sync::Mutex;

use tracing::error;

use ballast_base::{err, Result};
use ballast_net::{Endpoint, Req, Resp};

use crate::engine::Engine;

// The serialized wrapper around an engine: one mutative request at a
// time, in arrival order. If the engine ever reports a fault (journal
// write or fsync failure), the server halts: the node can no longer
// promise that acknowledged state is durable, so it stops acknowledging
// anything until an operator restarts it.
pub struct Server {
    inner: Mutex<Inner>,
}

struct Inner {
    engine: Engine,
    halted: bool,
}

impl Server {
    pub fn new(engine: Engine) -> Server {
        Server {
            inner: Mutex::new(Inner {
                engine,
                halted: false,
            }),
        }
    }

    /// Run a closure against the engine outside the request path (local
    /// tooling, tests, the single-process CLI).
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut Engine) -> T) -> T {
        let mut inner = self.inner.lock().expect("engine mutex poisoned");
        f(&mut inner.engine)
    }
}

impl Endpoint for Server {
    fn handle(&self, req: Req) -> Result<Resp> {
        let mut inner = self.inner.lock().expect("engine mutex poisoned");
        if inner.halted {
            return Err(err("node halted after a durability failure"));
        }
        let resp = match req {
            Req::Discover => Ok(Resp::Discover(Box::new(inner.engine.discover()))),
            Req::Prepare {
                who,
                expected_mutative_count,
                change,
                version,
                op,
            } => inner
                .engine
                .prepare(&who, expected_mutative_count, change, version, &op)
                .map(Resp::Prepare),
            Req::Commit {
                who,
                expected_mutative_count,
                change,
            } => inner
                .engine
                .commit(&who, expected_mutative_count, change)
                .map(Resp::Commit),
            Req::Rollback {
                who,
                expected_mutative_count,
                change,
            } => inner
                .engine
                .rollback(&who, expected_mutative_count, change)
                .map(Resp::Rollback),
            Req::TakeOver {
                who,
                expected_mutative_count,
                change,
            } => inner
                .engine
                .take_over(&who, expected_mutative_count, change)
                .map(|(reply, tail)| Resp::TakeOver { reply, tail }),
        };
        if resp.is_err() {
            error!(
                target: "ballast",
                node = %inner.engine.node(),
                "engine fault; halting node"
            );
            inner.halted = true;
        }
        resp
    }
}
