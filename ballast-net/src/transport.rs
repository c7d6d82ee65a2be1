use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ballast_base::{Error, NodeId, Result};

use crate::codec::{decode_req, decode_resp, encode_req, encode_resp};
use crate::msg::{Req, Resp};

/// The error a transport reports when a peer cannot be reached within the
/// deadline. Carried as an io error so callers can tell it apart from
/// local faults with [`Error::is_io_kind`].
pub fn unreachable(node: NodeId) -> Error {
    Error::new(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        format!("{} unreachable", node),
    ))
}

pub fn is_unreachable(e: &Error) -> bool {
    e.is_io_kind(std::io::ErrorKind::NotConnected)
        || e.is_io_kind(std::io::ErrorKind::TimedOut)
}

// The server side of the seam: something that can take one decoded
// request and produce a response. Node servers implement this.
pub trait Endpoint: Send + Sync {
    fn handle(&self, req: Req) -> Result<Resp>;
}

// The client side of the seam. Every call carries a deadline; a transport
// that cannot produce a response in time reports `unreachable`.
pub trait Transport {
    fn call(&self, node: NodeId, req: &Req, deadline: Duration) -> Result<Resp>;
}

#[derive(Clone)]
struct Peer {
    endpoint: Arc<dyn Endpoint>,
    reachable: bool,
}

// In-process transport: a registry of endpoints keyed by node id, with a
// per-node reachability toggle so tests can take nodes off the network.
// Messages still round-trip through the codec, so everything a real
// transport would serialize gets exercised.
#[derive(Clone, Default)]
pub struct Loopback {
    peers: Arc<Mutex<BTreeMap<NodeId, Peer>>>,
}

impl Loopback {
    pub fn new() -> Self {
        Loopback::default()
    }

    pub fn register(&self, node: NodeId, endpoint: Arc<dyn Endpoint>) {
        self.peers.lock().expect("loopback registry poisoned").insert(
            node,
            Peer {
                endpoint,
                reachable: true,
            },
        );
    }

    pub fn set_reachable(&self, node: NodeId, reachable: bool) {
        if let Some(peer) = self
            .peers
            .lock()
            .expect("loopback registry poisoned")
            .get_mut(&node)
        {
            peer.reachable = reachable;
        }
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.peers
            .lock()
            .expect("loopback registry poisoned")
            .keys()
            .copied()
            .collect()
    }
}

impl Transport for Loopback {
    fn call(&self, node: NodeId, req: &Req, _deadline: Duration) -> Result<Resp> {
        let peer = {
            let peers = self.peers.lock().expect("loopback registry poisoned");
            match peers.get(&node) {
                Some(p) if p.reachable => p.clone(),
                _ => return Err(unreachable(node)),
            }
        };
        let wire = encode_req(req)?;
        let resp = peer.endpoint.handle(decode_req(&wire)?)?;
        decode_resp(&encode_resp(&resp)?)
    }
}
