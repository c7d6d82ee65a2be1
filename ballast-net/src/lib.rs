// Coordinator <-> node messaging. All inter-node communication takes the
// form of a request enum and a response enum; both are carried as
// msgpack behind a one-byte wire format version. The transport itself is
// a trait seam: production deployments bring their own RPC, tests and
// single-process deployments use the in-memory loopback.

mod codec;
mod msg;
mod transport;

pub use codec::{decode_req, decode_resp, encode_req, encode_resp, WIRE_VERS};
pub use msg::{Counters, Discovery, Mode, MutationReply, RejectKind, Req, Resp, TailInfo};
pub use transport::{is_unreachable, unreachable, Endpoint, Loopback, Transport};

#[cfg(test)]
mod test;
