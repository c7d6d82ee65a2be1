use std::sync::Arc;
use std::time::Duration;

use test_log::test;

use ballast_base::{ChangeId, Identity, NodeId, Stamp, Version};
use ballast_log::{ChangeRecord, ChangeState, Checkpoint};
use ballast_model::{ChangeOp, Cluster, NodeAddr, Target};

use crate::{
    decode_req, decode_resp, encode_req, encode_resp, is_unreachable, Counters, Discovery,
    Endpoint, Loopback, Mode, MutationReply, RejectKind, Req, Resp, TailInfo, Transport,
};

fn who() -> Identity {
    Identity::new("ophost", "operator")
}

fn counters() -> Counters {
    Counters {
        mutative_message_count: 7,
        current_version: Version(3),
        highest_version: Version(4),
    }
}

fn sample_record() -> ChangeRecord {
    let cluster = Cluster::bootstrap("tidepool", "node-1", NodeAddr::new("h1", 9410), 9430);
    ChangeRecord {
        id: ChangeId::mint(),
        parent: Some(ChangeId::mint()),
        version: Version(4),
        state: ChangeState::Prepared,
        op: ChangeOp::SetSetting {
            target: Target::Cluster,
            key: "client-reconnect-window".to_string(),
            value: "120s".to_string(),
        },
        result: cluster,
        created: Stamp::applied_now(&who()),
        approved: None,
    }
}

fn all_reqs() -> Vec<Req> {
    let change = ChangeId::mint();
    vec![
        Req::Discover,
        Req::Prepare {
            who: who(),
            expected_mutative_count: 7,
            change,
            version: Version(4),
            op: ChangeOp::DetachNode {
                addr: NodeAddr::new("h2", 9410),
            },
        },
        Req::Commit {
            who: who(),
            expected_mutative_count: 8,
            change,
        },
        Req::Rollback {
            who: who(),
            expected_mutative_count: 8,
            change,
        },
        Req::TakeOver {
            who: who(),
            expected_mutative_count: 8,
            change,
        },
    ]
}

fn all_resps() -> Vec<Resp> {
    let rec = sample_record();
    vec![
        Resp::Discover(Box::new(Discovery {
            mode: Mode::ActiveCoordinator,
            mutative_message_count: 7,
            last_mutation: Some(Stamp::applied_now(&who())),
            current_version: Version(3),
            current_id: Some(ChangeId::mint()),
            highest_version: Version(4),
            tail: Some(TailInfo {
                id: rec.id,
                state: ChangeState::Prepared,
                version: Version(4),
                summary: rec.summary(),
            }),
            checkpoints: vec![Checkpoint {
                at: Version(2),
                note: "pre-upgrade".to_string(),
            }],
        })),
        Resp::Prepare(MutationReply::Accepted {
            counters: counters(),
        }),
        Resp::Commit(MutationReply::Rejected {
            kind: RejectKind::Concurrent,
            reason: "expected 7, counter is 9".to_string(),
            counters: counters(),
        }),
        Resp::Rollback(MutationReply::Accepted {
            counters: counters(),
        }),
        Resp::TakeOver {
            reply: MutationReply::Accepted {
                counters: counters(),
            },
            tail: Some(Box::new(rec)),
        },
    ]
}

#[test]
fn test_req_round_trip() {
    for req in all_reqs() {
        let wire = encode_req(&req).unwrap();
        assert_eq!(decode_req(&wire).unwrap(), req);
    }
}

#[test]
fn test_resp_round_trip() {
    for resp in all_resps() {
        let wire = encode_resp(&resp).unwrap();
        assert_eq!(decode_resp(&wire).unwrap(), resp);
    }
}

#[test]
fn test_future_wire_version_rejected() {
    let mut wire = encode_req(&Req::Discover).unwrap();
    wire[0] = 99;
    assert!(decode_req(&wire).is_err());
    assert!(decode_req(&[]).is_err());
}

struct EchoDiscover;
impl Endpoint for EchoDiscover {
    fn handle(&self, req: Req) -> ballast_base::Result<Resp> {
        assert_eq!(req, Req::Discover);
        Ok(Resp::Prepare(MutationReply::Accepted {
            counters: counters(),
        }))
    }
}

#[test]
fn test_loopback_reachability() {
    let net = Loopback::new();
    let n1 = NodeId(1);
    net.register(n1, Arc::new(EchoDiscover));

    let deadline = Duration::from_millis(100);
    assert!(net.call(n1, &Req::Discover, deadline).is_ok());

    net.set_reachable(n1, false);
    let e = net.call(n1, &Req::Discover, deadline).unwrap_err();
    assert!(is_unreachable(&e));

    let e = net.call(NodeId(9), &Req::Discover, deadline).unwrap_err();
    assert!(is_unreachable(&e));

    net.set_reachable(n1, true);
    assert!(net.call(n1, &Req::Discover, deadline).is_ok());
}
