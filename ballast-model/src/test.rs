use crate::{
    evaluate, to_json, to_properties, ChangeOp, Cluster, NodeAddr, NodeSpec, Settings, StripeSpec,
    Target, Verdict,
};
use test_log::test;

fn spec(name: &str, host: &str, port: u16) -> NodeSpec {
    NodeSpec {
        name: name.to_string(),
        addr: NodeAddr::new(host, port),
        group_port: port + 10,
        settings: Settings::new(),
    }
}

fn accept(v: Verdict) -> Cluster {
    match v {
        Verdict::Accept(c) => {
            c.check().unwrap();
            *c
        }
        Verdict::Reject(reason) => panic!("unexpected rejection: {}", reason),
    }
}

fn two_node_cluster() -> Cluster {
    let boot = Cluster::bootstrap("tidepool", "node-1", NodeAddr::new("h1", 9410), 9430);
    accept(evaluate(
        &boot,
        &ChangeOp::AttachNode {
            stripe: "stripe-1".to_string(),
            node: spec("node-2", "h2", 9410),
        },
    ))
}

#[test]
fn test_bootstrap_shape() {
    let boot = Cluster::bootstrap("tidepool", "node-1", NodeAddr::new("h1", 9410), 9430);
    boot.check().unwrap();
    assert_eq!(boot.stripes.len(), 1);
    assert_eq!(boot.nodes.len(), 1);
    assert_eq!(boot.stripe_members(crate::StripeIdx(0)).len(), 1);
}

#[test]
fn test_attach_node() {
    let c = two_node_cluster();
    assert_eq!(c.stripes.len(), 1);
    assert_eq!(c.addresses().len(), 2);
    assert!(c.node_by_addr(&NodeAddr::new("h2", 9410)).is_some());
}

#[test]
fn test_attach_duplicate_address_rejected() {
    let c = two_node_cluster();
    let v = evaluate(
        &c,
        &ChangeOp::AttachNode {
            stripe: "stripe-1".to_string(),
            node: spec("node-3", "h1", 9410),
        },
    );
    assert!(v.rejection().unwrap().contains("already belongs"));
}

#[test]
fn test_attach_port_clash_rejected() {
    let c = two_node_cluster();
    // Same host as node-1, public port colliding with node-1's group port.
    let v = evaluate(
        &c,
        &ChangeOp::AttachNode {
            stripe: "stripe-1".to_string(),
            node: spec("node-3", "h1", 9430),
        },
    );
    assert!(v.rejection().unwrap().contains("in use"));
}

#[test]
fn test_attach_unknown_stripe_rejected() {
    let c = two_node_cluster();
    let v = evaluate(
        &c,
        &ChangeOp::AttachNode {
            stripe: "stripe-9".to_string(),
            node: spec("node-3", "h3", 9410),
        },
    );
    assert!(v.rejection().unwrap().contains("no stripe"));
}

#[test]
fn test_detach_last_node_of_stripe_rejected() {
    let boot = Cluster::bootstrap("tidepool", "node-1", NodeAddr::new("h1", 9410), 9430);
    let v = evaluate(
        &boot,
        &ChangeOp::DetachNode {
            addr: NodeAddr::new("h1", 9410),
        },
    );
    assert!(v.rejection().unwrap().contains("last node"));
}

#[test]
fn test_detach_node_reindexes() {
    let c = two_node_cluster();
    let c = accept(evaluate(
        &c,
        &ChangeOp::DetachNode {
            addr: NodeAddr::new("h1", 9410),
        },
    ));
    assert_eq!(c.nodes.len(), 1);
    assert_eq!(c.stripes[0].members, vec![crate::NodeIdx(0)]);
    assert_eq!(c.nodes[0].name, "node-2");
}

#[test]
fn test_attach_then_detach_stripe() {
    let c = two_node_cluster();
    let c = accept(evaluate(
        &c,
        &ChangeOp::AttachStripe {
            stripe: StripeSpec {
                name: "stripe-2".to_string(),
                nodes: vec![spec("node-3", "h3", 9410)],
            },
        },
    ));
    assert_eq!(c.stripes.len(), 2);
    assert_eq!(c.addresses().len(), 3);

    let c = accept(evaluate(
        &c,
        &ChangeOp::DetachStripe {
            name: "stripe-2".to_string(),
        },
    ));
    assert_eq!(c.stripes.len(), 1);
    assert_eq!(c.addresses().len(), 2);
}

#[test]
fn test_detach_last_stripe_rejected() {
    let boot = Cluster::bootstrap("tidepool", "node-1", NodeAddr::new("h1", 9410), 9430);
    let v = evaluate(
        &boot,
        &ChangeOp::DetachStripe {
            name: "stripe-1".to_string(),
        },
    );
    assert!(v.rejection().unwrap().contains("last remaining stripe"));
}

#[test]
fn test_detach_middle_stripe_shifts_links() {
    let boot = Cluster::bootstrap("tidepool", "node-1", NodeAddr::new("h1", 9410), 9430);
    let c = accept(evaluate(
        &boot,
        &ChangeOp::AttachStripe {
            stripe: StripeSpec {
                name: "stripe-2".to_string(),
                nodes: vec![spec("node-2", "h2", 9410)],
            },
        },
    ));
    let c = accept(evaluate(
        &c,
        &ChangeOp::AttachStripe {
            stripe: StripeSpec {
                name: "stripe-3".to_string(),
                nodes: vec![spec("node-3", "h3", 9410)],
            },
        },
    ));
    let c = accept(evaluate(
        &c,
        &ChangeOp::DetachStripe {
            name: "stripe-2".to_string(),
        },
    ));
    assert_eq!(c.stripes.len(), 2);
    let idx = c.stripe_by_name("stripe-3").unwrap();
    let members = c.stripe_members(idx);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "node-3");
}

#[test]
fn test_set_and_unset_setting() {
    let c = two_node_cluster();
    let target = Target::Node(NodeAddr::new("h2", 9410));
    let c = accept(evaluate(
        &c,
        &ChangeOp::SetSetting {
            target: target.clone(),
            key: "offheap-resources.main".to_string(),
            value: "512MB".to_string(),
        },
    ));
    let idx = c.node_by_addr(&NodeAddr::new("h2", 9410)).unwrap();
    assert_eq!(
        c.node(idx).unwrap().settings.get("offheap-resources.main"),
        Some("512MB")
    );

    let c = accept(evaluate(
        &c,
        &ChangeOp::UnsetSetting {
            target: target.clone(),
            key: "offheap-resources.main".to_string(),
        },
    ));
    let idx = c.node_by_addr(&NodeAddr::new("h2", 9410)).unwrap();
    assert_eq!(c.node(idx).unwrap().settings.get("offheap-resources.main"), None);

    let v = evaluate(
        &c,
        &ChangeOp::UnsetSetting {
            target,
            key: "offheap-resources.main".to_string(),
        },
    );
    assert!(v.rejection().unwrap().contains("not set"));
}

#[test]
fn test_immutable_setting_rejected() {
    let c = two_node_cluster();
    let v = evaluate(
        &c,
        &ChangeOp::SetSetting {
            target: Target::Node(NodeAddr::new("h2", 9410)),
            key: "group-port".to_string(),
            value: "9999".to_string(),
        },
    );
    assert!(v.rejection().unwrap().contains("cannot change after activation"));
}

#[test]
fn test_evaluator_is_deterministic() {
    let c = two_node_cluster();
    let op = ChangeOp::AttachStripe {
        stripe: StripeSpec {
            name: "stripe-2".to_string(),
            nodes: vec![spec("node-3", "h3", 9410), spec("node-4", "h4", 9410)],
        },
    };
    let a = evaluate(&c, &op);
    let b = evaluate(&c, &op);
    assert_eq!(a, b);
}

#[test]
fn test_addr_parse() {
    let a = NodeAddr::parse("h1:9410").unwrap();
    assert_eq!(a, NodeAddr::new("h1", 9410));
    assert!(NodeAddr::parse("h1").is_err());
    assert!(NodeAddr::parse(":9410").is_err());
    assert!(NodeAddr::parse("h1:99999").is_err());
}

#[test]
fn test_exports() {
    let c = two_node_cluster();
    let json = to_json(&c).unwrap();
    assert!(json.contains("\"tidepool\""));
    let props = to_properties(&c);
    assert!(props.contains("cluster.name=tidepool"));
    assert!(props.contains("stripe.1.node.2.address=h2:9410"));
}
