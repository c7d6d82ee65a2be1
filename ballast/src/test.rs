use test_log::test;

use crate::{run, Deployment, Providers, EXIT_OK, EXIT_PARTIAL, EXIT_REJECTED, EXIT_USAGE};

fn args(dir: &std::path::Path, nodes: usize, rest: &[&str]) -> Vec<String> {
    let mut v = vec![
        "ballast".to_string(),
        "-d".to_string(),
        dir.display().to_string(),
        "-n".to_string(),
        nodes.to_string(),
    ];
    v.extend(rest.iter().map(|s| s.to_string()));
    v
}

#[test]
fn test_export_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");
    let code = run(args(
        dir.path(),
        1,
        &["export", "-t", "json", "-f", out.to_str().unwrap()],
    ));
    assert_eq!(code, EXIT_OK);
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("\"ballast\""));
    assert!(text.contains("stripe-1"));
}

#[test]
fn test_set_then_get_and_properties() {
    let dir = tempfile::tempdir().unwrap();
    let code = run(args(
        dir.path(),
        2,
        &["set", "-c", "client-reconnect-window=120s"],
    ));
    assert_eq!(code, EXIT_OK);

    let out = dir.path().join("out.properties");
    let code = run(args(
        dir.path(),
        2,
        &["export", "-t", "properties", "-f", out.to_str().unwrap()],
    ));
    assert_eq!(code, EXIT_OK);
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("cluster.client-reconnect-window=120s"));

    let code = run(args(dir.path(), 2, &["get", "-c", "client-reconnect-window"]));
    assert_eq!(code, EXIT_OK);
}

#[test]
fn test_attach_rejection_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    // The seed node already sits at localhost:9410.
    let code = run(args(
        dir.path(),
        1,
        &[
            "attach",
            "--name",
            "node-dup",
            "--addr",
            "localhost:9410",
            "--group-port",
            "9440",
        ],
    ));
    assert_eq!(code, EXIT_REJECTED);
}

#[test]
fn test_immutable_set_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let code = run(args(dir.path(), 1, &["set", "-c", "group-port=9999"]));
    assert_eq!(code, EXIT_REJECTED);
}

#[test]
fn test_repair_nothing_and_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run(args(dir.path(), 2, &["repair"])), EXIT_OK);
    assert_eq!(run(args(dir.path(), 2, &["diagnostic"])), EXIT_OK);
}

#[test]
fn test_usage_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run(["ballast", "export"]), EXIT_USAGE);
    assert_eq!(run(args(dir.path(), 1, &["set", "-c", "not-an-assignment"])), EXIT_USAGE);
    assert_eq!(
        run(args(dir.path(), 1, &["set", "-c", "a=b", "-s", "bogus:target:shape"])),
        EXIT_USAGE
    );
}

#[test]
fn test_prior_change_blocks_until_repair() {
    use ballast_base::{ChangeId, Identity, Version};
    use ballast_net::{Req, Resp, Transport};

    let dir = tempfile::tempdir().unwrap();
    // Leave a prepared change behind, as a crashed coordinator would.
    {
        let seed = Deployment::seed_from(&Providers::defaults(), dir.path()).unwrap();
        let deployment = Deployment::open(dir.path(), 2, seed).unwrap();
        let change = ChangeId::mint();
        for id in deployment.nodes() {
            let req = Req::Prepare {
                who: Identity::new("deadhost", "gone"),
                expected_mutative_count: 0,
                change,
                version: Version(1),
                op: ballast_model::ChangeOp::SetSetting {
                    target: ballast_model::Target::Cluster,
                    key: "doomed".to_string(),
                    value: "yes".to_string(),
                },
            };
            let resp = deployment
                .transport()
                .call(id, &req, std::time::Duration::from_millis(100))
                .unwrap();
            let Resp::Prepare(reply) = resp else {
                panic!("unexpected response");
            };
            assert!(reply.accepted());
        }
    }

    assert_eq!(run(args(dir.path(), 2, &["set", "-c", "a=b"])), EXIT_PARTIAL);
    assert_eq!(run(args(dir.path(), 2, &["repair"])), EXIT_OK);
    assert_eq!(run(args(dir.path(), 2, &["set", "-c", "a=b"])), EXIT_OK);
}
