use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgMatches, Command};
use tracing::warn;

use ballast_base::{err, Identity, NodeId, Result};
use ballast_coord::{repair, Abort, CancelToken, RepairPolicy, RepairVerdict, Session, Verdict};
use ballast_log::ChangeState;
use ballast_model::{
    to_json, to_properties, ChangeOp, NodeAddr, NodeSpec, Settings, StripeSpec, Target,
};
use ballast_net::is_unreachable;

use crate::deploy::{AuditSink, ConfigSource, Deployment, Providers};

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_PARTIAL: i32 = 2;
pub const EXIT_REJECTED: i32 = 3;
pub const EXIT_UNREACHABLE: i32 = 4;

fn command() -> Command {
    let target = Arg::new("target")
        .short('s')
        .long("target")
        .default_value("cluster")
        .help("cluster, stripe:<name>, or node:<host:port>");
    Command::new("ballast")
        .about("cluster configuration change tool")
        .subcommand_required(true)
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("nodes")
                .short('n')
                .long("nodes")
                .default_value("1")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("seed-file")
                .long("seed-file")
                .value_parser(value_parser!(PathBuf))
                .help("JSON seed configuration inside the data dir"),
        )
        .arg(
            Arg::new("audit-file")
                .long("audit-file")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("export")
                .arg(
                    Arg::new("format")
                        .short('t')
                        .long("format")
                        .default_value("json")
                        .value_parser(["json", "properties"]),
                )
                .arg(Arg::new("file").short('f').long("file").value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("node").long("node").default_value("1").value_parser(value_parser!(i64))),
        )
        .subcommand(
            Command::new("attach")
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .default_value("node")
                        .value_parser(["node", "stripe"]),
                )
                .arg(Arg::new("stripe").long("stripe").default_value("stripe-1"))
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("addr").long("addr").required(true))
                .arg(
                    Arg::new("group-port")
                        .long("group-port")
                        .required(true)
                        .value_parser(value_parser!(u16)),
                ),
        )
        .subcommand(
            Command::new("detach")
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .default_value("node")
                        .value_parser(["node", "stripe"]),
                )
                .arg(Arg::new("member").short('m').long("member").required(true)),
        )
        .subcommand(
            Command::new("set")
                .arg(Arg::new("setting").short('c').long("setting").required(true))
                .arg(target.clone()),
        )
        .subcommand(
            Command::new("unset")
                .arg(Arg::new("setting").short('c').long("setting").required(true))
                .arg(target.clone()),
        )
        .subcommand(
            Command::new("get")
                .arg(Arg::new("setting").short('c').long("setting").required(true))
                .arg(target),
        )
        .subcommand(
            Command::new("diagnostic")
                .arg(Arg::new("node").long("node").value_parser(value_parser!(i64))),
        )
        .subcommand(
            Command::new("repair").arg(
                Arg::new("force")
                    .long("force")
                    .value_parser(["commit", "rollback"]),
            ),
        )
        .subcommand(
            Command::new("checkpoint")
                .arg(Arg::new("note").long("note").default_value("operator checkpoint")),
        )
}

/// Parse and execute, returning the process exit code.
pub fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(m) => m,
        Err(e) => {
            let _ = e.print();
            return EXIT_USAGE;
        }
    };
    match dispatch(&matches) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ballast: {}", e);
            if is_unreachable(&e) {
                EXIT_UNREACHABLE
            } else {
                EXIT_USAGE
            }
        }
    }
}

fn parse_target(s: &str) -> Result<Target> {
    if s == "cluster" {
        return Ok(Target::Cluster);
    }
    if let Some(name) = s.strip_prefix("stripe:") {
        return Ok(Target::Stripe(name.to_string()));
    }
    if let Some(addr) = s.strip_prefix("node:") {
        return Ok(Target::Node(NodeAddr::parse(addr)?));
    }
    Err(err("target must be cluster, stripe:<name>, or node:<host:port>"))
}

fn parse_setting(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| err("setting must be key=value"))?;
    Ok((key.to_string(), value.to_string()))
}

fn providers(matches: &ArgMatches) -> Providers {
    let mut p = Providers::defaults();
    if let Some(path) = matches.get_one::<PathBuf>("seed-file") {
        p.source = ConfigSource::File(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("audit-file") {
        p.audit_sink = AuditSink::File(path.clone());
    }
    p
}

fn dispatch(matches: &ArgMatches) -> Result<i32> {
    let dir = matches
        .get_one::<PathBuf>("data-dir")
        .expect("data-dir is required")
        .clone();
    let count = *matches.get_one::<usize>("nodes").expect("nodes has a default");
    let providers = providers(matches);
    let seed = Deployment::seed_from(&providers, &dir)?;
    let deployment = Deployment::open(&dir, count, seed)?;
    let session = Session::new(deployment.transport(), Identity::from_env());

    let (name, sub) = matches.subcommand().expect("subcommand is required");
    match name {
        "export" => cmd_export(&deployment, sub),
        "attach" => {
            let op = attach_op(sub)?;
            run_change(&deployment, &session, &providers, op)
        }
        "detach" => {
            let op = detach_op(&deployment, sub)?;
            run_change(&deployment, &session, &providers, op)
        }
        "set" => {
            let (key, value) = parse_setting(sub.get_one::<String>("setting").expect("required"))?;
            let target = parse_target(sub.get_one::<String>("target").expect("defaulted"))?;
            run_change(&deployment, &session, &providers, ChangeOp::SetSetting { target, key, value })
        }
        "unset" => {
            let key = sub.get_one::<String>("setting").expect("required").clone();
            let target = parse_target(sub.get_one::<String>("target").expect("defaulted"))?;
            run_change(&deployment, &session, &providers, ChangeOp::UnsetSetting { target, key })
        }
        "get" => cmd_get(&deployment, sub),
        "diagnostic" => cmd_diagnostic(&deployment, sub),
        "repair" => cmd_repair(&deployment, &session, &providers, sub),
        "checkpoint" => cmd_checkpoint(&deployment, sub),
        _ => Err(err("unknown subcommand")),
    }
}

fn attach_op(sub: &ArgMatches) -> Result<ChangeOp> {
    let node = NodeSpec {
        name: sub.get_one::<String>("name").expect("required").clone(),
        addr: NodeAddr::parse(sub.get_one::<String>("addr").expect("required"))?,
        group_port: *sub.get_one::<u16>("group-port").expect("required"),
        settings: Settings::new(),
    };
    let stripe = sub.get_one::<String>("stripe").expect("defaulted").clone();
    match sub.get_one::<String>("type").expect("defaulted").as_str() {
        "node" => Ok(ChangeOp::AttachNode { stripe, node }),
        _ => Ok(ChangeOp::AttachStripe {
            stripe: StripeSpec {
                name: stripe,
                nodes: vec![node],
            },
        }),
    }
}

fn detach_op(deployment: &Deployment, sub: &ArgMatches) -> Result<ChangeOp> {
    let member = sub.get_one::<String>("member").expect("required");
    match sub.get_one::<String>("type").expect("defaulted").as_str() {
        "node" => Ok(ChangeOp::DetachNode {
            addr: NodeAddr::parse(member)?,
        }),
        _ => {
            // Accept either a stripe name or the address of any member.
            let first = deployment.nodes()[0];
            let config = deployment
                .server(first)
                .ok_or_else(|| err("empty deployment"))?
                .with_engine(|e| e.current_config().clone());
            let name = match NodeAddr::parse(member) {
                Ok(addr) => {
                    let idx = config
                        .node_by_addr(&addr)
                        .ok_or_else(|| err("no node at that address"))?;
                    let node = config.node(idx).ok_or_else(|| err("no node at that address"))?;
                    config
                        .stripe(node.stripe)
                        .ok_or_else(|| err("node has no stripe"))?
                        .name
                        .clone()
                }
                Err(_) => member.clone(),
            };
            Ok(ChangeOp::DetachStripe { name })
        }
    }
}

fn run_change(
    deployment: &Deployment,
    session: &Session<ballast_net::Loopback>,
    providers: &Providers,
    op: ChangeOp,
) -> Result<i32> {
    let verdict = session.run(&deployment.nodes(), &op, &CancelToken::new())?;
    providers.audit(&format!("{} -> {}", op.describe(), verdict_line(&verdict)))?;
    Ok(verdict_code(&verdict))
}

fn verdict_line(v: &Verdict) -> String {
    match v {
        Verdict::Committed { change, version } => {
            format!("committed {} at {}", change, version)
        }
        Verdict::PartiallyCommitted { change, stuck, .. } => {
            format!("PARTIALLY committed {} ({} nodes stuck; run repair)", change, stuck.len())
        }
        Verdict::RolledBack { change, abort } => {
            format!("rolled back {}: {}", change, abort)
        }
        Verdict::PartiallyRolledBack { change, stuck, abort, .. } => format!(
            "PARTIALLY rolled back {} ({} nodes stuck; run repair): {}",
            change,
            stuck.len(),
            abort
        ),
        Verdict::Aborted(abort) => format!("aborted: {}", abort),
    }
}

fn abort_code(abort: &Abort) -> i32 {
    match abort {
        Abort::PartialCluster { .. } => EXIT_UNREACHABLE,
        Abort::PriorChangeInFlight { .. } | Abort::InconsistentCluster { .. } => EXIT_PARTIAL,
        Abort::Rejected { .. } | Abort::RaceDetected { .. } | Abort::Cancelled => EXIT_REJECTED,
    }
}

fn verdict_code(v: &Verdict) -> i32 {
    match v {
        Verdict::Committed { .. } => EXIT_OK,
        Verdict::PartiallyCommitted { .. } | Verdict::PartiallyRolledBack { .. } => EXIT_PARTIAL,
        Verdict::RolledBack { abort, .. } => abort_code(abort),
        Verdict::Aborted(abort) => abort_code(abort),
    }
}

fn node_arg(deployment: &Deployment, sub: &ArgMatches, key: &str) -> Result<NodeId> {
    let id = NodeId(*sub.get_one::<i64>(key).unwrap_or(&1));
    if deployment.server(id).is_none() {
        return Err(err("no such node in this deployment"));
    }
    Ok(id)
}

fn cmd_export(deployment: &Deployment, sub: &ArgMatches) -> Result<i32> {
    let node = node_arg(deployment, sub, "node")?;
    let config = deployment
        .server(node)
        .expect("checked by node_arg")
        .with_engine(|e| e.current_config().clone());
    let text = match sub.get_one::<String>("format").expect("defaulted").as_str() {
        "properties" => to_properties(&config),
        _ => to_json(&config)?,
    };
    match sub.get_one::<PathBuf>("file") {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{}", text),
    }
    Ok(EXIT_OK)
}

fn cmd_get(deployment: &Deployment, sub: &ArgMatches) -> Result<i32> {
    let key = sub.get_one::<String>("setting").expect("required");
    let target = parse_target(sub.get_one::<String>("target").expect("defaulted"))?;
    let first = deployment.nodes()[0];
    let config = deployment
        .server(first)
        .ok_or_else(|| err("empty deployment"))?
        .with_engine(|e| e.current_config().clone());
    let value = match &target {
        Target::Cluster => config.settings.get(key).map(str::to_string),
        Target::Stripe(name) => {
            let idx = config
                .stripe_by_name(name)
                .ok_or_else(|| err("no such stripe"))?;
            config
                .stripe_members(idx)
                .first()
                .and_then(|n| n.settings.get(key))
                .map(str::to_string)
        }
        Target::Node(addr) => {
            let idx = config
                .node_by_addr(addr)
                .ok_or_else(|| err("no node at that address"))?;
            config
                .node(idx)
                .and_then(|n| n.settings.get(key))
                .map(str::to_string)
        }
    };
    match value {
        Some(v) => {
            println!("{}={}", key, v);
            Ok(EXIT_OK)
        }
        None => {
            println!("{} is not set", key);
            Ok(EXIT_OK)
        }
    }
}

fn cmd_diagnostic(deployment: &Deployment, sub: &ArgMatches) -> Result<i32> {
    let nodes = match sub.get_one::<i64>("node") {
        Some(&id) => vec![NodeId(id)],
        None => deployment.nodes(),
    };
    for id in nodes {
        let server = deployment
            .server(id)
            .ok_or_else(|| err("no such node in this deployment"))?;
        let d = server.with_engine(|e| e.discover());
        let state = if d.prepared() { "PREPARED" } else { "ACCEPTING" };
        println!("{}: {} mode={:?}", id, state, d.mode);
        println!(
            "  current={} highest={} mutations={}",
            d.current_version, d.highest_version, d.mutative_message_count
        );
        if let Some(stamp) = &d.last_mutation {
            println!("  last mutation by {}@{} at {}", stamp.user, stamp.host, stamp.at);
        }
        if let Some(tail) = &d.tail {
            println!("  tail {}", tail.summary);
        }
        for c in &d.checkpoints {
            println!("  checkpoint at {}: {}", c.at, c.note);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_repair(
    deployment: &Deployment,
    session: &Session<ballast_net::Loopback>,
    providers: &Providers,
    sub: &ArgMatches,
) -> Result<i32> {
    let policy = match sub.get_one::<String>("force").map(String::as_str) {
        Some("commit") => RepairPolicy::ForceCommit,
        Some("rollback") => RepairPolicy::ForceRollback,
        _ => RepairPolicy::Default,
    };
    let verdict = repair(session, &deployment.nodes(), policy)?;
    let (line, code) = match &verdict {
        RepairVerdict::NothingToRepair => ("nothing to repair".to_string(), EXIT_OK),
        RepairVerdict::Repaired {
            change,
            outcome,
            stuck,
            behind,
            ..
        } => {
            let outcome_word = match outcome {
                ChangeState::Committed => "committed",
                _ => "rolled back",
            };
            if !stuck.is_empty() {
                (
                    format!("repair {} {} but {} nodes are stuck", outcome_word, change, stuck.len()),
                    EXIT_PARTIAL,
                )
            } else if !behind.is_empty() {
                warn!(target: "ballast", behind = behind.len(), "nodes need a follow-up change session");
                (
                    format!(
                        "repair {} {}; {} nodes never saw it and need a follow-up session",
                        outcome_word,
                        change,
                        behind.len()
                    ),
                    EXIT_OK,
                )
            } else {
                (format!("repair {} {}", outcome_word, change), EXIT_OK)
            }
        }
        RepairVerdict::Aborted(abort) => (format!("repair aborted: {}", abort), abort_code(abort)),
    };
    providers.audit(&line)?;
    Ok(code)
}

fn cmd_checkpoint(deployment: &Deployment, sub: &ArgMatches) -> Result<i32> {
    let note = sub.get_one::<String>("note").expect("defaulted").clone();
    for id in deployment.nodes() {
        deployment
            .server(id)
            .ok_or_else(|| err("no such node in this deployment"))?
            .with_engine(|e| e.checkpoint(note.clone()))?;
    }
    Ok(EXIT_OK)
}
