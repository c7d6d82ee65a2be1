use std::path::Path;
use std::sync::Arc;

use ballast_base::{err, NodeId, Result};
use ballast_model::{Cluster, NodeAddr};
use ballast_net::{Loopback, Mode};
use ballast_node::{Engine, Server};

// The enumerated provider wiring. There is no runtime plugin loading:
// everything a deployment can plug in is named here and selected by
// configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuditSink {
    Stdout,
    File(std::path::PathBuf),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Providers {
    /// Where the bootstrap configuration comes from.
    pub source: ConfigSource,
    pub audit_sink: AuditSink,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigSource {
    /// Read the seed cluster from a JSON file in the data directory.
    File(std::path::PathBuf),
    /// Built-in single-node bootstrap.
    None,
}

impl Providers {
    pub fn defaults() -> Providers {
        Providers {
            source: ConfigSource::None,
            audit_sink: AuditSink::Stdout,
        }
    }

    pub fn audit(&self, line: &str) -> Result<()> {
        match &self.audit_sink {
            AuditSink::Stdout => {
                println!("{}", line);
                Ok(())
            }
            AuditSink::File(path) => {
                use std::io::Write;
                let mut f = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                writeln!(f, "{}", line)?;
                Ok(())
            }
        }
    }
}

// A single-host deployment: one engine per journal file in the data
// directory, all reachable through a loopback transport. Node ids are
// 1-based and stable across runs (they are part of the journal name).
pub struct Deployment {
    net: Loopback,
    servers: Vec<(NodeId, Arc<Server>)>,
}

impl Deployment {
    /// Open `count` nodes out of `dir`, creating journals as needed.
    /// Every node is seeded with the same bootstrap configuration.
    pub fn open(dir: &Path, count: usize, seed: Cluster) -> Result<Deployment> {
        if count == 0 {
            return Err(err("a deployment needs at least one node"));
        }
        std::fs::create_dir_all(dir)?;
        let net = Loopback::new();
        let mut servers = Vec::new();
        for i in 1..=count {
            let id = NodeId(i as i64);
            let journal = dir.join(format!("node-{}.journal", i));
            let engine = Engine::open(id, Mode::ActiveCoordinator, &journal, seed.clone())?;
            let server = Arc::new(Server::new(engine));
            net.register(id, server.clone());
            servers.push((id, server));
        }
        Ok(Deployment { net, servers })
    }

    pub fn seed_from(providers: &Providers, dir: &Path) -> Result<Cluster> {
        match &providers.source {
            ConfigSource::File(name) => {
                let text = std::fs::read_to_string(dir.join(name))?;
                Ok(serde_json::from_str(&text)?)
            }
            ConfigSource::None => Ok(Cluster::bootstrap(
                "ballast",
                "node-1",
                NodeAddr::new("localhost", 9410),
                9430,
            )),
        }
    }

    pub fn transport(&self) -> Loopback {
        self.net.clone()
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.servers.iter().map(|(id, _)| *id).collect()
    }

    pub fn server(&self, node: NodeId) -> Option<&Arc<Server>> {
        self.servers
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, s)| s)
    }
}
