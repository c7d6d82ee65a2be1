// The operator config tool. It drives change sessions and repair against
// a deployment of nodes, formats the verdicts, and maps them onto the
// exit-code contract scripts rely on:
//
//   0  success
//   1  validation or local error
//   2  partial / inconsistent cluster (repair needed before new changes)
//   3  protocol rejection (the cluster declined the change)
//   4  target unreachable
//
// The tool speaks to nodes through the Transport seam. This build wires
// the in-process loopback transport over journals in a data directory,
// which is enough for single-host deployments and for exercising every
// protocol path; a remote RPC transport drops in behind the same trait.

mod cli;
mod deploy;

pub use cli::{run, EXIT_OK, EXIT_PARTIAL, EXIT_REJECTED, EXIT_UNREACHABLE, EXIT_USAGE};
pub use deploy::{AuditSink, ConfigSource, Deployment, Providers};

#[cfg(test)]
mod test;
