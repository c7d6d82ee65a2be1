// The operator-side driver of one configuration change. A session fans a
// change out to every node of the cluster in two phases (prepare, then
// commit or rollback), with a discovery round before each decision point:
//
//   Phase A  discover every target; refuse to start on an unreachable,
//            in-flight, or disagreeing cluster.
//   Phase B  mint the change id and the new version, record per-node
//            mutative counts.
//   Phase C  prepare fan-out; any rejection rolls back the acceptors.
//   Phase D  discover again; any tail that is not ours means another
//            coordinator intervened, so roll back and abort.
//   Phase E  commit (or rollback) fan-out; failures here no longer stop
//            the fan-out, they degrade the verdict to a partial outcome
//            that the repair procedure finishes later.
//
// There is no leader election and no lock service: a session holds no
// distributed state at all. Mutual exclusion falls out of the per-node
// mutative-count check, and any partial failure leaves enough in the
// node logs for a later session to detect and repair it.


mod repair;
mod session;

pub use repair::{repair, RepairPolicy, RepairVerdict};
pub use session::{Abort, CancelToken, Divergence, Session, Verdict};
