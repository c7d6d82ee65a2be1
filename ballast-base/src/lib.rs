mod error;
mod ident;

pub use error::{err, Error, Result};
pub use ident::{ChangeId, Identity, NodeId, Stamp, Version, WallTime};
