use crate::{Epoch, Hash256};
use serde_derive::{Deserialize, Serialize};

/// Casper FFG checkpoint: a `(epoch, root)` pair used as a justification or finalization target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}
