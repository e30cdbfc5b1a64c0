use serde_derive::{Deserialize, Serialize};

/// Run-time configuration for the fork choice.
///
/// The engine reads a single value from configuration: the number of slots grouped into an
/// epoch. It is fixed at construction and never changes for the lifetime of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub slots_per_epoch: u64,
}

impl ChainSpec {
    /// Returns the specification for the main network.
    pub fn mainnet() -> Self {
        Self {
            slots_per_epoch: 32,
        }
    }

    /// Returns a minimal specification, suitable for interop and testing.
    pub fn minimal() -> Self {
        Self {
            slots_per_epoch: 8,
        }
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}
