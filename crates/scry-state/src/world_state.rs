// SPDX-License-Identifier: AGPL-3.0

use crate::{Annotations, Constraints};

/// What a committed transaction leaves behind for the next one
#[derive(Debug, Default)]
pub struct WorldState {
    /// Copies of the annotations that persist to the world state
    pub annotations: Annotations,
    /// Path condition accumulated up to the commit
    pub constraints: Constraints,
    /// Ids of the committed transactions, oldest first
    pub transaction_ids: Vec<String>,
}
