// SPDX-License-Identifier: AGPL-3.0

/// Machine sub-state of an execution state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineState {
    /// Index into the environment's instruction list
    pub pc: usize,
    pub min_gas_used: u64,
    pub max_gas_used: u64,
    /// Call depth; 0 for the transaction's entry frame
    pub depth: usize,
}

impl MachineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge a gas range, saturating
    pub fn use_gas(&mut self, min: u64, max: u64) {
        self.min_gas_used = self.min_gas_used.saturating_add(min);
        self.max_gas_used = self.max_gas_used.saturating_add(max.max(min));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_gas() {
        let mut mstate = MachineState::new();
        mstate.use_gas(3, 3);
        mstate.use_gas(100, 2600);
        assert_eq!((mstate.min_gas_used, mstate.max_gas_used), (103, 2603));

        mstate.use_gas(10, 0);
        assert_eq!(mstate.max_gas_used, 2613);

        mstate.use_gas(u64::MAX, u64::MAX);
        assert_eq!(mstate.max_gas_used, u64::MAX);
    }
}
