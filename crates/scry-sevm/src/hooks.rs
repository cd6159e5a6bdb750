// SPDX-License-Identifier: AGPL-3.0

//! Hook table of the executor

use scry_exceptions::ScryResult;
use scry_state::GlobalState;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback on a state. An error ends the path it was called on.
pub type StateHook = Arc<dyn Fn(&mut GlobalState) -> ScryResult<()> + Send + Sync>;

/// Callback on an execution lifecycle event
pub type EventHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SevmEvent {
    StartExecution,
    StopExecution,
}

/// Registered hooks, kept in installation order
#[derive(Default, Clone)]
pub struct HookTable {
    pre: HashMap<u8, Vec<StateHook>>,
    post: HashMap<u8, Vec<StateHook>>,
    events: HashMap<SevmEvent, Vec<EventHook>>,
    transaction_end: Vec<StateHook>,
}

impl HookTable {
    pub fn add_pre(&mut self, opcodes: &[u8], hook: StateHook) {
        for opcode in opcodes {
            self.pre.entry(*opcode).or_default().push(hook.clone());
        }
    }

    pub fn add_post(&mut self, opcodes: &[u8], hook: StateHook) {
        for opcode in opcodes {
            self.post.entry(*opcode).or_default().push(hook.clone());
        }
    }

    pub fn add_event(&mut self, event: SevmEvent, hook: EventHook) {
        self.events.entry(event).or_default().push(hook);
    }

    pub fn add_transaction_end(&mut self, hook: StateHook) {
        self.transaction_end.push(hook);
    }

    pub fn pre(&self, opcode: u8) -> &[StateHook] {
        self.pre.get(&opcode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn post(&self, opcode: u8) -> &[StateHook] {
        self.post.get(&opcode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn events(&self, event: SevmEvent) -> &[EventHook] {
        self.events.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transaction_end(&self) -> &[StateHook] {
        &self.transaction_end
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty()
            && self.post.is_empty()
            && self.events.is_empty()
            && self.transaction_end.is_empty()
    }
}

impl std::fmt::Debug for HookTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = |m: &HashMap<u8, Vec<StateHook>>| m.values().map(Vec::len).sum::<usize>();
        f.debug_struct("HookTable")
            .field("pre", &count(&self.pre))
            .field("post", &count(&self.post))
            .field("events", &self.events.values().map(Vec::len).sum::<usize>())
            .field("transaction_end", &self.transaction_end.len())
            .finish()
    }
}

/// Run `hooks` in order on `state`, stopping at the first error
pub fn run_state_hooks(hooks: &[StateHook], state: &mut GlobalState) -> ScryResult<()> {
    for hook in hooks {
        hook(state)?;
    }
    Ok(())
}
