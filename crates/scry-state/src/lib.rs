// SPDX-License-Identifier: AGPL-3.0

//! Execution states and the side-information attached to them
//!
//! A [`GlobalState`] is one node of the symbolic execution tree. Besides its
//! path constraints, environment and machine state it carries
//! [`Annotations`]: typed values that detection logic attaches and reads back
//! later on the same path. Each annotation decides how it travels when the
//! state forks, enters or leaves a call, or commits into a [`WorldState`].

mod annotation;
mod constraints;
mod environment;
mod global_state;
mod machine;
pub mod opcodes;
mod world_state;

pub use annotation::*;
pub use constraints::*;
pub use environment::*;
pub use global_state::*;
pub use machine::*;
pub use world_state::*;
