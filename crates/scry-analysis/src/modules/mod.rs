// SPDX-License-Identifier: AGPL-3.0

//! Detection modules and their registry

mod base;
mod loader;
pub mod multiple_sends;

pub use base::*;
pub use loader::*;
pub use multiple_sends::{MultipleSendsAnnotation, MultipleSendsModule};
