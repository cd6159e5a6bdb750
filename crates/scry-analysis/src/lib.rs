// SPDX-License-Identifier: AGPL-3.0

//! Vulnerability detection on top of the symbolic executor.
//!
//! Detection modules observe execution through hooks installed by
//! [`DetectionModulePluginBuilder`]. Each module keeps its own findings and
//! reports at most one [`Issue`] per bytecode address for the whole run.
//! Findings that can only be confirmed later travel on the state as an
//! [`IssueAnnotation`] and are promoted by the issue-confirmation plugin when
//! a transaction ends.

pub mod issue;
pub mod issue_annotation;
pub mod modules;
pub mod plugins;
pub mod swc;

pub use issue::*;
pub use issue_annotation::*;
pub use modules::{
    DetectionModule, EntryPoint, ModuleContext, ModuleFactory, ModuleLoader, ModuleState,
    MULTIPLE_SENDS_MODULE,
};
pub use plugins::*;
