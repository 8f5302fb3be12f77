//! Application-level orchestration.
//!
//! This module owns the run lifecycle (selection, migration, provisioning) and
//! post-run processing such as recording the installed scenario and exports.
//! The CLI layer calls into it and only deals with process setup.

mod controller;
mod post_process;

pub(crate) use controller::run_controller;
