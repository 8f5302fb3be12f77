//! Scenario discovery, selection and change gating.

pub mod selector;
pub mod store;

pub use selector::{ChangeGate, Resolution, ScenarioSelector, SelectionFlags};
pub use store::ScenarioStore;
