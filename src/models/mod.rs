//! Data models

pub mod agent;
pub mod alert;
pub mod baseline;
pub mod frequency;
pub mod inventory;

pub use agent::*;
pub use alert::*;
pub use baseline::*;
pub use frequency::*;
pub use inventory::*;
