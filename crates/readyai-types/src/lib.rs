//! Shared types for the Ready_Ai completion monitor.

mod indicator;
mod message;
mod settings;
mod site;
mod tab;

pub use indicator::*;
pub use message::*;
pub use settings::*;
pub use site::*;
pub use tab::*;
