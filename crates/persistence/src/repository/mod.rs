//! Repository implementations for database operations

pub mod events;
pub mod settings;
pub mod strategies;
pub mod trade_logs;
pub mod trades;

pub use events::*;
pub use settings::*;
pub use strategies::*;
pub use trade_logs::*;
pub use trades::*;
