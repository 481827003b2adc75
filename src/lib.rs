//! Orders relay. Forwards player orders from Discord to an output channel,
//! tagged with the sender's affiliation and turn.

pub mod channels;
pub mod config;
pub mod error;
pub mod relay;
pub mod sheets;
pub mod store;
