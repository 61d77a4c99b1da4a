//! Scene composition core: the scene/box/element model, the percentage
//! layout engine, party assignment, element lifecycle rules and the typed
//! signal channels shared by every editor surface.

pub mod config;
pub mod element;
pub mod error;
pub mod layout;
pub mod party;
pub mod roster;
pub mod runtime;
pub mod scene;
pub mod signal;
pub mod state;

// Re-export common error type
pub use error::SceneError;
