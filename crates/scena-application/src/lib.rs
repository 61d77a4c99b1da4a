//! Application layer for scena.
//!
//! This crate coordinates the domain rules with the shared store, the signal
//! bus, the persisted record store and the live avatar instances.

pub mod arena;
pub mod debounce;
pub mod scene_usecase;
pub mod store;
pub mod sync;

pub use arena::{RuntimeArena, Ticket};
pub use debounce::Debouncer;
pub use scene_usecase::{LoadOutcome, SceneUseCase};
pub use store::{SceneStore, SharedState, StoreAction, WriteOutcome};
pub use sync::{Reconciliation, SyncBridge};
