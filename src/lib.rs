// lib.rs
// Budget and transaction consistency core: ledger, budgets, recurring
// transactions, goals and the background sweeps that keep them in step.

pub mod config;
pub mod currency;
pub mod error;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod state;
pub mod validation;

pub use error::{CoreError, CoreResult};
pub use state::AppState;
