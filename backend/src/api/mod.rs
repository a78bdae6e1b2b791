pub mod deposits;
pub mod health;
pub mod webhook;
