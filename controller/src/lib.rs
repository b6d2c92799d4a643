pub mod broker;
pub mod cli;
pub mod config;
pub mod decision;
pub mod driver;
pub mod error;
pub mod executor;
pub mod leader;
pub mod notify;
pub mod schedule;
pub mod state_store;
pub mod worker;
