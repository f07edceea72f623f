pub mod api;
pub mod config;
pub mod drivers;
pub mod humanize;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod replication;
