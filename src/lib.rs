pub mod clock;
pub mod config;
pub mod exit;
pub mod ledger;
pub mod models;
pub mod providers;
pub mod report;
pub mod scheduler;
pub mod session;
