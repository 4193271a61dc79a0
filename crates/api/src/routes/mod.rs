pub mod compensations;
pub mod health;
pub mod metrics;
pub mod projects;
pub mod repositories;
pub mod transactions;
