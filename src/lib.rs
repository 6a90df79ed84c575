pub mod audit;
pub mod auth;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod integrations;
pub mod models;
pub mod workflow;
