pub mod application;
pub mod document;
pub mod message;
pub mod payment;
pub mod role;
pub mod user;
pub mod workflow;
