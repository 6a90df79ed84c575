pub mod conditions;
pub mod engine;
pub mod outbox;
pub mod scanner;
pub mod validator;
