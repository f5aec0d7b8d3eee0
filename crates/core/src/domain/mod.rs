pub mod association;
pub mod message;
pub mod repo;
