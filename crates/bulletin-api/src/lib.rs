pub mod articles;
pub mod comments;
pub mod companies;
pub mod coordinator;
pub mod error;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod tree;
