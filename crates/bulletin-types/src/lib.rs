pub mod api;
pub mod models;
pub mod notification;
pub mod repository;
