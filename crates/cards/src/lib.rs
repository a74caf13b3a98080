//! Loyalty card resource: a JSON CRUD API over the `tarjetas_lealtad`
//! document collection.

pub mod handler;
pub mod models;
mod repository;
pub mod service;
