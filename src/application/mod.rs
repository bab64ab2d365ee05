//! Application services layer: the query catalogue, the mutation
//! surface, bulk loading, and cache administration.

pub mod admin;
pub mod error;
pub mod loader;
pub mod mutations;
pub mod queries;
pub mod repos;
