//! Core utilities shared by the world model, job scheduler and renderer.

pub mod mt_resource;
pub mod position;

pub use mt_resource::MtResource;
