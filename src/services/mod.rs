pub mod client;
pub mod compass;
pub mod narrative;
pub mod repository;
pub mod workflow;
