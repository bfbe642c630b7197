pub mod assistant;
pub mod catalog;
pub mod decode;
pub mod errors;
pub mod events;
pub mod models;
pub mod session;
pub mod state;
