pub mod backends;
pub mod store;
