pub mod config;
pub mod error;
pub mod host;
pub mod registry;
pub mod slug;
pub mod store;
pub mod sync;
pub mod version;
