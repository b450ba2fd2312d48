pub mod backend;
pub mod keys;

pub use backend::CacheBackend;
