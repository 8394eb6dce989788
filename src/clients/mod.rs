pub mod cache;
pub mod object_storage;
