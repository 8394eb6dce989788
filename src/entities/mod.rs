pub mod prelude;

pub mod accounts;
pub mod avatars;
pub mod sessions;
