pub mod account;
pub mod avatar;
pub mod session;
