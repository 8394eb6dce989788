pub use super::accounts::Entity as Accounts;
pub use super::avatars::Entity as Avatars;
pub use super::sessions::Entity as Sessions;
