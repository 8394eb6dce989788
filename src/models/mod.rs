pub mod account;
pub mod avatar;
pub mod session;
pub mod upload;

pub use account::{Account, NewAccount, Profile};
pub use avatar::Avatar;
pub use session::Session;
pub use upload::UploadInput;
