pub mod question;
pub mod session;
