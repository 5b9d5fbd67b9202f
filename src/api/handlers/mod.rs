//! Route handlers. Relay handlers only translate between HTTP and
//! [`crate::endpoint::AuthEndpoint`].

pub mod health;
pub mod login;
pub mod logout;
pub mod refresh;
