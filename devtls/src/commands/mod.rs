pub mod ca;
pub mod cert;
