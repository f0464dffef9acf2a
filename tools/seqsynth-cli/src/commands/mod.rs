pub mod init;
pub mod render;
pub mod targets;
pub mod validate;
