pub mod agent;
pub mod config;
pub mod init;
pub mod transfers;
pub mod verify;
