pub mod init;
pub mod state;
