pub mod deploy;
pub mod destroy;
pub mod generate;
pub mod init;
pub mod iterations;
pub mod log;
pub mod status;
pub mod update;
