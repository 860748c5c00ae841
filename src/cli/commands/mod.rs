pub mod codemods;
pub mod fix;
pub mod init;
