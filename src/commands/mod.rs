pub mod deploy;
pub mod settings;
pub mod setup;
