pub mod setup_wizard;
pub mod verification;
