//! Persistent data models for the gateway.
//!
//! Each submodule is a `sea_orm::entity` definition for one table. These are
//! the on-disk shapes; the in-process `Store` trait in the `gateway` crate
//! maps requests onto them.

pub mod app;
pub mod chain;
pub mod default_app_settings;

pub mod prelude {
    pub use super::app::Entity as App;
    pub use super::chain::Entity as Chain;
    pub use super::default_app_settings::Entity as DefaultAppSettings;
}
