//! Core provisioning library: port registry, instance layout, gateway config
//! templating, skill installation, credential storage, and the orchestrating
//! [`Provisioner`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod instance;
pub mod layout;
pub mod ports;
pub mod provisioner;
pub mod skills;

pub use error::{Error, Result};
pub use instance::InstanceSpec;
pub use provisioner::{Provisioned, Provisioner, TelegramUpdate};
