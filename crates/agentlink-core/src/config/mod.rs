//! Project configuration: loading, defaults and validation.
//!
//! Every error here is a [`ConfigError`] and is raised before anything
//! executes.

pub mod error;
pub mod project;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use project::{base_dir_of, ProjectConfig};
pub use settings::RuntimeSettings;
