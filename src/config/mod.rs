pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{default_config_path, load_site_config, load_template};
pub use models::*;
pub use validation::{ChangeSetBuilder, TemplateValidator, ValidationError, ValidationResult};
