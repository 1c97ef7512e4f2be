pub mod config;
pub mod types;

pub use config::{Recipe, RecipeError, RecipeResult};
pub use types::{Channel, EnvironmentSpec, NamedEnvironment, PackageSet, RepositorySource};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::types::*;
}
