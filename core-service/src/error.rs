use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("App construction failed: {0}")]
    Construction(#[from] core_runtime::Error),

    #[error("Config conflict for app '{app_id}': {message}")]
    ConfigConflict { app_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
