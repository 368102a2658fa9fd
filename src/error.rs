use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Update error: {message}")]
    Update { message: String },

    #[error("Patch verdict carried an empty version")]
    InvalidPatchVersion,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("System error: {message}")]
    System { message: String },
}

impl KeeperError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn process<S: Into<String>>(message: S) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn update<S: Into<String>>(message: S) -> Self {
        Self::Update {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;
