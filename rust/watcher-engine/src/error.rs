use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatcherError>;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("no watcher registered with id {id}")]
    NotFound { id: String },

    #[error("KV error: {0}")]
    Kv(#[from] kvutil::KvError),

    #[error("config error: {0}")]
    Config(#[from] config_bootstrap::BootstrapError),
}
