use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown layer id: {0}")]
    UnknownLayer(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("authority preference must be 'dom' or 'store', got '{0}'")]
    InvalidAuthority(String),
}
