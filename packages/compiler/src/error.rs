use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("malformed source document: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("layer map serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
}
