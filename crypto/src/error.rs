use std::path::PathBuf;

use meshgate_types::TypesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key material: {0}")]
    InvalidKey(#[from] TypesError),
}
