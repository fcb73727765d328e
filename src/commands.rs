use thiserror::Error;

use crate::ApiError;
use crate::credential::StoreError;

pub mod login;
pub mod logout;
pub mod request;
pub mod status;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("invalid JSON body: `{0}`")]
    InvalidBody(String),
}
