use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}
