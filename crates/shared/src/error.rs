use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BannerError {
    #[error("banner controller is already started")]
    AlreadyStarted,
    #[error("banner controller must be started from within a tokio runtime")]
    NoRuntime,
}
