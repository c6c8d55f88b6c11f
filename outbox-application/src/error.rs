use outbox_domain::error::OutboxError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] OutboxError),

    #[error("runtime already started")]
    AlreadyStarted,

    #[error("runtime not started")]
    NotStarted,

    #[error("infra: {0}")]
    Infra(String),
}
