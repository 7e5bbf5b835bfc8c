use crate::messenger::error::MessengerError;
use crate::repository::error::DatabaseError;
use crate::source::error::SourceError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TemplateError {
    #[error("Unknown template \"{name}\"")]
    UnknownTemplate { name: String },

    #[error("Failed to render template \"{name}\": {source}")]
    RenderFailed {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("{entity} not found (ID: {id}).")]
    NotFound { entity: &'static str, id: i64 },

    #[error("DatabaseError: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("SourceError: {0}")]
    SourceError(#[from] SourceError),

    #[error("MessengerError: {0}")]
    MessengerError(#[from] MessengerError),

    #[error("TemplateError: {0}")]
    TemplateError(#[from] TemplateError),
}
