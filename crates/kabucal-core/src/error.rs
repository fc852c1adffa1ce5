use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sources file {path}: {source}")]
    SourcesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sources file: {0}")]
    SourcesFileParse(#[from] serde_yaml::Error),

    #[error("sources validation failed: {0}")]
    Validation(String),
}

/// Errors a caller of `resolve` can see. Everything else degrades to
/// "no signal" inside the engine.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid target date \"{input}\": expected YYYY-MM-DD")]
    InvalidDate { input: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid company code \"{0}\": expected 4 ASCII alphanumeric characters")]
pub struct InvalidCode(pub String);
