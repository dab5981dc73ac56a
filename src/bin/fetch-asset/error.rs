use std::process::ExitCode;

/// Categories of application errors that can be matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Bad arguments or an unusable source identifier
    ArgValidation,
    /// Unreadable or malformed configuration
    Config,
    /// The fetch itself failed
    Fetch,
    /// Failure writing a plan or descriptor to stdout
    Output,
}

/// Internal error type that contains all application error variants.
#[derive(Debug, thiserror::Error)]
pub enum AppErrorInner {
    #[error("Argument error: {0}")]
    ArgValidation(String),
    #[error("{0}")]
    Source(#[source] fetch_asset::Error),
    #[error("Configuration error: {0}")]
    Config(#[source] fetch_asset::Error),
    #[error("Failed to fetch: {0}")]
    Fetch(#[source] fetch_asset::Error),
    #[error("Failed to write {format} output: {message}")]
    Output { format: &'static str, message: String },
}

/// The application-level error: a boxed inner error plus the kind that selects the exit code.
#[derive(Debug)]
pub struct AppError(Box<AppErrorInner>, AppErrorKind);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl AppError {
    pub fn new(inner: AppErrorInner, kind: AppErrorKind) -> Self {
        Self(Box::new(inner), kind)
    }

    pub fn error_kind(&self) -> &AppErrorKind {
        &self.1
    }

    pub fn arg_validation<S: Into<String>>(msg: S) -> Self {
        Self::new(AppErrorInner::ArgValidation(msg.into()), AppErrorKind::ArgValidation)
    }

    pub fn config(err: fetch_asset::Error) -> Self {
        Self::new(AppErrorInner::Config(err), AppErrorKind::Config)
    }

    pub fn output<E: std::fmt::Display>(format: &'static str, err: E) -> Self {
        Self::new(
            AppErrorInner::Output {
                format,
                message: err.to_string(),
            },
            AppErrorKind::Output,
        )
    }
}

impl From<fetch_asset::Error> for AppError {
    fn from(err: fetch_asset::Error) -> Self {
        use fetch_asset::ErrorKind;
        let err = err.redacted();
        match err.kind() {
            ErrorKind::InvalidSource => {
                Self::new(AppErrorInner::Source(err), AppErrorKind::ArgValidation)
            }
            ErrorKind::Config => Self::config(err),
            _ => Self::new(AppErrorInner::Fetch(err), AppErrorKind::Fetch),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(
            AppErrorInner::Fetch(fetch_asset::Error::Io(err)),
            AppErrorKind::Fetch,
        )
    }
}

impl From<AppError> for ExitCode {
    fn from(error: AppError) -> Self {
        ExitCode::from(match error.error_kind() {
            AppErrorKind::Fetch => 1,
            AppErrorKind::ArgValidation => 2,
            AppErrorKind::Config | AppErrorKind::Output => 3,
        })
    }
}
