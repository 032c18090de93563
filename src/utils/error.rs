use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Configuration store access failed{}: {message}", realm_suffix(.realm))]
    ConfigAccess {
        realm: Option<String>,
        message: String,
    },

    /// The store answered but refused the request (bad token, unknown realm).
    #[error("Configuration store rejected the request{} with HTTP {status}: {message}", realm_suffix(.realm))]
    ConfigRejected {
        realm: Option<String>,
        status: u16,
        message: String,
    },

    #[error("Write of '{attribute}' on {realm}/{sub_config} rejected: {message}")]
    ConfigWrite {
        realm: String,
        sub_config: String,
        attribute: String,
        message: String,
    },

    #[error("Store call '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Realm enumeration failed: {source}")]
    RealmEnumeration {
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("Administrative credential unavailable: {message}")]
    Credential { message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field '{field}'")]
    MissingConfigError { field: String },
}

fn realm_suffix(realm: &Option<String>) -> String {
    match realm {
        Some(realm) => format!(" for realm {}", realm),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Access,
    Write,
    Configuration,
    Internal,
}

impl ReconcileError {
    pub fn access(realm: Option<&str>, message: impl Into<String>) -> Self {
        Self::ConfigAccess {
            realm: realm.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn rejected(realm: Option<&str>, status: u16, message: impl Into<String>) -> Self {
        Self::ConfigRejected {
            realm: realm.map(str::to_string),
            status,
            message: message.into(),
        }
    }

    pub fn write(
        realm: &str,
        sub_config: &str,
        attribute: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigWrite {
            realm: realm.to_string(),
            sub_config: sub_config.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Transient read-path failures. Writes are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfigAccess { .. } | Self::Timeout { .. } => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigAccess { .. }
            | Self::ConfigRejected { .. }
            | Self::Timeout { .. }
            | Self::RealmEnumeration { .. }
            | Self::Credential { .. }
            | Self::Http(_) => ErrorCategory::Access,
            Self::ConfigWrite { .. } => ErrorCategory::Write,
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Internal,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Access => format!(
                "Could not reach the configuration store. Check the base URL and admin token. ({})",
                self
            ),
            ErrorCategory::Write => format!(
                "The configuration store refused an update. Check the admin token's privileges. ({})",
                self
            ),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Internal => format!("Internal error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
