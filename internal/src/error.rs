use thiserror::Error;

use crate::attrs::DirectoryEntry;

pub const RC_SUCCESS: u32 = 0;
pub const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
pub const RC_REFERRAL: u32 = 10;
pub const RC_NO_SUCH_OBJECT: u32 = 32;
pub const RC_INVALID_CREDENTIALS: u32 = 49;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Failure kinds of the directory access layer.
///
/// Callers map these onto their own transport statuses; `NotFound` must stay
/// distinguishable from every "operation failed" kind.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no configured directory server is reachable: {0}")]
    ConnectFailure(String),

    #[error("bind as {dn} rejected (rc={rc}): {reason}")]
    BindFailure { dn: String, rc: u32, reason: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid search filter: {0}")]
    InvalidFilter(String),

    #[error("wrong parameter: {0}")]
    WrongParameter(String),

    /// The cursor failed mid-iteration; `entries` holds what was drained so far
    #[error("search aborted after {} entries: {reason}", .entries.len())]
    SearchAborted {
        entries: Vec<DirectoryEntry>,
        reason: String,
    },

    #[error("entry to reconcile no longer exists: {0}")]
    SourceNotFound(String),

    #[error("directory operation failed (rc={rc}): {message}")]
    OperationFailed { rc: u32, message: String },

    #[error("directory transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound(_))
    }

    /// Errors after which the connection that produced them must not be reused
    pub fn is_connection_broken(&self) -> bool {
        matches!(
            self,
            DirectoryError::Transport(_) | DirectoryError::ConnectFailure(_)
        )
    }

    /// Rejected binds of end users are reported without the server's reason
    pub fn into_user_bind(self) -> Self {
        match self {
            DirectoryError::BindFailure { .. } => DirectoryError::InvalidCredentials,
            other => other,
        }
    }

    pub(crate) fn from_result(dn: &str, rc: u32, text: &str) -> Self {
        match rc {
            RC_NO_SUCH_OBJECT => DirectoryError::NotFound(dn.to_string()),
            _ => DirectoryError::OperationFailed {
                rc,
                message: format!("{dn}: {text}"),
            },
        }
    }
}

impl From<ldap3::LdapError> for DirectoryError {
    fn from(error: ldap3::LdapError) -> Self {
        match error {
            ldap3::LdapError::FilterParsing => {
                DirectoryError::InvalidFilter("rejected by the filter parser".to_string())
            }
            ldap3::LdapError::LdapResult { result } => DirectoryError::OperationFailed {
                rc: result.rc,
                message: result.text,
            },
            other => DirectoryError::Transport(other.to_string()),
        }
    }
}
