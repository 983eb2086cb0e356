use anyhow::Result;
use std::fmt;

/// An identity that may be named by a binding.
///
/// Identity is structural: users and groups are identified by name alone while service accounts
/// are also qualified by their namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    User(String),
    Group(String),
    ServiceAccount { namespace: String, name: String },
}

/// Determines whether a subject exists in the system of record.
#[async_trait::async_trait]
pub trait SubjectDirectory {
    async fn is_known(&self, subject: &Subject) -> Result<bool>;
}

// === impl Subject ===

impl Subject {
    pub const USER: &'static str = "User";
    pub const GROUP: &'static str = "Group";
    pub const SERVICE_ACCOUNT: &'static str = "ServiceAccount";

    pub fn user(name: impl ToString) -> Self {
        Self::User(name.to_string())
    }

    pub fn group(name: impl ToString) -> Self {
        Self::Group(name.to_string())
    }

    pub fn service_account(namespace: impl ToString, name: impl ToString) -> Self {
        Self::ServiceAccount {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => Self::USER,
            Self::Group(_) => Self::GROUP,
            Self::ServiceAccount { .. } => Self::SERVICE_ACCOUNT,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(name) | Self::Group(name) => name,
            Self::ServiceAccount { name, .. } => name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::ServiceAccount { namespace, .. } => Some(namespace),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount { namespace, name } => {
                write!(f, "{} {}/{}", Self::SERVICE_ACCOUNT, namespace, name)
            }
            subject => write!(f, "{} {}", subject.kind(), subject.name()),
        }
    }
}
