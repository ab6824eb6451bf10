use netctl_exec::diagnostic;

/// Errors returned by the controllers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network namespace {0:?} not found")]
    NamespaceNotFound(String),
    #[error("device {device:?} not found in namespace {}", namespace_name(.namespace))]
    DeviceNotFound { device: String, namespace: Option<String> },
    #[error("address {address} on {device} is not ready: {reason}")]
    AddressNotReady { device: String, address: String, reason: String },
    #[error("invalid port range {0:?}, expected [low, high] with low <= high")]
    InvalidPortRange(Vec<u16>),
    #[error(transparent)]
    Command(#[from] netctl_exec::Error),
    #[error(transparent)]
    Parse(#[from] netctl_parse::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

fn namespace_name(namespace: &Option<String>) -> &str {
    namespace.as_deref().unwrap_or("<root>")
}

impl Error {
    /// Classifies a failed command that targeted `device` in `namespace`.
    ///
    /// Failures without a recognized signature are passed through unchanged.
    pub(crate) fn classify(
        err: netctl_exec::Error,
        device: Option<&str>,
        namespace: Option<&str>,
    ) -> Self {
        if let Some(namespace) = namespace {
            if diagnostic::is_namespace_not_found(&err) {
                return Self::NamespaceNotFound(namespace.to_string());
            }
        }

        if let Some(device) = device {
            if diagnostic::is_device_not_found(&err) {
                return Self::DeviceNotFound {
                    device: device.to_string(),
                    namespace: namespace.map(str::to_string),
                };
            }
        }

        Self::Command(err)
    }

    /// Whether the target namespace does not exist.
    pub const fn is_namespace_not_found(&self) -> bool {
        matches!(self, Self::NamespaceNotFound(_))
    }

    /// Whether the target device does not exist.
    pub const fn is_device_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. })
    }
}
