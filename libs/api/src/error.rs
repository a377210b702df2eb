/// Category of a source error. Lets the producer decide between
/// skipping a packet, retrying acquisition, or giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Upstream unreachable or dropped: transient, may retry.
    Io,
    /// Session data missing or invalid: permanent.
    Session,
    /// One packet could not be decoded: skip it.
    Format,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Session => f.write_str("session"),
            ErrorKind::Format => f.write_str("format"),
        }
    }
}

/// Failure reported by a [`TelemetrySource`](crate::TelemetrySource) or
/// its [`PacketStream`](crate::PacketStream).
///
/// The `Display` output is what ends up in the store's `"error"` entry,
/// so messages are kept short and readable.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session: {0}")]
    Session(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad packet: {0}")]
    Format(#[from] serde_json::Error),

    /// Строка длиннее лимита framing'а; отброшена целиком.
    #[error("bad packet: line exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("connection lost")]
    Closed,
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Connect { .. } | SourceError::Io(_) | SourceError::Closed => ErrorKind::Io,
            SourceError::Session(_) => ErrorKind::Session,
            SourceError::Format(_) | SourceError::Oversized { .. } => ErrorKind::Format,
        }
    }

    /// Acquisition may be attempted again after this error.
    ///
    /// `Closed` is excluded: it only happens mid-stream, after acquisition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Connect { .. } | SourceError::Io(_))
    }

    /// The packet is lost but the stream is still usable.
    pub fn is_skippable(&self) -> bool {
        self.kind() == ErrorKind::Format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let refused = SourceError::Connect {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(refused.kind(), ErrorKind::Io);
        assert!(refused.is_retryable());
        assert!(!refused.is_skippable());

        let bad = SourceError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert_eq!(bad.kind(), ErrorKind::Format);
        assert!(bad.is_skippable());
        assert!(!bad.is_retryable());

        let session = SourceError::Session("no such file".into());
        assert!(!session.is_retryable());
        assert!(!session.is_skippable());

        assert!(!SourceError::Closed.is_retryable());

        let oversized = SourceError::Oversized { limit: 16 };
        assert_eq!(oversized.kind(), ErrorKind::Format);
        assert!(oversized.is_skippable());
        assert_eq!(oversized.to_string(), "bad packet: line exceeds 16 bytes");
    }

    #[test]
    fn test_closed_message() {
        assert_eq!(SourceError::Closed.to_string(), "connection lost");
    }
}
