/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The provider rejected the credential used for the request.
    AuthRejected,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if the error means the credential must be replaced
    /// before another request can succeed.
    #[inline]
    pub fn is_auth_rejected(self) -> bool {
        self == ErrorKind::AuthRejected
    }
}
