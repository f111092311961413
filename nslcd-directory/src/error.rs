use thiserror::Error;

/// LDAP result codes that mean retrying the same request against a
/// different server cannot help, grounded on the checks around
/// `LDAP_INVALID_CREDENTIALS` / `LDAP_INSUFFICIENT_ACCESS` /
/// `LDAP_AUTH_METHOD_NOT_SUPPORTED` in the original's `do_retry_search`.
pub(crate) const RC_INVALID_CREDENTIALS: u32 = 49;
pub(crate) const RC_INSUFFICIENT_ACCESS: u32 = 50;
pub(crate) const RC_AUTH_METHOD_NOT_SUPPORTED: u32 = 7;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Ldap(#[from] ldap3::LdapError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("insufficient access")]
    InsufficientAccess,
    #[error("no configured directory server could be reached within the retry window")]
    AllUrisFailed,
    #[error("no directory server URIs are configured")]
    NoUris,
}

/// Whether `err` represents a condition that won't be fixed by trying
/// another server.
pub(crate) fn is_unrecoverable(err: &ldap3::LdapError) -> bool {
    match err {
        ldap3::LdapError::LdapResult { result } => matches!(
            result.rc,
            RC_INVALID_CREDENTIALS | RC_INSUFFICIENT_ACCESS | RC_AUTH_METHOD_NOT_SUPPORTED
        ),
        _ => false,
    }
}
