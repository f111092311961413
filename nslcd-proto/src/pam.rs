use crate::ProtoError;

/// PAM-facing outcome of an authentication/authorization/session/password
/// operation, grounded on the status codes the original project's
/// `nslcd/pam.h` passes back to its PAM module counterpart (`pam_appl.h`'s
/// `PAM_*` constants, re-numbered for this wire format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PamStatus {
    Success = 0,
    PermissionDenied = 1,
    AuthError = 2,
    CredentialsInsufficient = 3,
    AuthInfoUnavail = 4,
    UserUnknown = 5,
    MaxTries = 6,
    NewAuthTokRequired = 7,
    AccountExpired = 8,
    SessionError = 9,
    AuthTokError = 10,
    AuthTokExpired = 11,
    Ignore = 12,
    Abort = 13,
}

impl PamStatus {
    const ALL: &'static [PamStatus] = &[
        PamStatus::Success,
        PamStatus::PermissionDenied,
        PamStatus::AuthError,
        PamStatus::CredentialsInsufficient,
        PamStatus::AuthInfoUnavail,
        PamStatus::UserUnknown,
        PamStatus::MaxTries,
        PamStatus::NewAuthTokRequired,
        PamStatus::AccountExpired,
        PamStatus::SessionError,
        PamStatus::AuthTokError,
        PamStatus::AuthTokExpired,
        PamStatus::Ignore,
        PamStatus::Abort,
    ];
}

impl TryFrom<i32> for PamStatus {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        PamStatus::ALL
            .iter()
            .copied()
            .find(|s| *s as i32 == value)
            .ok_or(ProtoError::UnknownResultCode(value))
    }
}

impl From<PamStatus> for i32 {
    fn from(status: PamStatus) -> i32 {
        status as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_round_trips_through_its_wire_value() {
        for status in PamStatus::ALL {
            let wire: i32 = (*status).into();
            assert_eq!(PamStatus::try_from(wire).unwrap(), *status);
        }
    }
}
