//! Password Policy request/response controls
//! (draft-behera-ldap-password-policy §6.1/6.2), consulted during PAM
//! authentication binds. Grounded on the same `ldap3::LdapResult` the
//! existing `LDAP_INVALID_CREDENTIALS` check in [`crate::session`]
//! already reads -- both inspect fields of the bind result the server
//! returns, this one just also looks at `ctrls`.

use ldap3::controls::RawControl;
use ldap3::LdapResult;

pub const PPOLICY_OID: &str = "1.3.6.1.4.1.42.2.27.8.5.1";

/// The control response's `error` enumeration (draft §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicyError {
    PasswordExpired,
    AccountLocked,
    ChangeAfterReset,
    PasswordModNotAllowed,
    MustSupplyOldPassword,
    InvalidPasswordSyntax,
    PasswordTooShort,
    PasswordTooYoung,
    PasswordInHistory,
}

impl PasswordPolicyError {
    fn from_enumerated(value: i64) -> Option<Self> {
        Some(match value {
            0 => PasswordPolicyError::PasswordExpired,
            1 => PasswordPolicyError::AccountLocked,
            2 => PasswordPolicyError::ChangeAfterReset,
            3 => PasswordPolicyError::PasswordModNotAllowed,
            4 => PasswordPolicyError::MustSupplyOldPassword,
            5 => PasswordPolicyError::InvalidPasswordSyntax,
            6 => PasswordPolicyError::PasswordTooShort,
            7 => PasswordPolicyError::PasswordTooYoung,
            8 => PasswordPolicyError::PasswordInHistory,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordPolicyResponse {
    pub seconds_before_expiration: Option<i64>,
    pub grace_logins_remaining: Option<i64>,
    pub error: Option<PasswordPolicyError>,
}

/// A non-critical request control; servers that don't implement the
/// password policy draft simply ignore it instead of failing the bind.
pub fn request_control() -> RawControl {
    RawControl { ctype: PPOLICY_OID.to_string(), crit: false, val: None }
}

/// Pull the password policy response control out of a bind result, if the
/// server sent one, and decode its value.
pub fn response_from(result: &LdapResult) -> Option<PasswordPolicyResponse> {
    let raw = result.ctrls.iter().find(|c| c.ctype == PPOLICY_OID)?;
    let val = raw.val.as_deref()?;
    Some(decode(val))
}

/// BER reader for this control's one possible value shape: a SEQUENCE
/// holding an optional `[0]` constructed warning choice (itself an
/// INTEGER tagged `[0]` or `[1]`) and an optional `[1]` primitive
/// ENUMERATED error code. Short-form lengths only -- these values never
/// approach the 128-byte long-form threshold.
fn decode(val: &[u8]) -> PasswordPolicyResponse {
    let mut out = PasswordPolicyResponse::default();
    let Some(((_seq_tag, body), _)) = read_tlv(val) else { return out };
    let mut rest = body;
    while let Some(((tag, content), remainder)) = read_tlv(rest) {
        match tag {
            0xa0 => {
                if let Some(((inner_tag, inner_content), _)) = read_tlv(content) {
                    let value = decode_integer(inner_content);
                    match inner_tag {
                        0x80 => out.seconds_before_expiration = Some(value),
                        0x81 => out.grace_logins_remaining = Some(value),
                        _ => {}
                    }
                }
            }
            0x81 => out.error = PasswordPolicyError::from_enumerated(decode_integer(content)),
            _ => {}
        }
        rest = remainder;
    }
    out
}

fn read_tlv(data: &[u8]) -> Option<((u8, &[u8]), &[u8])> {
    let &tag = data.first()?;
    let &len = data.get(1)?;
    if len & 0x80 != 0 {
        return None;
    }
    let len = len as usize;
    let content = data.get(2..2 + len)?;
    let rest = &data[2 + len..];
    Some(((tag, content), rest))
}

fn decode_integer(bytes: &[u8]) -> i64 {
    bytes.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_change_after_reset_error() {
        // SEQUENCE { error [1] ENUMERATED 2 }
        let val = [0x30, 0x03, 0x81, 0x01, 0x02];
        let response = decode(&val);
        assert_eq!(response.error, Some(PasswordPolicyError::ChangeAfterReset));
        assert_eq!(response.seconds_before_expiration, None);
    }

    #[test]
    fn decodes_a_time_before_expiration_warning() {
        // SEQUENCE { warning [0] { timeBeforeExpiration [0] INTEGER 86400 } }
        let val = [0x30, 0x07, 0xa0, 0x05, 0x80, 0x03, 0x01, 0x51, 0x80];
        let response = decode(&val);
        assert_eq!(response.seconds_before_expiration, Some(0x015180));
        assert_eq!(response.error, None);
    }
}
