//! Payloads carried inside envelopes, and the closed set of sign-in results.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

use crate::{error::Error, protector::EnvelopeProtector};

/// Longest lifetime a request or response envelope may be configured with.
pub const MAX_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Clamp a configured lifetime to `-MAX_TTL_SECONDS..=MAX_TTL_SECONDS`.
#[must_use]
pub const fn clamp_ttl_seconds(seconds: i64) -> i64 {
    if seconds > MAX_TTL_SECONDS {
        MAX_TTL_SECONDS
    } else if seconds < -MAX_TTL_SECONDS {
        -MAX_TTL_SECONDS
    } else {
        seconds
    }
}

/// `now + ttl`, saturating at the ends of the representable range.
#[must_use]
pub fn saturating_expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    match now.checked_add_signed(ttl) {
        Some(expiry) => expiry,
        None if ttl < Duration::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// Terminal outcome of a sign-in, as seen on the wire and by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignInResult {
    Succeeded,
    Failed,
    /// Two-factor sign-in is not supported; this is always a failure.
    RequiresTwoFactor,
    IsLockedOut,
    IsNotAllowed,
}

impl SignInResult {
    #[must_use]
    pub fn succeeded(self) -> bool {
        self == Self::Succeeded
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::RequiresTwoFactor => "RequiresTwoFactor",
            Self::IsLockedOut => "IsLockedOut",
            Self::IsNotAllowed => "IsNotAllowed",
        }
    }
}

impl fmt::Display for SignInResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Error> for SignInResult {
    fn from(err: &Error) -> Self {
        match err {
            Error::UnsupportedFactor => Self::RequiresTwoFactor,
            Error::AccountLocked => Self::IsLockedOut,
            Error::AccountNotAllowed => Self::IsNotAllowed,
            _ => Self::Failed,
        }
    }
}

/// What the interactive app collects from the user.
#[derive(Clone)]
pub struct Credentials {
    pub user_name: String,
    pub password: SecretString,
    pub remember_me: bool,
}

impl Credentials {
    #[must_use]
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: SecretString::from(password.into()),
            remember_me: false,
        }
    }

    #[must_use]
    pub fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    /// Both user name and password are required.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.user_name.trim().is_empty() && !self.password.expose_secret().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("remember_me", &self.remember_me)
            .finish_non_exhaustive()
    }
}

/// Common behaviour of payloads stamped with an expiry.
pub trait Expiring {
    fn expiration_utc(&self) -> DateTime<Utc>;

    /// Reject the payload once `now` is past its expiry.
    ///
    /// # Errors
    /// Returns [`Error::Expired`] when the payload is stale.
    fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.expiration_utc() < now {
            Err(Error::Expired)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub user_name: String,
    pub password: String,
    pub remember_me: bool,
    pub lockout_on_failure: bool,
    pub expiration_utc: DateTime<Utc>,
}

impl SignInRequest {
    #[must_use]
    pub fn from_credentials(
        credentials: &Credentials,
        lockout_on_failure: bool,
        ttl: Duration,
    ) -> Self {
        Self {
            user_name: credentials.user_name.trim().to_string(),
            password: credentials.password.expose_secret().to_string(),
            remember_me: credentials.remember_me,
            lockout_on_failure,
            expiration_utc: saturating_expiry(Utc::now(), ttl),
        }
    }
}

impl fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInRequest")
            .field("user_name", &self.user_name)
            .field("remember_me", &self.remember_me)
            .field("lockout_on_failure", &self.lockout_on_failure)
            .field("expiration_utc", &self.expiration_utc)
            .finish_non_exhaustive()
    }
}

impl Expiring for SignInRequest {
    fn expiration_utc(&self) -> DateTime<Utc> {
        self.expiration_utc
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub user_name: String,
    pub expiration_utc: DateTime<Utc>,
}

impl RefreshRequest {
    #[must_use]
    pub fn new(user_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            user_name: user_name.into(),
            expiration_utc: saturating_expiry(Utc::now(), ttl),
        }
    }
}

impl Expiring for RefreshRequest {
    fn expiration_utc(&self) -> DateTime<Utc> {
        self.expiration_utc
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub result: SignInResult,
    pub expiration_utc: DateTime<Utc>,
}

impl ResultResponse {
    #[must_use]
    pub fn new(result: SignInResult, ttl: Duration) -> Self {
        Self {
            result,
            expiration_utc: saturating_expiry(Utc::now(), ttl),
        }
    }
}

impl Expiring for ResultResponse {
    fn expiration_utc(&self) -> DateTime<Utc> {
        self.expiration_utc
    }
}

/// Serialize `payload` and seal it for `purpose`.
///
/// # Errors
/// Returns [`Error::MalformedEnvelope`] if serialization or sealing fails.
pub fn seal<T: Serialize>(
    protector: &EnvelopeProtector,
    purpose: &str,
    payload: &T,
) -> Result<String, Error> {
    let plaintext = serde_json::to_vec(payload)?;
    protector.protect(purpose, &plaintext)
}

/// Open an envelope sealed for `purpose` and parse its payload.
///
/// Empty or whitespace-only plaintext is rejected like any other malformed input.
///
/// # Errors
/// Returns [`Error::MalformedEnvelope`] on any decryption or parsing failure.
pub fn open<T: DeserializeOwned>(
    protector: &EnvelopeProtector,
    purpose: &str,
    envelope: &str,
) -> Result<T, Error> {
    let plaintext = protector.unprotect(purpose, envelope)?;
    if plaintext.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::MalformedEnvelope);
    }
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protector::{PURPOSE_LOGIN, PURPOSE_REFRESH};
    use anyhow::Result;
    use serde_json::{json, Value};

    #[test]
    fn error_mapping_covers_result_codes() {
        assert_eq!(
            SignInResult::from(&Error::UnsupportedFactor),
            SignInResult::RequiresTwoFactor
        );
        assert_eq!(
            SignInResult::from(&Error::AccountLocked),
            SignInResult::IsLockedOut
        );
        assert_eq!(
            SignInResult::from(&Error::AccountNotAllowed),
            SignInResult::IsNotAllowed
        );
        for err in [
            Error::MalformedEnvelope,
            Error::Expired,
            Error::CredentialsInvalid,
            Error::TransportFailure,
            Error::UserNotFound("bob".to_string()),
        ] {
            assert_eq!(SignInResult::from(&err), SignInResult::Failed);
        }
    }

    #[test]
    fn sign_in_request_uses_camel_case() -> Result<()> {
        let credentials = Credentials::new(" alice ", "hunter2").with_remember_me(true);
        let request = SignInRequest::from_credentials(&credentials, true, Duration::seconds(5));
        let value: Value = serde_json::to_value(&request)?;

        assert_eq!(value["userName"], json!("alice"));
        assert_eq!(value["password"], json!("hunter2"));
        assert_eq!(value["rememberMe"], json!(true));
        assert_eq!(value["lockoutOnFailure"], json!(true));
        assert!(value["expirationUtc"].is_string());
        Ok(())
    }

    #[test]
    fn result_response_serializes_code_by_name() -> Result<()> {
        let response = ResultResponse::new(SignInResult::IsLockedOut, Duration::seconds(60));
        let value: Value = serde_json::to_value(&response)?;
        assert_eq!(value["result"], json!("IsLockedOut"));

        let parsed: ResultResponse = serde_json::from_value(value)?;
        assert_eq!(parsed.result, SignInResult::IsLockedOut);
        Ok(())
    }

    #[test]
    fn unknown_result_code_is_rejected() {
        let parsed = serde_json::from_value::<ResultResponse>(json!({
            "result": "Maybe",
            "expirationUtc": "2030-01-01T00:00:00Z",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn ensure_fresh_checks_expiry() {
        let now = Utc::now();
        let fresh = RefreshRequest {
            user_name: "alice".to_string(),
            expiration_utc: now + Duration::seconds(1),
        };
        let stale = RefreshRequest {
            user_name: "alice".to_string(),
            expiration_utc: now - Duration::seconds(1),
        };
        assert!(fresh.ensure_fresh(now).is_ok());
        assert!(matches!(stale.ensure_fresh(now), Err(Error::Expired)));
    }

    #[test]
    fn oversized_lifetimes_saturate() {
        assert_eq!(clamp_ttl_seconds(100_000_000_000_000), MAX_TTL_SECONDS);
        assert_eq!(clamp_ttl_seconds(-100_000_000_000_000), -MAX_TTL_SECONDS);
        assert_eq!(clamp_ttl_seconds(60), 60);

        let now = Utc::now();
        let far = Duration::days(365 * 1_000_000);
        assert_eq!(saturating_expiry(now, far), DateTime::<Utc>::MAX_UTC);
        assert_eq!(saturating_expiry(now, -far), DateTime::<Utc>::MIN_UTC);

        let response = ResultResponse::new(SignInResult::Failed, far);
        assert!(response.ensure_fresh(now).is_ok());
        let request = RefreshRequest::new("alice", -far);
        assert!(matches!(request.ensure_fresh(now), Err(Error::Expired)));
    }

    #[test]
    fn credentials_require_name_and_password() {
        assert!(Credentials::new("alice", "pw").is_complete());
        assert!(!Credentials::new("  ", "pw").is_complete());
        assert!(!Credentials::new("alice", "").is_complete());
    }

    #[test]
    fn seal_then_open_under_same_purpose() -> Result<()> {
        let protector = EnvelopeProtector::from_key([3u8; 32]);
        let request = RefreshRequest::new("alice", Duration::seconds(5));
        let envelope = seal(&protector, PURPOSE_REFRESH, &request)?;

        let opened: RefreshRequest = open(&protector, PURPOSE_REFRESH, &envelope)?;
        assert_eq!(opened, request);

        let wrong = open::<RefreshRequest>(&protector, PURPOSE_LOGIN, &envelope);
        assert!(matches!(wrong, Err(Error::MalformedEnvelope)));
        Ok(())
    }

    #[test]
    fn open_rejects_blank_and_mismatched_plaintext() -> Result<()> {
        let protector = EnvelopeProtector::from_key([3u8; 32]);

        let blank = protector.protect(PURPOSE_LOGIN, b"  \n")?;
        assert!(matches!(
            open::<SignInRequest>(&protector, PURPOSE_LOGIN, &blank),
            Err(Error::MalformedEnvelope)
        ));

        let not_a_request = protector.protect(PURPOSE_LOGIN, br#"{"hello":"world"}"#)?;
        assert!(matches!(
            open::<SignInRequest>(&protector, PURPOSE_LOGIN, &not_a_request),
            Err(Error::MalformedEnvelope)
        ));
        Ok(())
    }

    #[test]
    fn debug_output_hides_passwords() {
        let credentials = Credentials::new("alice", "hunter2");
        assert!(!format!("{credentials:?}").contains("hunter2"));

        let request = SignInRequest::from_credentials(&credentials, false, Duration::seconds(5));
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
