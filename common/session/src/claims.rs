use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::{DecodeError, DecodeResult};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// base64url as browsers decode it: padding optional, trailing bits ignored.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Role claim carried by a dashboard token. Matching is exact and
/// case-sensitive: only `"admin"` maps to [`Role::Admin`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Role {
    Admin,
    User,
    Other(String),
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value {
            ROLE_ADMIN => Role::Admin,
            ROLE_USER => Role::User,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::User => ROLE_USER,
            Role::Other(value) => value,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Claims decoded from a dashboard token payload. Nothing here has been
/// checked cryptographically; the backend API remains the trust boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    pub subject: i64,
    pub email: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// `exp * 1000 > now_ms`, strictly.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at
            .timestamp()
            .checked_mul(1000)
            .map(|exp_ms| exp_ms > now_ms)
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    id: Option<SubjectRepr>,
    #[serde(default)]
    sub: Option<SubjectRepr>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    exp: Option<Number>,
    #[serde(default)]
    iat: Option<Number>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubjectRepr {
    Numeric(i64),
    Text(String),
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = DecodeError;

    fn try_from(value: ClaimsRepr) -> DecodeResult<Self> {
        let (field, subject) = match (value.id, value.sub) {
            (Some(id), _) => ("id", id),
            (None, Some(sub)) => ("sub", sub),
            (None, None) => return Err(DecodeError::MissingClaim("sub")),
        };
        let subject = match subject {
            SubjectRepr::Numeric(id) => id,
            SubjectRepr::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| DecodeError::InvalidClaim(field, text.clone()))?,
        };

        let email = value.email.ok_or(DecodeError::MissingClaim("email"))?;
        let role = value
            .role
            .map(|role| Role::parse(&role))
            .ok_or(DecodeError::MissingClaim("role"))?;

        let exp = value.exp.ok_or(DecodeError::MissingClaim("exp"))?;
        let expires_at = timestamp_claim("exp", &exp)?;

        let issued_at = match value.iat {
            Some(iat) => Some(timestamp_claim("iat", &iat)?),
            None => None,
        };

        Ok(Self {
            subject,
            email,
            role,
            expires_at,
            issued_at,
            raw: serde_json::Value::Null,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = DecodeError;

    fn try_from(value: serde_json::Value) -> DecodeResult<Self> {
        if !value.is_object() {
            return Err(DecodeError::Json("payload is not a JSON object".to_string()));
        }
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| DecodeError::Json(err.to_string()))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }
}

fn timestamp_claim(name: &'static str, value: &Number) -> DecodeResult<DateTime<Utc>> {
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
        .ok_or_else(|| DecodeError::InvalidClaim(name, value.to_string()))?;
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| DecodeError::InvalidClaim(name, value.to_string()))
}

/// Decode the payload segment of a compact JWT into [`Claims`].
///
/// The signature is not verified. Only the structure (three non-empty
/// dot-separated segments, a base64url JSON object payload) and the presence
/// of the required claims are checked.
pub fn decode(token: &str) -> DecodeResult<Claims> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(DecodeError::Segments(segments.len()));
    }

    let payload = PAYLOAD_ENGINE
        .decode(segments[1])
        .map_err(|err| DecodeError::Base64(err.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_slice(&payload).map_err(|err| DecodeError::Json(err.to_string()))?;

    Claims::try_from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;

    fn token_for(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    #[test]
    fn decode_reads_required_claims() {
        let token = token_for(json!({
            "id": 42,
            "email": "grower@fieldeyes.io",
            "role": "admin",
            "exp": 1_900_000_000,
            "iat": 1_800_000_000
        }));

        let claims = decode(&token).expect("claims");
        assert_eq!(claims.subject, 42);
        assert_eq!(claims.email, "grower@fieldeyes.io");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(claims.issued_at.map(|at| at.timestamp()), Some(1_800_000_000));
        assert_eq!(claims.raw["email"], "grower@fieldeyes.io");
    }

    #[test]
    fn decode_accepts_numeric_string_subject() {
        let token = token_for(json!({
            "sub": "7",
            "email": "ops@fieldeyes.io",
            "role": "user",
            "exp": 1_900_000_000
        }));
        let claims = decode(&token).expect("claims");
        assert_eq!(claims.subject, 7);
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn decode_rejects_wrong_segment_count() {
        assert_eq!(decode("abc.def"), Err(DecodeError::Segments(2)));
        assert_eq!(decode(""), Err(DecodeError::Segments(1)));
        assert_eq!(decode("a..c"), Err(DecodeError::Segments(3)));
        assert!(matches!(decode("a.b.c.d"), Err(DecodeError::Segments(4))));
    }

    #[test]
    fn decode_rejects_non_base64_payload() {
        let err = decode("aGVhZGVy.***.c2ln").expect_err("should reject");
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn decode_rejects_non_object_payload() {
        let token = token_for(json!([1, 2, 3]));
        assert!(matches!(decode(&token), Err(DecodeError::Json(_))));
    }

    #[test]
    fn decode_reports_missing_claims() {
        let token = token_for(json!({ "id": 1, "role": "user", "exp": 1_900_000_000 }));
        assert_eq!(decode(&token), Err(DecodeError::MissingClaim("email")));

        let token = token_for(json!({ "id": 1, "email": "a@b.c", "role": "user" }));
        assert_eq!(decode(&token), Err(DecodeError::MissingClaim("exp")));

        let token = token_for(json!({ "email": "a@b.c", "role": "user", "exp": 1 }));
        assert_eq!(decode(&token), Err(DecodeError::MissingClaim("sub")));
    }

    #[test]
    fn decode_rejects_non_numeric_subject() {
        let token = token_for(json!({
            "sub": "grower",
            "email": "a@b.c",
            "role": "user",
            "exp": 1_900_000_000
        }));
        assert_eq!(
            decode(&token),
            Err(DecodeError::InvalidClaim("sub", "grower".to_string()))
        );
    }

    #[test]
    fn decode_names_the_subject_field_present() {
        let token = token_for(json!({
            "id": "grower",
            "sub": "7",
            "email": "a@b.c",
            "role": "user",
            "exp": 1_900_000_000
        }));
        assert_eq!(
            decode(&token),
            Err(DecodeError::InvalidClaim("id", "grower".to_string()))
        );
    }

    #[test]
    fn decode_tolerates_padding_and_trailing_bits() {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

        let mut json = json!({
            "id": 3,
            "email": "a@b.c",
            "role": "user",
            "exp": 1_900_000_000
        })
        .to_string();
        while json.len() % 3 != 1 {
            json.push(' ');
        }
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let body = URL_SAFE_NO_PAD.encode(&json);

        let padded = format!("{header}.{body}==.c2ln");
        assert_eq!(decode(&padded).expect("padded").subject, 3);

        let mut loose = body.into_bytes();
        let last = loose.last_mut().expect("non-empty body");
        let index = ALPHABET.iter().position(|c| *c == *last).expect("alphabet");
        *last = ALPHABET[index | 1];
        let loose = String::from_utf8(loose).expect("ascii");
        let token = format!("{header}.{loose}.c2ln");
        assert_eq!(decode(&token).expect("trailing bits").subject, 3);
    }

    #[test]
    fn role_match_is_case_sensitive() {
        assert!(Role::parse("admin").is_admin());
        assert!(!Role::parse("Admin").is_admin());
        assert!(!Role::parse("ADMIN").is_admin());
        assert_eq!(Role::parse("agronomist"), Role::Other("agronomist".into()));
    }

    #[test]
    fn validity_is_strict_on_expiry_boundary() {
        let token = token_for(json!({
            "id": 1,
            "email": "a@b.c",
            "role": "user",
            "exp": 1_000
        }));
        let claims = decode(&token).expect("claims");
        assert!(claims.is_valid_at(999_999));
        assert!(!claims.is_valid_at(1_000_000));
        assert!(!claims.is_valid_at(1_000_001));
    }
}
