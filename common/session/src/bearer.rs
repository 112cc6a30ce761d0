use http::HeaderValue;

use crate::error::BearerError;

/// Build the `Authorization` header value collaborators attach to API calls.
pub fn bearer_header(token: &str) -> Result<HeaderValue, BearerError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(BearerError::EmptyToken);
    }

    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| BearerError::InvalidAuthorization)?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_marked_sensitive() {
        let header = bearer_header("abc.def.ghi").expect("header");
        assert_eq!(header, "Bearer abc.def.ghi");
        assert!(header.is_sensitive());
    }

    #[test]
    fn bearer_header_rejects_empty_token() {
        assert_eq!(bearer_header("   "), Err(BearerError::EmptyToken));
    }

    #[test]
    fn bearer_header_rejects_control_characters() {
        assert_eq!(
            bearer_header("abc\ndef"),
            Err(BearerError::InvalidAuthorization)
        );
    }
}
