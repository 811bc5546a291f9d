//! Cookie and credentials file codecs.
//!
//! Cookie files come in two shapes: simple `name=value[; attrs]` lines
//! (one cookie per line, Set-Cookie style) and tab-delimited Netscape
//! rows. Both are normalized into a single `; `-joined cookie header.

use crate::error::{Error, Result};

/// Cookie attribute names that must not be treated as cookie pairs.
const RESERVED_ATTRIBUTES: &[&str] = &[
    "path", "domain", "expires", "max-age", "secure", "httponly", "samesite",
];

/// Parse a cookie file into a single HTTP cookie header string.
///
/// Parsing an already-normalized header returns it unchanged.
pub fn parse_cookie_file(content: &str) -> Result<String> {
    let mut pairs: Vec<String> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.contains('\t') {
            // Netscape format: domain flag path secure expiry name value
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() >= 7 {
                let name = fields[5].trim();
                let value = fields[6].trim();
                if !name.is_empty() {
                    pairs.push(format!("{}={}", name, value));
                }
            }
            continue;
        }

        // Simple format: every `name=value` segment that is not a cookie
        // attribute is kept, so a normalized header line passes through.
        for segment in line.split(';') {
            let segment = segment.trim();
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || RESERVED_ATTRIBUTES.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            pairs.push(format!("{}={}", name, value.trim()));
        }
    }

    if pairs.is_empty() {
        return Err(Error::Authentication(
            "Cookie file contained no usable cookies".into(),
        ));
    }

    Ok(pairs.join("; "))
}

/// Parse a credentials file of the form `email=...\npassword=...`.
pub fn parse_credentials_file(content: &str) -> Result<(String, String)> {
    let mut email = None;
    let mut password = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("email=") {
            email = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("password=") {
            password = Some(value.trim().to_string());
        }
    }

    match (email, password) {
        (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => Ok((e, p)),
        _ => Err(Error::Authentication(
            "Credentials file must contain non-empty email= and password= lines".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_lines() {
        let content = "session=abc123\nuser_id=42\n";
        assert_eq!(
            parse_cookie_file(content).unwrap(),
            "session=abc123; user_id=42"
        );
    }

    #[test]
    fn test_parse_set_cookie_style_strips_attributes() {
        let content = "session=abc123; Path=/; HttpOnly; Expires=Wed, 01 Jan 2031 00:00:00 GMT\n";
        assert_eq!(parse_cookie_file(content).unwrap(), "session=abc123");
    }

    #[test]
    fn test_parse_netscape_rows() {
        let content = "# Netscape HTTP Cookie File\n\
                       .example.com\tTRUE\t/\tTRUE\t0\tsession\tabc123\n\
                       .example.com\tTRUE\t/\tFALSE\t0\tuser_id\t42\n";
        assert_eq!(
            parse_cookie_file(content).unwrap(),
            "session=abc123; user_id=42"
        );
    }

    #[test]
    fn test_parse_is_idempotent() {
        let header = "session=abc123; user_id=42";
        let once = parse_cookie_file(header).unwrap();
        assert_eq!(once, header);
        let twice = parse_cookie_file(&once).unwrap();
        assert_eq!(twice, header);
    }

    #[test]
    fn test_empty_file_is_an_error() {
        assert!(parse_cookie_file("").is_err());
        assert!(parse_cookie_file("# just a comment\n").is_err());
    }

    #[test]
    fn test_parse_credentials() {
        let content = "email=user@example.com\npassword=hunter2\n";
        let (email, password) = parse_credentials_file(content).unwrap();
        assert_eq!(email, "user@example.com");
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn test_parse_credentials_missing_password() {
        assert!(parse_credentials_file("email=user@example.com\n").is_err());
    }
}
