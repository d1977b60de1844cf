//! Domain name normalization.
//!
//! Every entry point that accepts a domain runs it through [`normalize`]
//! before using it as a cache key, a provider argument, a history record or
//! a saved-domain row, so `"Example.com"`, `"https://example.com/x"` and
//! `"example.com"` all resolve to the same value.

use crate::error::AppError;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize and validate a user-supplied domain.
///
/// # Steps
///
/// 1. Trim whitespace and lower-case
/// 2. Strip a `scheme://` prefix and any `user:pass@` part
/// 3. Cut everything from the first `/`, `?` or `#`
/// 4. Strip a `:port` suffix and a trailing dot
///
/// # Errors
///
/// `InvalidRequest` if what is left is not a syntactically valid host name
/// with at least two labels.
pub fn normalize(raw: &str) -> Result<String, AppError> {
    let lowered = raw.trim().to_ascii_lowercase();

    let without_scheme = match lowered.find("://") {
        Some(idx) => &lowered[idx + 3..],
        None => lowered.as_str(),
    };

    let host_part = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    let host_part = match host_part.rfind('@') {
        Some(idx) => &host_part[idx + 1..],
        None => host_part,
    };

    let host = match host_part.split_once(':') {
        Some((host, _port)) => host,
        None => host_part,
    };

    let host = host.strip_suffix('.').unwrap_or(host);

    validate(host)?;

    Ok(host.to_string())
}

fn validate(host: &str) -> Result<(), AppError> {
    if host.is_empty() {
        return Err(AppError::invalid("Domain is required"));
    }

    if host.len() > MAX_DOMAIN_LEN {
        return Err(AppError::invalid("Domain exceeds 253 characters"));
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return Err(AppError::invalid(format!("Invalid domain: {host}")));
    }

    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');

        if !valid {
            return Err(AppError::invalid(format!("Invalid domain: {host}")));
        }
    }

    Ok(())
}

/// Normalize a list of domains, dropping duplicates while keeping order.
pub fn normalize_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let domain = normalize(item.as_ref())?;
        if !out.contains(&domain) {
            out.push(domain);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spellings_of_the_same_domain_collapse() {
        for raw in [
            "example.com",
            "Example.com",
            "  EXAMPLE.COM ",
            "https://example.com/x",
            "HTTPS://Example.com/path?q=1#frag",
            "http://user:pw@example.com:8080/",
            "example.com.",
        ] {
            assert_eq!(normalize(raw).unwrap(), "example.com", "input {raw:?}");
        }
    }

    #[test]
    fn subdomains_are_preserved() {
        assert_eq!(normalize("WWW.Example.co.uk").unwrap(), "www.example.co.uk");
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "   ", "localhost", "exa mple.com", "-bad.com", "a..com", "ex_ample.com"] {
            assert!(normalize(raw).is_err(), "input {raw:?}");
        }

        let long_label = format!("{}.com", "a".repeat(64));
        assert!(normalize(&long_label).is_err());
    }

    #[test]
    fn normalize_all_deduplicates() {
        let domains = normalize_all(&["Example.com", "https://example.com", "other.org"]).unwrap();
        assert_eq!(domains, vec!["example.com", "other.org"]);
    }
}
