//! Upstream path translation.
//!
//! The proxy follows a fixed routing convention: every hyphen in the inbound
//! path becomes a path separator, so `/user-profile` is served by the upstream
//! at `/user/profile`. The query string is passed through untouched.

/// Rewrite an inbound target (path plus optional query) to its upstream form.
pub fn translate_path(target: &str) -> String {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let mut translated = String::with_capacity(target.len() + 1);
    if !path.starts_with('/') {
        translated.push('/');
    }
    translated.push_str(&path.replace('-', "/"));

    if let Some(query) = query {
        translated.push('?');
        translated.push_str(query);
    }
    translated
}

/// Join the upstream base address with the translated target.
pub fn upstream_url(base: &str, target: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), translate_path(target))
}
