//! URL utilities for consistent gateway endpoint construction
//!
//! Base URLs come from config or environment and may carry trailing slashes;
//! these helpers keep the joined endpoint URLs free of doubled separators.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use palabre::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://gw.example.com/api"), "https://gw.example.com/api");
/// assert_eq!(normalize_base_url("https://gw.example.com/api/"), "https://gw.example.com/api");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and endpoint path.
///
/// # Examples
///
/// ```
/// use palabre::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://gw.example.com/api", "chat"),
///     "https://gw.example.com/api/chat"
/// );
/// assert_eq!(
///     construct_api_url("https://gw.example.com/api/", "/whoami"),
///     "https://gw.example.com/api/whoami"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
