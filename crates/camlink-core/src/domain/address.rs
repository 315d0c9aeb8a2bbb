//! Address resolution: raw user input → ordered WebSocket candidate URIs.
//!
//! Users type whatever they have at hand: a bare IP, an `http://` URL copied
//! from a browser, or the full `ws://host/ws` endpoint.  The resolver
//! normalizes that into a short, ordered list of URIs that the connection
//! session tries one after another.
//!
//! Rules, applied in order:
//!
//! | Input shape                      | Candidates                         |
//! |----------------------------------|------------------------------------|
//! | `192.168.22.215`                 | `ws://192.168.22.215`, `ws://192.168.22.215/ws` |
//! | `http://dev.local/`              | `ws://dev.local/`, `ws://dev.local/ws` |
//! | `ws://192.168.22.215/ws`         | `ws://192.168.22.215/ws`           |
//! | `ftp://host`                     | error: unsupported scheme          |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Path suffix under which camera firmware serves its WebSocket endpoint.
const WS_PATH: &str = "ws";

/// Errors produced when a raw address cannot become a usable candidate list.
///
/// Every variant belongs to the "invalid address" category: the caller
/// surfaces it immediately and never retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The input was empty or only whitespace.
    #[error("invalid address: input is empty")]
    Empty,

    /// The input carried a scheme other than http, https, ws or wss.
    #[error("invalid address: unsupported scheme '{scheme}' in '{input}'")]
    UnsupportedScheme { scheme: String, input: String },

    /// A normalized candidate is not a valid URI with a host.
    #[error("invalid address: '{candidate}' is not a usable URI: {reason}")]
    Unparseable { candidate: String, reason: String },
}

/// The kind of device on the other end of the link.
///
/// Known kinds announce themselves over mDNS under a fixed hostname, which
/// the resolver appends as a last-resort candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// No mDNS fallback.
    #[default]
    Unknown,
    Face,
    LeftEye,
    RightEye,
}

impl DeviceKind {
    /// The mDNS endpoint this kind of device advertises, if any.
    pub fn mdns_endpoint(self) -> Option<&'static str> {
        match self {
            DeviceKind::Unknown => None,
            DeviceKind::Face => Some("ws://paper1.local:80/ws"),
            DeviceKind::LeftEye => Some("ws://paper2.local:80/ws"),
            DeviceKind::RightEye => Some("ws://paper3.local:80/ws"),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Unknown => "unknown",
            DeviceKind::Face => "face",
            DeviceKind::LeftEye => "left_eye",
            DeviceKind::RightEye => "right_eye",
        };
        f.write_str(name)
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "unknown" | "" => Ok(DeviceKind::Unknown),
            "face" => Ok(DeviceKind::Face),
            "left_eye" | "lefteye" => Ok(DeviceKind::LeftEye),
            "right_eye" | "righteye" => Ok(DeviceKind::RightEye),
            other => Err(format!(
                "unknown device kind '{other}' (expected unknown, face, left_eye or right_eye)"
            )),
        }
    }
}

/// Ordered, deduplicated, non-empty list of candidate URIs.
///
/// Immutable once produced; the only way to obtain one is
/// [`AddressResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressCandidates(Vec<String>);

impl AddressCandidates {
    /// The candidate tried first.
    pub fn primary(&self) -> &str {
        // Construction guarantees at least one element.
        &self.0[0]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a AddressCandidates {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for AddressCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Turns raw user input into [`AddressCandidates`].
///
/// # Examples
///
/// ```rust
/// use camlink_core::AddressResolver;
///
/// let candidates = AddressResolver::new().resolve("192.168.22.215").unwrap();
/// assert_eq!(
///     candidates.as_slice(),
///     ["ws://192.168.22.215", "ws://192.168.22.215/ws"]
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver {
    device_kind: DeviceKind,
}

impl AddressResolver {
    /// Creates a resolver with no device-specific fallbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the mDNS endpoint of `kind` after the normalized candidates.
    pub fn with_device_kind(mut self, kind: DeviceKind) -> Self {
        self.device_kind = kind;
        self
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    /// Normalizes `raw` and derives the ordered candidate list.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] when the input is empty, carries an
    /// unsupported scheme, or does not form a URI with a host.
    pub fn resolve(&self, raw: &str) -> Result<AddressCandidates, AddressError> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        let base = normalize_scheme(input)?;

        let mut candidates = vec![base.clone()];
        if let Some(alternate) = ws_path_variant(&base) {
            candidates.push(alternate);
        }
        if let Some(endpoint) = self.device_kind.mdns_endpoint() {
            candidates.push(endpoint.to_string());
        }

        let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                validate(&candidate)?;
                unique.push(candidate);
            }
        }

        tracing::debug!(input, candidates = ?unique, "resolved address");
        Ok(AddressCandidates(unique))
    }
}

/// Maps http/https to ws/wss, keeps ws/wss, and defaults to `ws://`.
fn normalize_scheme(input: &str) -> Result<String, AddressError> {
    let Some(idx) = input.find("://") else {
        return Ok(format!("ws://{input}"));
    };

    let (scheme, rest) = (&input[..idx], &input[idx + 3..]);
    let mapped = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => {
            return Err(AddressError::UnsupportedScheme {
                scheme: scheme.to_string(),
                input: input.to_string(),
            })
        }
    };
    Ok(format!("{mapped}://{rest}"))
}

/// The `/ws` sibling of `base`, or `None` if `base` already targets it.
fn ws_path_variant(base: &str) -> Option<String> {
    // Only look at what follows the authority so a host named "ws" is not
    // mistaken for the path.
    let after_scheme = base.find("://").map_or(base, |idx| &base[idx + 3..]);
    let has_path = after_scheme.contains('/');

    if has_path && base.ends_with("/ws") {
        None
    } else if base.ends_with('/') {
        Some(format!("{base}{WS_PATH}"))
    } else {
        Some(format!("{base}/{WS_PATH}"))
    }
}

fn validate(candidate: &str) -> Result<(), AddressError> {
    let parsed = Url::parse(candidate).map_err(|e| AddressError::Unparseable {
        candidate: candidate.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(AddressError::Unparseable {
            candidate: candidate.to_string(),
            reason: "missing host".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(raw: &str) -> Result<Vec<String>, AddressError> {
        AddressResolver::new().resolve(raw).map(|c| c.as_slice().to_vec())
    }

    // ── Scheme normalization ──────────────────────────────────────────────────

    #[test]
    fn test_bare_ip_gets_ws_scheme_and_ws_path_variant() {
        assert_eq!(
            resolve("192.168.22.215").unwrap(),
            vec!["ws://192.168.22.215", "ws://192.168.22.215/ws"]
        );
    }

    #[test]
    fn test_http_scheme_becomes_ws() {
        let candidates = resolve("http://cam.local/stream").unwrap();
        assert_eq!(candidates[0], "ws://cam.local/stream");
    }

    #[test]
    fn test_https_scheme_becomes_wss() {
        let candidates = resolve("https://cam.local").unwrap();
        assert_eq!(candidates, vec!["wss://cam.local", "wss://cam.local/ws"]);
    }

    #[test]
    fn test_scheme_match_is_case_insensitive() {
        let candidates = resolve("HTTP://cam.local").unwrap();
        assert_eq!(candidates[0], "ws://cam.local");
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(resolve("  10.0.0.7  ").unwrap()[0], "ws://10.0.0.7");
    }

    #[test]
    fn test_host_with_port_keeps_port() {
        assert_eq!(
            resolve("10.0.0.7:8080").unwrap(),
            vec!["ws://10.0.0.7:8080", "ws://10.0.0.7:8080/ws"]
        );
    }

    // ── /ws variant ───────────────────────────────────────────────────────────

    #[test]
    fn test_full_ws_endpoint_yields_single_candidate() {
        assert_eq!(
            resolve("ws://192.168.22.215/ws").unwrap(),
            vec!["ws://192.168.22.215/ws"]
        );
    }

    #[test]
    fn test_trailing_slash_appends_ws_without_double_slash() {
        assert_eq!(
            resolve("http://dev.local/").unwrap(),
            vec!["ws://dev.local/", "ws://dev.local/ws"]
        );
    }

    #[test]
    fn test_host_named_ws_still_gets_path_variant() {
        assert_eq!(resolve("ws").unwrap(), vec!["ws://ws", "ws://ws/ws"]);
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_input_is_rejected() {
        assert_eq!(resolve("   "), Err(AddressError::Empty));
    }

    #[test]
    fn test_unsupported_scheme_is_rejected() {
        let err = resolve("ftp://cam.local").unwrap_err();
        assert!(matches!(
            err,
            AddressError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"
        ));
    }

    #[test]
    fn test_missing_host_is_unparseable() {
        let err = resolve("ws://").unwrap_err();
        assert!(matches!(err, AddressError::Unparseable { .. }));
    }

    // ── Device kind fallbacks ─────────────────────────────────────────────────

    #[test]
    fn test_device_kind_appends_mdns_candidate_last() {
        // Arrange
        let resolver = AddressResolver::new().with_device_kind(DeviceKind::LeftEye);

        // Act
        let candidates = resolver.resolve("10.0.0.9").unwrap();

        // Assert
        assert_eq!(
            candidates.as_slice(),
            ["ws://10.0.0.9", "ws://10.0.0.9/ws", "ws://paper2.local:80/ws"]
        );
    }

    #[test]
    fn test_device_kind_candidate_is_deduplicated() {
        let resolver = AddressResolver::new().with_device_kind(DeviceKind::Face);
        let candidates = resolver.resolve("ws://paper1.local:80/ws").unwrap();
        assert_eq!(candidates.as_slice(), ["ws://paper1.local:80/ws"]);
    }

    #[test]
    fn test_device_kind_parses_common_spellings() {
        assert_eq!("left-eye".parse::<DeviceKind>(), Ok(DeviceKind::LeftEye));
        assert_eq!("RightEye".parse::<DeviceKind>(), Ok(DeviceKind::RightEye));
        assert_eq!("face".parse::<DeviceKind>(), Ok(DeviceKind::Face));
        assert!("nose".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_primary_is_first_candidate() {
        let candidates = AddressResolver::new().resolve("cam.local").unwrap();
        assert_eq!(candidates.primary(), "ws://cam.local");
        assert_eq!(candidates.len(), 2);
        assert!(!candidates.is_empty());
    }
}
