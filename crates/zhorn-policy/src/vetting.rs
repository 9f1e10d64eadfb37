//! URL vetting adapter.
//!
//! A vetter classifies a destination structurally and either returns it
//! unchanged or neutralizes it to [`BLANK_DESTINATION`]. It never looks at
//! the whitelist.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;
use url::{ParseError, Url};

/// The neutral destination a vetter substitutes for unsafe input.
pub const BLANK_DESTINATION: &str = "about:blank";

/// Options controlling which non-web schemes a vetter tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VetOptions {
    /// Permit `ws:` / `wss:` destinations.
    pub allow_web_transport_uri: bool,
    /// Permit `javascript:`, `data:` and `blob:` destinations.
    pub allow_script_or_data_uri: bool,
}

impl VetOptions {
    /// Options used by the guard on every outbound call.
    #[must_use]
    pub fn guarded() -> Self {
        Self {
            allow_web_transport_uri: true,
            allow_script_or_data_uri: false,
        }
    }

    /// Options used for script URLs. Web transport, script, data and blob
    /// schemes pass vetting and are left to policy.
    #[must_use]
    pub fn script_url() -> Self {
        Self {
            allow_web_transport_uri: true,
            allow_script_or_data_uri: true,
        }
    }
}

/// Structural URL classifier.
pub trait UrlVetter: Send + Sync {
    /// Return `destination` unchanged when safe, or [`BLANK_DESTINATION`].
    fn vet(&self, destination: &str, options: &VetOptions) -> String;

    /// Whether vetting neutralized the destination.
    fn is_neutralized(&self, destination: &str, options: &VetOptions) -> bool {
        self.vet(destination, options) == BLANK_DESTINATION
    }

    /// Check that every query parameter of `destination`, and every key of
    /// `payload`, is in `allowed`.
    ///
    /// Object payloads contribute their keys; string payloads are read as
    /// `application/x-www-form-urlencoded`. Any other payload shape fails.
    fn check_params_over_whitelist(
        &self,
        destination: &str,
        allowed: &[&str],
        payload: Option<&Value>,
    ) -> bool {
        let Ok(url) = Url::parse(destination) else {
            return false;
        };

        let query_ok = url
            .query_pairs()
            .all(|(key, _)| allowed.contains(&key.as_ref()));
        if !query_ok {
            return false;
        }

        match payload {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.keys().all(|k| allowed.contains(&k.as_str())),
            Some(Value::String(body)) => url::form_urlencoded::parse(body.as_bytes())
                .all(|(key, _)| allowed.contains(&key.as_ref())),
            Some(_) => false,
        }
    }
}

/// Built-in scheme-based vetter.
///
/// | scheme | verdict |
/// |---|---|
/// | `http`, `https`, `mailto`, `tel` | safe |
/// | `ws`, `wss` | safe if `allow_web_transport_uri` |
/// | `javascript`, `data`, `blob` | safe if `allow_script_or_data_uri` |
/// | anything else | unsafe |
///
/// Relative references are safe. Embedded credentials and unparsable input
/// are unsafe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemeVetter;

impl SchemeVetter {
    /// Create the vetter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_safe(destination: &str, options: &VetOptions) -> bool {
        let url = match Url::parse(destination) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => return true,
            Err(_) => return false,
        };

        if !url.username().is_empty() || url.password().is_some() {
            return false;
        }

        match url.scheme() {
            "http" | "https" | "mailto" | "tel" => true,
            "ws" | "wss" => options.allow_web_transport_uri,
            "javascript" | "data" | "blob" => options.allow_script_or_data_uri,
            _ => false,
        }
    }
}

impl UrlVetter for SchemeVetter {
    fn vet(&self, destination: &str, options: &VetOptions) -> String {
        if Self::is_safe(destination, options) {
            destination.to_string()
        } else {
            trace!(destination, "Destination neutralized by vetter");
            BLANK_DESTINATION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vet(dest: &str) -> String {
        SchemeVetter::new().vet(dest, &VetOptions::guarded())
    }

    #[test]
    fn test_web_destinations_pass_unchanged() {
        assert_eq!(
            vet("https://a.example.com/collect?x=1"),
            "https://a.example.com/collect?x=1"
        );
        assert_eq!(vet("mailto:someone@example.com"), "mailto:someone@example.com");
        assert_eq!(vet("/relative/path"), "/relative/path");
    }

    #[test]
    fn test_script_and_data_are_neutralized_by_default() {
        assert_eq!(vet("javascript:alert(1)"), BLANK_DESTINATION);
        assert_eq!(vet("JaVaScRiPt:alert(1)"), BLANK_DESTINATION);
        assert_eq!(vet("data:text/html,<b>x</b>"), BLANK_DESTINATION);
        assert_eq!(vet("vbscript:msgbox"), BLANK_DESTINATION);
        assert_eq!(vet("file:///etc/passwd"), BLANK_DESTINATION);
    }

    #[test]
    fn test_options_widen_accepted_schemes() {
        let vetter = SchemeVetter::new();
        let strict = VetOptions::default();
        assert!(vetter.is_neutralized("wss://rt.example.com/", &strict));
        assert!(!vetter.is_neutralized("wss://rt.example.com/", &VetOptions::guarded()));

        let permissive = VetOptions {
            allow_web_transport_uri: false,
            allow_script_or_data_uri: true,
        };
        assert!(!vetter.is_neutralized("data:image/png;base64,AAAA", &permissive));

        let script = VetOptions::script_url();
        assert!(!vetter.is_neutralized("blob:https://a.example.com/1", &script));
        assert!(!vetter.is_neutralized("wss://rt.example.com/", &script));
        assert!(vetter.is_neutralized("file:///etc/passwd", &script));
    }

    #[test]
    fn test_credentials_are_unsafe() {
        assert_eq!(vet("https://user:pw@a.example.com/"), BLANK_DESTINATION);
    }

    #[test]
    fn test_invalid_absolute_url_is_unsafe() {
        assert_eq!(vet("http://[::1"), BLANK_DESTINATION);
    }

    #[test]
    fn test_check_params_over_whitelist() {
        let vetter = SchemeVetter::new();
        let allowed = ["tid", "cid"];

        assert!(vetter.check_params_over_whitelist(
            "https://a.example.com/collect?tid=1&cid=2",
            &allowed,
            None
        ));
        assert!(!vetter.check_params_over_whitelist(
            "https://a.example.com/collect?tid=1&email=x",
            &allowed,
            None
        ));
        assert!(vetter.check_params_over_whitelist(
            "https://a.example.com/collect",
            &allowed,
            Some(&json!({"tid": 1}))
        ));
        assert!(!vetter.check_params_over_whitelist(
            "https://a.example.com/collect",
            &allowed,
            Some(&json!({"ssn": "123"}))
        ));
        assert!(vetter.check_params_over_whitelist(
            "https://a.example.com/collect",
            &allowed,
            Some(&json!("tid=1&cid=2"))
        ));
        assert!(!vetter.check_params_over_whitelist(
            "https://a.example.com/collect",
            &allowed,
            Some(&json!([1, 2]))
        ));
        assert!(!vetter.check_params_over_whitelist("not a url", &allowed, None));
    }
}
