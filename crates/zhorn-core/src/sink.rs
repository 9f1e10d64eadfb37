//! Catalogue of guarded sinks.
//!
//! A sink is an operation that either transmits data off-process or causes
//! untrusted content to be interpreted. Each [`SinkName`] belongs to exactly
//! one [`SinkCategory`], and each category owns exactly one patch record in
//! the interceptor's registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::intent::{Method, OperationKind};

/// Stable identifier of a guarded sink.
///
/// The string forms returned by [`SinkName::as_str`] appear verbatim in
/// diagnostics and observer notifications, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkName {
    /// `HTMLElement.setAttribute` for resource-bearing attributes.
    #[serde(rename = "HTMLElement.setAttribute")]
    SetAttribute,
    /// `Navigator.sendBeacon`.
    #[serde(rename = "Navigator.sendBeacon")]
    SendBeacon,
    /// `XMLHttpRequest.send`.
    #[serde(rename = "XMLHttpRequest.send")]
    XhrSend,
    /// `fetch`.
    #[serde(rename = "fetch")]
    Fetch,
    /// `HTMLImageElement.src` assignment.
    #[serde(rename = "HTMLImageElement.src")]
    ImageSrc,
    /// `Element.innerHTML` assignment.
    #[serde(rename = "Element.innerHTML")]
    InnerHtml,
    /// `HTMLScriptElement.src` assignment.
    #[serde(rename = "HTMLScriptElement.src")]
    ScriptSrc,
}

impl SinkName {
    /// All known sinks.
    pub const ALL: [Self; 7] = [
        Self::SetAttribute,
        Self::SendBeacon,
        Self::XhrSend,
        Self::Fetch,
        Self::ImageSrc,
        Self::InnerHtml,
        Self::ScriptSrc,
    ];

    /// Stable diagnostic name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetAttribute => "HTMLElement.setAttribute",
            Self::SendBeacon => "Navigator.sendBeacon",
            Self::XhrSend => "XMLHttpRequest.send",
            Self::Fetch => "fetch",
            Self::ImageSrc => "HTMLImageElement.src",
            Self::InnerHtml => "Element.innerHTML",
            Self::ScriptSrc => "HTMLScriptElement.src",
        }
    }

    /// The patch-record category this sink belongs to.
    #[must_use]
    pub fn category(self) -> SinkCategory {
        match self {
            Self::SetAttribute | Self::ScriptSrc => SinkCategory::AttributeInclusion,
            Self::SendBeacon => SinkCategory::Beacon,
            Self::XhrSend | Self::Fetch => SinkCategory::AsyncRequest,
            Self::ImageSrc => SinkCategory::ImageLoad,
            Self::InnerHtml => SinkCategory::MarkupInjection,
        }
    }

    /// Whether this sink transmits or includes.
    #[must_use]
    pub fn operation_kind(self) -> OperationKind {
        match self {
            Self::SetAttribute | Self::InnerHtml | Self::ScriptSrc => OperationKind::Include,
            Self::SendBeacon | Self::XhrSend | Self::Fetch | Self::ImageSrc => {
                OperationKind::Transmit
            },
        }
    }

    /// Method hint used when the caller does not supply one.
    ///
    /// Beacons are always `POST`, image loads always `GET`. Include sinks
    /// carry no method.
    #[must_use]
    pub fn default_method(self) -> Option<Method> {
        match self {
            Self::SendBeacon => Some(Method::Post),
            Self::XhrSend | Self::Fetch | Self::ImageSrc => Some(Method::Get),
            Self::SetAttribute | Self::InnerHtml | Self::ScriptSrc => None,
        }
    }
}

impl fmt::Display for SinkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sink| sink.as_str() == s)
            .ok_or_else(|| format!("unknown sink '{s}'"))
    }
}

/// Category of guarded sink. One patch record exists per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkCategory {
    /// Attribute-based resource inclusion.
    AttributeInclusion,
    /// Beacon transmission.
    Beacon,
    /// Asynchronous request initiation.
    AsyncRequest,
    /// Image-resource loads.
    ImageLoad,
    /// Markup assignment (`innerHTML`).
    MarkupInjection,
}

impl SinkCategory {
    /// All categories, in installation order.
    pub const ALL: [Self; 5] = [
        Self::AttributeInclusion,
        Self::Beacon,
        Self::AsyncRequest,
        Self::ImageLoad,
        Self::MarkupInjection,
    ];
}

impl fmt::Display for SinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AttributeInclusion => "attribute_inclusion",
            Self::Beacon => "beacon",
            Self::AsyncRequest => "async_request",
            Self::ImageLoad => "image_load",
            Self::MarkupInjection => "markup_injection",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_names_round_trip_through_str() {
        for sink in SinkName::ALL {
            assert_eq!(sink.as_str().parse::<SinkName>().unwrap(), sink);
        }
        assert!("Element.outerHTML".parse::<SinkName>().is_err());
    }

    #[test]
    fn test_request_sinks_share_a_category() {
        assert_eq!(SinkName::XhrSend.category(), SinkCategory::AsyncRequest);
        assert_eq!(SinkName::Fetch.category(), SinkCategory::AsyncRequest);
        assert_ne!(SinkName::SendBeacon.category(), SinkName::Fetch.category());
    }

    #[test]
    fn test_script_source_shares_attribute_record() {
        assert_eq!(
            SinkName::ScriptSrc.category(),
            SinkCategory::AttributeInclusion
        );
        assert_eq!(
            SinkName::InnerHtml.category(),
            SinkCategory::MarkupInjection
        );
        assert_eq!(SinkName::InnerHtml.operation_kind(), OperationKind::Include);
        assert_eq!(SinkName::ScriptSrc.default_method(), None);
        assert_eq!(SinkCategory::MarkupInjection.to_string(), "markup_injection");
    }

    #[test]
    fn test_operation_kinds() {
        assert_eq!(
            SinkName::SetAttribute.operation_kind(),
            OperationKind::Include
        );
        assert_eq!(
            SinkName::ImageSrc.operation_kind(),
            OperationKind::Transmit
        );
        assert_eq!(SinkName::SetAttribute.default_method(), None);
        assert_eq!(SinkName::SendBeacon.default_method(), Some(Method::Post));
    }

    #[test]
    fn test_sink_serializes_with_stable_name() {
        let json = serde_json::to_string(&SinkName::SendBeacon).unwrap();
        assert_eq!(json, "\"Navigator.sendBeacon\"");
    }
}
