//! Check command: run one destination through a guard over no-op natives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use zhorn_config::Config;
use zhorn_core::{BlockCause, GuardError, HostError, Method, SinkName};
use zhorn_events::{Notification, NotificationBus};
use zhorn_interceptor::{
    AttributeChange, ChangeListener, Element, Guard, HostSinks, ImageResource, ListenerId,
    OutboundRequest,
};
use zhorn_telemetry::RequestContext;

use crate::OutputFormat;
use crate::config_bridge;
use crate::theme::Theme;

/// Sink to exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SinkArg {
    /// `Navigator.sendBeacon`
    Beacon,
    /// `HTMLElement.setAttribute`
    Attribute,
    /// `XMLHttpRequest.send`
    Request,
    /// `fetch`
    Fetch,
    /// `HTMLImageElement.src`
    Image,
    /// `HTMLScriptElement.src`
    Script,
    /// `Element.innerHTML`; the destination argument is the markup
    Markup,
}

impl SinkArg {
    fn sink_name(self) -> SinkName {
        match self {
            Self::Beacon => SinkName::SendBeacon,
            Self::Attribute => SinkName::SetAttribute,
            Self::Request => SinkName::XhrSend,
            Self::Fetch => SinkName::Fetch,
            Self::Image => SinkName::ImageSrc,
            Self::Script => SinkName::ScriptSrc,
            Self::Markup => SinkName::InnerHtml,
        }
    }
}

/// Arguments of `zhorn check`.
#[derive(Debug, Clone)]
pub(crate) struct CheckArgs {
    pub(crate) destination: String,
    pub(crate) sink: SinkArg,
    pub(crate) method: Option<String>,
    pub(crate) tag: String,
    pub(crate) attribute: String,
    pub(crate) payload: Option<String>,
}

/// Outcome of a check.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CheckReport {
    pub(crate) destination: String,
    pub(crate) sink: SinkName,
    pub(crate) allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) certified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cause: Option<BlockCause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

/// Element that only stores attributes and markup.
#[derive(Debug)]
struct DryRunElement {
    tag: String,
    attributes: Mutex<HashMap<String, String>>,
    markup: Mutex<Option<String>>,
}

impl DryRunElement {
    fn new(tag: &str) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            attributes: Mutex::new(HashMap::new()),
            markup: Mutex::new(None),
        })
    }

    fn markup(&self) -> Option<String> {
        self.markup.lock().ok()?.clone()
    }
}

impl Element for DryRunElement {
    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.lock().ok()?.get(name).cloned()
    }

    fn write_attribute(&self, name: &str, value: Option<&str>) -> Result<(), HostError> {
        if let Ok(mut attributes) = self.attributes.lock() {
            match value {
                Some(v) => attributes.insert(name.to_string(), v.to_string()),
                None => attributes.remove(name),
            };
        }
        Ok(())
    }

    fn write_inner_html(&self, html: &str) -> Result<(), HostError> {
        if let Ok(mut markup) = self.markup.lock() {
            *markup = Some(html.to_string());
        }
        Ok(())
    }

    fn add_change_listener(&self, _: ChangeListener) -> ListenerId {
        0
    }

    fn remove_change_listener(&self, _: ListenerId) {}

    fn dispatch_attribute_change(&self, _: &AttributeChange) {}
}

/// Evaluate one destination against the policy in `cfg`.
pub(crate) fn run_check(args: &CheckArgs, cfg: &Config) -> Result<CheckReport> {
    let sink = args.sink.sink_name();
    let ctx = RequestContext::new("zhorn-cli")
        .with_operation("check")
        .with_label("sink", sink.as_str());
    let _span = ctx.span().entered();

    let bus = NotificationBus::new();
    let mut blocked_rx = bus.subscribe_type("callblocked");
    let guard = Guard::builder()
        .host(HostSinks::new())
        .vet_options(config_bridge::to_vet_options(cfg))
        .guarded_attributes(cfg.policy.guarded_attributes.iter().cloned())
        .notifications(bus)
        .build();
    let handle = guard.activate(config_bridge::to_policy_config(cfg)?);

    let payload = args
        .payload
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--payload is not valid JSON")?;

    let outcome = match args.sink {
        SinkArg::Beacon => guard
            .send_beacon(&args.destination, payload)
            .map(|_| None),
        SinkArg::Request | SinkArg::Fetch => {
            let method = match &args.method {
                Some(m) => m.parse::<Method>().map_err(anyhow::Error::msg)?,
                None => Method::Get,
            };
            let mut request = OutboundRequest::new(method, args.destination.as_str());
            if let Some(body) = payload {
                request = request.with_body(body);
            }
            if args.sink == SinkArg::Request {
                guard.xhr_send(&request).map(|_| None)
            } else {
                guard.fetch(&request).map(|_| None)
            }
        },
        SinkArg::Image => guard
            .create_image()
            .and_then(|image| image.set_src(&args.destination))
            .map(|()| None),
        SinkArg::Attribute => {
            let element: Arc<dyn Element> = DryRunElement::new(&args.tag);
            guard
                .set_attribute(&element, &args.attribute, &args.destination)
                .map(|()| element.get_attribute(&args.attribute))
        },
        SinkArg::Script => {
            let element: Arc<dyn Element> = DryRunElement::new("script");
            guard
                .set_script_src(&element, &args.destination)
                .map(|()| element.get_attribute("src"))
        },
        SinkArg::Markup => {
            let dry_run = DryRunElement::new(&args.tag);
            let element: Arc<dyn Element> = dry_run.clone();
            guard
                .set_inner_html(&element, &args.destination)
                .map(|()| dry_run.markup())
        },
    };
    handle.destroy();

    let report = match outcome {
        Ok(certified) => CheckReport {
            destination: args.destination.clone(),
            sink,
            allowed: true,
            certified,
            cause: None,
            message: None,
        },
        Err(e @ GuardError::Blocked(_)) => {
            let cause = blocked_rx.try_recv().and_then(|n| match n.as_ref() {
                Notification::CallBlocked { cause, .. } => Some(*cause),
                _ => None,
            });
            CheckReport {
                destination: args.destination.clone(),
                sink,
                allowed: false,
                certified: None,
                cause,
                message: Some(e.to_string()),
            }
        },
        Err(e) => return Err(e.into()),
    };
    tracing::debug!(allowed = report.allowed, elapsed_ms = ctx.elapsed_ms(), "Check finished");
    Ok(report)
}

/// Print a report.
pub(crate) fn print_report(report: &CheckReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Pretty => {
            if report.allowed {
                println!("{}", Theme::success("allowed"));
            } else {
                println!("{}", Theme::error("blocked"));
            }
            println!("  Sink:        {}", report.sink);
            println!("  Destination: {}", report.destination);
            if let Some(certified) = &report.certified {
                println!("  Certified:   {certified}");
            }
            if let Some(cause) = report.cause {
                println!("  Cause:       {cause}");
            }
            if let Some(message) = &report.message {
                println!("  {}", Theme::dimmed(message));
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(destination: &str, sink: SinkArg) -> CheckArgs {
        CheckArgs {
            destination: destination.to_string(),
            sink,
            method: None,
            tag: "img".to_string(),
            attribute: "src".to_string(),
            payload: None,
        }
    }

    fn config(whitelist: &[&str]) -> Config {
        let mut cfg = Config::default();
        cfg.policy.whitelist = whitelist.iter().map(ToString::to_string).collect();
        cfg
    }

    #[test]
    fn test_whitelisted_beacon_allowed() {
        let cfg = config(&["https://api.example.com/collect"]);
        let report = run_check(&args("https://api.example.com/collect", SinkArg::Beacon), &cfg).unwrap();
        assert!(report.allowed);
        assert!(report.cause.is_none());
    }

    #[test]
    fn test_unlisted_fetch_blocked_with_cause() {
        let cfg = config(&["https://api.example.com"]);
        let mut a = args("https://evil.example.net/steal", SinkArg::Fetch);
        a.method = Some("post".to_string());

        let report = run_check(&a, &cfg).unwrap();
        assert!(!report.allowed);
        assert_eq!(report.cause, Some(BlockCause::PolicyVeto));
        assert!(report.message.unwrap().contains("via HTTP POST"));
    }

    #[test]
    fn test_script_uri_blocked_by_vetting() {
        let cfg = config(&["javascript:"]);
        let report = run_check(&args("javascript:alert(1)", SinkArg::Image), &cfg).unwrap();
        assert!(!report.allowed);
        assert_eq!(report.cause, Some(BlockCause::VettingRejected));
    }

    #[test]
    fn test_attribute_reports_certified_value() {
        let cfg = config(&["https://cdn.example.com/logo.png"]);
        let report = run_check(
            &args("  https://cdn.example.com/logo.png  ", SinkArg::Attribute),
            &cfg,
        )
        .unwrap();
        assert!(report.allowed);
        assert_eq!(report.certified.as_deref(), Some("https://cdn.example.com/logo.png"));
    }

    #[test]
    fn test_markup_reports_cleaned_markup() {
        let cfg = config(&["https://cdn.example.com/"]);
        let mut a = args(
            r#"<p onclick="x()">hi</p><img src="https://cdn.example.com/a.png">"#,
            SinkArg::Markup,
        );
        a.tag = "div".to_string();
        let report = run_check(&a, &cfg).unwrap();
        assert!(report.allowed);
        assert_eq!(
            report.certified.as_deref(),
            Some(r#"<p>hi</p><img src="https://cdn.example.com/a.png">"#)
        );

        let a = args(r#"<img src="https://evil.example.net/t.gif">"#, SinkArg::Markup);
        let report = run_check(&a, &cfg).unwrap();
        assert!(!report.allowed);
        assert_eq!(report.cause, Some(BlockCause::PolicyVeto));
    }

    #[test]
    fn test_script_sink_skips_sanitizer() {
        let cfg = config(&["https://cdn.example.com/lib.js"]);
        let report = run_check(&args("https://cdn.example.com/lib.js", SinkArg::Script), &cfg).unwrap();
        assert!(report.allowed);
        assert_eq!(report.sink, SinkName::ScriptSrc);
        assert_eq!(report.certified.as_deref(), Some("https://cdn.example.com/lib.js"));
    }

    #[test]
    fn test_invalid_payload_is_an_error() {
        let cfg = config(&["https://api.example.com"]);
        let mut a = args("https://api.example.com", SinkArg::Beacon);
        a.payload = Some("{not json".to_string());
        assert!(run_check(&a, &cfg).is_err());
    }

    #[test]
    fn test_json_report_shape() {
        let report = CheckReport {
            destination: "https://x.example".into(),
            sink: SinkName::SendBeacon,
            allowed: false,
            certified: None,
            cause: Some(BlockCause::PolicyVeto),
            message: Some("Suspicious Activity".into()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["cause"], "policy_veto");
        assert!(json.get("certified").is_none());
    }
}
