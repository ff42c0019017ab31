use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// ANSI color codes for console output
const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

/// Column widths shared with the other reDB services
const SERVICE_NAME_WIDTH: usize = 20;
const LOG_LEVEL_WIDTH: usize = 9;

/// Line format of the reDB services:
/// `[timestamp] [service-component] [level] message`
pub struct RedbLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl RedbLogFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: color_supported(),
        }
    }

    /// `sctp` or `sctp-<component>`, padded or truncated to the column width
    fn service_column(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(component) => format!("{}-{}", self.service_name, component),
            None => self.service_name.clone(),
        };
        if name.chars().count() > SERVICE_NAME_WIDTH {
            let truncated: String = name.chars().take(SERVICE_NAME_WIDTH - 1).collect();
            format!("{}…", truncated)
        } else {
            format!("{:<width$}", name, width = SERVICE_NAME_WIDTH)
        }
    }

    fn level_column(level: &tracing::Level) -> String {
        let label = match *level {
            tracing::Level::ERROR => "✗ ERROR",
            tracing::Level::WARN => "⚠ WARN",
            tracing::Level::INFO => "ℹ INFO",
            tracing::Level::DEBUG => "◦ DEBUG",
            tracing::Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LOG_LEVEL_WIDTH)
    }

    fn level_color(&self, level: &tracing::Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            tracing::Level::ERROR => COLOR_BRIGHT_RED,
            tracing::Level::WARN => COLOR_BRIGHT_YELLOW,
            tracing::Level::INFO => COLOR_GREEN,
            tracing::Level::DEBUG | tracing::Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }
}

impl<S, N> FormatEvent<S, N> for RedbLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level = event.metadata().level();

        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };
        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] ",
            cyan,
            timestamp,
            self.service_column(fields.component.as_deref()),
            self.level_color(level),
            Self::level_column(level),
            reset
        )?;
        match fields.client_id {
            Some(client_id) => writeln!(writer, "[fd {}] {}{}", client_id, fields.message, reset),
            None => writeln!(writer, "{}{}", fields.message, reset),
        }
    }
}

/// Pulls the message, `component` and `client_id` fields out of an event
#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
    client_id: Option<i64>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        if field.name() == "client_id" {
            self.client_id = Some(value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "component" => self.component = Some(unquote(format!("{:?}", value))),
            _ => {}
        }
    }
}

fn unquote(text: String) -> String {
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => text,
    }
}

fn color_supported() -> bool {
    if std::env::var("TERM").map_or(true, |term| term == "dumb") {
        return false;
    }
    std::io::stdout().is_terminal()
}
