use std::fmt::{self, Write as _};

use nu_ansi_term::{Color, Style};
use time::{OffsetDateTime, format_description::OwnedFormatItem};
use tracing::{Event, Level, Subscriber, field};
use tracing_subscriber::{
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    registry::LookupSpan,
};

/// Compact single-line log format.
///
/// `[LEVEL] [MM-DD|HH:MM:SS.mmm] [NN] message key=value ...`
///
/// The `[NN]` column is the `worker` field, when the event has one, so log
/// lines line up with the worker prefix of dry-run output.
pub struct SpoolFormat {
    time_format: OwnedFormatItem,
}

/// Fields of one event, split into the parts the format places separately.
#[derive(Debug, Default)]
struct EventFields {
    message: String,
    worker: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl<S, N> FormatEvent<S, N> for SpoolFormat
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
        let ansi = writer.has_ansi_escapes();

        write_level(&mut writer, event.metadata().level(), ansi)?;
        writer.write_char(' ')?;

        match self.timestamp() {
            Some(now) if ansi => write!(writer, "{}", Style::new().dimmed().paint(now))?,
            Some(now) => writer.write_str(&now)?,
            None => writer.write_str("[<unknown-timestamp>]")?,
        }
        writer.write_char(' ')?;

        let mut fields = EventFields::default();
        event.record(&mut fields);
        fields.write(&mut writer, ansi)?;

        writeln!(writer)
    }
}

impl SpoolFormat {
    fn timestamp(&self) -> Option<String> {
        OffsetDateTime::now_utc().format(&self.time_format).ok()
    }
}

impl Default for SpoolFormat {
    fn default() -> Self {
        let time_format = time::format_description::parse_owned::<2>(
            r#"\[[month]-[day]|[hour]:[minute]:[second].[subsecond digits:3]\]"#,
        )
        .expect("static time format is valid");

        Self { time_format }
    }
}

impl EventFields {
    fn write(&self, w: &mut impl fmt::Write, ansi: bool) -> fmt::Result {
        if let Some(worker) = &self.worker {
            if ansi {
                write!(w, "{} ", Color::Cyan.paint(format!("[{worker}]")))?;
            } else {
                write!(w, "[{worker}] ")?;
            }
        }

        w.write_str(&self.message)?;

        for (name, value) in &self.fields {
            let color = if *name == "error" {
                Color::Red
            } else {
                Color::Blue
            };

            if ansi {
                write!(w, " {}={}", Style::new().dimmed().paint(*name), color.paint(value))?;
            } else {
                write!(w, " {name}={value}")?;
            }
        }

        Ok(())
    }
}

impl field::Visit for EventFields {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "worker" => self.worker = Some(value.to_string()),
            name if value.contains(char::is_whitespace) || value.is_empty() => {
                self.fields.push((name, format!("{value:?}")))
            }
            name => self.fields.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        match field.name() {
            "message" => self.message = value,
            "worker" => self.worker = Some(value),
            name => self.fields.push((name, value)),
        }
    }
}

fn write_level(w: &mut impl fmt::Write, level: &Level, ansi: bool) -> fmt::Result {
    let (name, color) = match *level {
        Level::TRACE => ("TRACE", Color::Purple),
        Level::DEBUG => ("DEBUG", Color::Blue),
        Level::INFO => ("INFO", Color::Green),
        Level::WARN => ("WARN", Color::Yellow),
        Level::ERROR => ("ERROR", Color::Red),
    };

    if ansi {
        write!(w, "[{}]", color.paint(name))
    } else {
        write!(w, "[{name}]")
    }
}
