use crate::format::Format;
use std::fmt::{self, Write};
use tracing::{
    Event,
    field::{Field, Visit},
};

/// Writes the content of a log line for an [`Event`].
pub trait RecordEvent {
    /// Write the line content for `event` to `content`.
    fn record_event(&self, event: &Event<'_>, format: &Format, content: &mut String)
    -> fmt::Result;
}

/// The default [`RecordEvent`] implementation.
///
/// Produces `LEVEL [thread] target file:line: message name=value ...`, with
/// each part except the message controlled by [`Format`].
#[derive(Debug)]
pub struct DefaultEvent {
    // reserve the ability to add fields to this without causing a breaking
    // change in the future.
    _private: (),
}

impl DefaultEvent {
    /// Create a new `DefaultEvent`.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for DefaultEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordEvent for DefaultEvent {
    fn record_event(
        &self,
        event: &Event<'_>,
        format: &Format,
        content: &mut String,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if format.display_level {
            write!(content, "{} ", metadata.level())?;
        }

        if format.display_thread_name {
            if let Some(name) = std::thread::current().name() {
                write!(content, "[{name}] ")?;
            }
        }

        let mut location = false;
        if format.display_target {
            content.push_str(metadata.target());
            location = true;
        }
        if format.display_filename {
            if let Some(file) = metadata.file() {
                if location {
                    content.push(' ');
                }
                content.push_str(file);
                location = true;
            }
        }
        if format.display_line_number {
            if let Some(line) = metadata.line() {
                if format.display_filename && metadata.file().is_some() {
                    content.push(':');
                } else if location {
                    content.push(' ');
                }
                write!(content, "{line}")?;
                location = true;
            }
        }
        if location {
            content.push_str(": ");
        }

        let mut visitor = FieldVisitor {
            message: String::new(),
            fields: String::new(),
            display_fields: format.display_fields,
            result: Ok(()),
        };
        event.record(&mut visitor);
        visitor.result?;

        content.push_str(&visitor.message);
        if !visitor.fields.is_empty() {
            if !visitor.message.is_empty() {
                content.push(' ');
            }
            content.push_str(&visitor.fields);
        }
        Ok(())
    }
}

struct FieldVisitor {
    message: String,
    fields: String,
    display_fields: bool,
    result: fmt::Result,
}

impl FieldVisitor {
    fn separator(&mut self) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else if self.display_fields {
            self.separator();
            self.result = self
                .result
                .and_then(|_| write!(self.fields, "{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.result = self
                .result
                .and_then(|_| write!(self.message, "{value:?}"));
        } else if self.display_fields {
            self.separator();
            self.result = self
                .result
                .and_then(|_| write!(self.fields, "{}={value:?}", field.name()));
        }
    }
}
