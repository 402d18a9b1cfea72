/// Formatter for logging tracing events.
///
/// Controls which parts of an event's metadata are written in front of the
/// message in the line content.
#[derive(Debug, Clone)]
pub struct Format {
    pub(crate) display_target: bool,
    pub(crate) display_level: bool,
    pub(crate) display_thread_name: bool,
    pub(crate) display_filename: bool,
    pub(crate) display_line_number: bool,
    pub(crate) display_fields: bool,
}

impl Default for Format {
    fn default() -> Self {
        Format {
            display_target: true,
            display_level: true,
            display_thread_name: false,
            display_filename: false,
            display_line_number: false,
            display_fields: true,
        }
    }
}

impl Format {
    /// Sets whether or not an event's target is displayed.
    pub fn with_target(self, display_target: bool) -> Format {
        Format {
            display_target,
            ..self
        }
    }

    /// Sets whether or not an event's level is displayed.
    pub fn with_level(self, display_level: bool) -> Format {
        Format {
            display_level,
            ..self
        }
    }

    /// Sets whether or not the [name] of the current thread is displayed
    /// when formatting events.
    ///
    /// [name]: std::thread#naming-threads
    pub fn with_thread_names(self, display_thread_name: bool) -> Format {
        Format {
            display_thread_name,
            ..self
        }
    }

    /// Sets whether or not an event's [source code file path][file] is
    /// displayed.
    ///
    /// [file]: tracing::Metadata::file
    pub fn with_file(self, display_filename: bool) -> Format {
        Format {
            display_filename,
            ..self
        }
    }

    /// Sets whether or not an event's [source code line number][line] is
    /// displayed.
    ///
    /// [line]: tracing::Metadata::line
    pub fn with_line_number(self, display_line_number: bool) -> Format {
        Format {
            display_line_number,
            ..self
        }
    }

    /// Sets whether or not the source code location from which an event
    /// originated is displayed.
    ///
    /// This is equivalent to calling [`Format::with_file`] and
    /// [`Format::with_line_number`] with the same value.
    pub fn with_source_location(self, display_location: bool) -> Self {
        self.with_line_number(display_location)
            .with_file(display_location)
    }

    /// Sets whether or not the fields other than `message` are appended as
    /// `name=value` pairs.
    pub fn with_fields(self, display_fields: bool) -> Format {
        Format {
            display_fields,
            ..self
        }
    }
}
