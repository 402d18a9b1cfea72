use compact_str::CompactString;
use jiff::Timestamp;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};

/// Maximum number of characters kept in a line's content.
pub const MAX_CONTENT_CHARS: usize = 32_000;

const LINE_KIND: &str = "l";
const BATCH_KIND: &str = "ls";

/// A single line of log data.
///
/// The timestamp is stored as milliseconds since the Unix epoch, which is
/// also how it goes out on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WireLine")]
pub struct LogLine {
    timestamp: i64,
    content: String,
    source: CompactString,
}

#[derive(Deserialize)]
struct WireLine {
    #[serde(default)]
    e: Option<CompactString>,
    t: i64,
    l: String,
    f: CompactString,
}

impl LogLine {
    /// Create a line stamped with the current time.
    ///
    /// `source` names where the line comes from, usually a file or process name.
    pub fn new(source: impl Into<CompactString>, content: impl Into<String>) -> Self {
        Self::at(source, content, Timestamp::now())
    }

    /// Create a line stamped with the given time.
    pub fn at(
        source: impl Into<CompactString>,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self::from_millis(source, content, timestamp.as_millisecond())
    }

    /// Create a line from a raw millisecond timestamp.
    pub fn from_millis(
        source: impl Into<CompactString>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        LogLine {
            timestamp,
            content: truncate_content(content.into()),
            source: source.into(),
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The line's text, at most [`MAX_CONTENT_CHARS`] characters.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The origin label.
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn truncate_content(mut content: String) -> String {
    if let Some((idx, _)) = content.char_indices().nth(MAX_CONTENT_CHARS) {
        content.truncate(idx);
    }
    content
}

impl Serialize for LogLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut line = serializer.serialize_struct("LogLine", 4)?;
        line.serialize_field("e", LINE_KIND)?;
        line.serialize_field("t", &self.timestamp)?;
        line.serialize_field("l", &self.content)?;
        line.serialize_field("f", &self.source)?;
        line.end()
    }
}

impl TryFrom<WireLine> for LogLine {
    type Error = &'static str;

    fn try_from(wire: WireLine) -> Result<Self, Self::Error> {
        match wire.e.as_deref() {
            None | Some(LINE_KIND) => Ok(LogLine::from_millis(wire.f, wire.l, wire.t)),
            Some(_) => Err("not a log line object"),
        }
    }
}

/// The envelope a flush sends: `{"e":"ls","ls":[...]}`.
#[derive(Debug, Clone, Copy)]
pub struct BatchMessage<'a> {
    lines: &'a [LogLine],
}

#[derive(Deserialize)]
struct OwnedBatch {
    e: CompactString,
    ls: Vec<LogLine>,
}

impl<'a> BatchMessage<'a> {
    /// Wrap the given lines.
    pub fn new(lines: &'a [LogLine]) -> Self {
        Self { lines }
    }

    /// Lines carried by this envelope.
    pub fn lines(&self) -> &'a [LogLine] {
        self.lines
    }

    /// Encode the envelope as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode an envelope produced by [`BatchMessage::to_json`].
    pub fn parse(json: &str) -> serde_json::Result<Vec<LogLine>> {
        let batch: OwnedBatch = serde_json::from_str(json)?;
        if batch.e != BATCH_KIND {
            return Err(serde::de::Error::custom(format_args!(
                "unexpected envelope kind `{}`",
                batch.e
            )));
        }
        Ok(batch.ls)
    }
}

impl Serialize for BatchMessage<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut batch = serializer.serialize_struct("BatchMessage", 2)?;
        batch.serialize_field("e", BATCH_KIND)?;
        batch.serialize_field("ls", self.lines)?;
        batch.end()
    }
}
