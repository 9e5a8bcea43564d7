/// Tag key carrying whether the originating application caught the error.
pub const HANDLED_TAG: &str = "handled";
/// Tag key carrying the hostname of the server that raised the error.
pub const SERVER_NAME_TAG: &str = "server_name";

/// A key/value tag attached to a monitoring event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    /// Create a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// One line of source context recorded around a stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    /// Line number in the source file
    pub line_no: u32,
    /// Source text of the line
    pub text: String,
}

/// A single stack-trace entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    /// File name as reported by the provider
    pub filename: Option<String>,
    /// Absolute path as reported by the provider
    pub abs_path: Option<String>,
    /// Source lines surrounding the frame, in line order
    pub context: Vec<ContextLine>,
}

impl StackFrame {
    /// Returns `true` if the frame points at `path`, by file name or absolute path.
    pub fn points_at(&self, path: &str) -> bool {
        self.filename.as_deref() == Some(path) || self.abs_path.as_deref() == Some(path)
    }
}

/// An error event fetched from a monitoring provider.
///
/// Events are immutable once fetched and only live for one processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringEvent {
    /// Provider-assigned event identifier
    pub id: String,
    /// Human readable message
    pub title: String,
    /// Symbolic location of the fault, e.g. a route
    pub culprit: String,
    /// Event tags, including `handled` and `server_name`
    pub tags: Vec<Tag>,
    /// Stack frames in the order reported by the provider
    pub frames: Vec<StackFrame>,
    /// File the provider reports the error originated from
    pub origin_file: Option<String>,
}

impl MonitoringEvent {
    /// Values of every tag named `key`, in tag order.
    pub fn tag_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter(move |t| t.key == key).map(|t| t.value.as_str())
    }

    /// Returns `true` if the event is explicitly tagged as not handled.
    pub fn is_unhandled(&self) -> bool {
        self.tag_values(HANDLED_TAG).any(|v| v == "no")
    }

    /// Hostnames of the servers that reported the event.
    pub fn server_names(&self) -> Vec<&str> {
        self.tag_values(SERVER_NAME_TAG).collect()
    }
}
