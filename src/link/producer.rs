//! Output of a periodic producer task.

/// What one producer invocation yields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Produced {
    /// Nothing to send this period.
    #[default]
    Nothing,
    /// Exactly one frame, sent as-is.
    Frame(String),
    /// Several frames; blank entries are skipped.
    Frames(Vec<String>),
}

impl Produced {
    /// Frames to enqueue, in order.
    pub fn into_frames(self) -> Vec<String> {
        match self {
            Produced::Nothing => Vec::new(),
            Produced::Frame(frame) => vec![frame],
            Produced::Frames(frames) => frames
                .into_iter()
                .filter(|frame| !frame.trim().is_empty())
                .collect(),
        }
    }
}

impl From<String> for Produced {
    fn from(frame: String) -> Self {
        Produced::Frame(frame)
    }
}

impl From<&str> for Produced {
    fn from(frame: &str) -> Self {
        Produced::Frame(frame.to_string())
    }
}

impl From<Vec<String>> for Produced {
    fn from(frames: Vec<String>) -> Self {
        Produced::Frames(frames)
    }
}

impl<T: Into<Produced>> From<Option<T>> for Produced {
    fn from(value: Option<T>) -> Self {
        value.map_or(Produced::Nothing, Into::into)
    }
}

impl From<()> for Produced {
    fn from(_: ()) -> Self {
        Produced::Nothing
    }
}

/// Boxed producer as stored by a periodic task.
pub type Producer = Box<dyn FnMut() -> Produced + Send + 'static>;
