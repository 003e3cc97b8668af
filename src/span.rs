/// A byte offset range into the token XML source, used to anchor diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Span for diagnostics with no source anchor (file-level problems).
    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}
