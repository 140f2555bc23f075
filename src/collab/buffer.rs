/// The rich-text editor's serialized content, as seen by the sync engine.
///
/// Markup is opaque: the engine only reads it, writes it back and compares it.
pub trait EditorBuffer {
    fn content(&self) -> String;
    fn set_content(&mut self, content: &str);
}

/// Plain in-memory buffer; used headless and in tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate typing: replace the whole serialized content.
    pub fn type_text(&mut self, text: &str) {
        self.text = text.to_string();
    }
}

impl EditorBuffer for TextBuffer {
    fn content(&self) -> String {
        self.text.clone()
    }

    fn set_content(&mut self, content: &str) {
        self.text = content.to_string();
    }
}
