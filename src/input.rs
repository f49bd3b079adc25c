//! Message composer with a text tab and an image-prompt tab.
//!
//! Each tab owns its own draft, so flipping between them never loses what
//! was typed in the other one.

use crate::model::ContentType;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputTab {
    #[default]
    Text,
    Image,
}

impl InputTab {
    pub fn content_type(&self) -> ContentType {
        match self {
            InputTab::Text => ContentType::Text,
            InputTab::Image => ContentType::Image,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InputTab::Text => "Text",
            InputTab::Image => "Image",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            InputTab::Text => InputTab::Image,
            InputTab::Image => InputTab::Text,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub text: String,
    pub cursor: usize, // char position in text
}

impl Draft {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

/// What a successful submission hands to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub content: String,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub tab: InputTab,
    text_draft: Draft,
    image_draft: Draft,
}

impl ChatInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &Draft {
        match self.tab {
            InputTab::Text => &self.text_draft,
            InputTab::Image => &self.image_draft,
        }
    }

    pub fn draft_mut(&mut self) -> &mut Draft {
        match self.tab {
            InputTab::Text => &mut self.text_draft,
            InputTab::Image => &mut self.image_draft,
        }
    }

    pub fn draft_for(&self, tab: InputTab) -> &Draft {
        match tab {
            InputTab::Text => &self.text_draft,
            InputTab::Image => &self.image_draft,
        }
    }

    pub fn set_tab(&mut self, tab: InputTab) {
        self.tab = tab;
    }

    pub fn toggle_tab(&mut self) {
        self.tab = self.tab.toggled();
    }

    pub fn insert_newline(&mut self) {
        self.draft_mut().insert('\n');
    }

    pub fn can_submit(&self, sending: bool) -> bool {
        !sending && !self.draft().is_blank()
    }

    /// Take the active draft if it may be sent right now.
    ///
    /// Returns `None` (and leaves both drafts untouched) while a send is in
    /// flight or when the active draft is blank.
    pub fn submit(&mut self, sending: bool) -> Option<Outbound> {
        if !self.can_submit(sending) {
            return None;
        }
        let content_type = self.tab.content_type();
        let draft = self.draft_mut();
        let content = draft.text.trim().to_string();
        draft.clear();
        Some(Outbound { content, content_type })
    }

    pub fn hint(&self) -> &'static str {
        match self.tab {
            InputTab::Text => "Enter to send, Shift+Enter for a new line",
            InputTab::Image => "The image will be generated by the AI",
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self.tab {
            InputTab::Text => "Type a question or message...",
            InputTab::Image => "Describe the image you want, e.g. \"mountains at sunset, realistic\"",
        }
    }
}
