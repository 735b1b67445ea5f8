use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const MAX_FIELD_LEN: usize = 128;

/// Single-line text input. The cursor counts characters, not bytes.
#[derive(Debug, Clone)]
pub struct TextField {
    pub label: &'static str,
    input: String,
    cursor: usize,
    masked: bool,
}

impl TextField {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            input: String::new(),
            cursor: 0,
            masked: false,
        }
    }

    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.input = value
            .chars()
            .filter(|ch| !ch.is_control())
            .take(MAX_FIELD_LEN)
            .collect();
        self.cursor = self.char_count();
        self
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn char_count(&self) -> usize {
        self.input.chars().count()
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.input
            .char_indices()
            .nth(cursor)
            .map_or(self.input.len(), |(index, _)| index)
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.char_count() as isize;
        let next = (self.cursor as isize + delta).clamp(0, len);
        self.cursor = next as usize;
    }

    fn insert(&mut self, ch: char) {
        if ch.is_control() || self.char_count() >= MAX_FIELD_LEN {
            return;
        }
        let index = self.byte_index(self.cursor);
        self.input.insert(index, ch);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let index = self.byte_index(self.cursor);
        if index < self.input.len() {
            self.input.remove(index);
        }
    }

    fn delete(&mut self) {
        let index = self.byte_index(self.cursor);
        if index < self.input.len() {
            self.input.remove(index);
        }
    }

    /// Raw contents, untrimmed.
    pub fn raw(&self) -> &str {
        &self.input
    }

    pub fn value(&self) -> String {
        self.input.trim().to_string()
    }

    /// Text to draw; masked fields show one bullet per character.
    pub fn display(&self) -> String {
        if self.masked {
            "•".repeat(self.char_count())
        } else {
            self.input.clone()
        }
    }

    /// Apply an editing key. Returns false when the key is not an edit.
    pub fn handle_key(&mut self, key: &KeyEvent) -> bool {
        match key.code {
            KeyCode::Left => self.move_cursor(-1),
            KeyCode::Right => self.move_cursor(1),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.char_count(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.insert(ch)
            }
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Editing,
    Submit,
    Cancel,
}

/// Modal form made of stacked text fields.
#[derive(Debug, Clone)]
pub struct Form {
    pub title: String,
    pub fields: Vec<TextField>,
    pub focus: usize,
    /// Explanation or error shown above the fields.
    pub message: Option<String>,
    pub pending: bool,
}

impl Form {
    pub fn new(title: impl Into<String>, fields: Vec<TextField>) -> Self {
        Self {
            title: title.into(),
            fields,
            focus: 0,
            message: None,
            pending: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn value(&self, index: usize) -> String {
        self.fields
            .get(index)
            .map(TextField::value)
            .unwrap_or_default()
    }

    /// Raw value of a field, kept verbatim for secrets.
    pub fn raw(&self, index: usize) -> String {
        self.fields
            .get(index)
            .map(|field| field.raw().to_string())
            .unwrap_or_default()
    }

    /// `None` for blank fields.
    pub fn optional(&self, index: usize) -> Option<String> {
        Some(self.value(index)).filter(|value| !value.is_empty())
    }

    fn focus_by(&mut self, delta: isize) {
        if self.fields.is_empty() {
            return;
        }
        let len = self.fields.len() as isize;
        self.focus = (self.focus as isize + delta).rem_euclid(len) as usize;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormAction {
        match key.code {
            KeyCode::Esc => return FormAction::Cancel,
            KeyCode::Enter if !self.pending => return FormAction::Submit,
            KeyCode::Tab | KeyCode::Down => self.focus_by(1),
            KeyCode::BackTab | KeyCode::Up => self.focus_by(-1),
            _ if self.pending => {}
            _ => {
                if let Some(field) = self.fields.get_mut(self.focus) {
                    field.handle_key(&key);
                }
            }
        }
        FormAction::Editing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(form: &mut Form, text: &str) {
        for ch in text.chars() {
            form.handle_key(key(KeyCode::Char(ch)));
        }
    }

    #[test]
    fn typing_goes_to_the_focused_field() {
        let mut form = Form::new(
            "Login",
            vec![TextField::new("Email"), TextField::new("Password").masked()],
        );
        type_text(&mut form, " a@b.com ");
        form.handle_key(key(KeyCode::Tab));
        type_text(&mut form, "pw ");
        form.handle_key(key(KeyCode::Left));
        form.handle_key(key(KeyCode::Backspace));

        assert_eq!(form.value(0), "a@b.com");
        assert_eq!(form.raw(1), "p ");
        assert_eq!(form.fields[1].display(), "••");
        assert_eq!(form.handle_key(key(KeyCode::Enter)), FormAction::Submit);
    }

    #[test]
    fn focus_wraps_and_pending_blocks_submit() {
        let mut form = Form::new("Profile", vec![TextField::new("A"), TextField::new("B")]);
        form.handle_key(key(KeyCode::BackTab));
        assert_eq!(form.focus, 1);
        form.handle_key(key(KeyCode::Tab));
        assert_eq!(form.focus, 0);

        form.pending = true;
        assert_eq!(form.handle_key(key(KeyCode::Enter)), FormAction::Editing);
        type_text(&mut form, "x");
        assert_eq!(form.value(0), "");
        assert_eq!(form.handle_key(key(KeyCode::Esc)), FormAction::Cancel);
        assert_eq!(form.optional(1), None);
    }

    #[test]
    fn accented_names_survive_prefill_and_editing() {
        let mut form = Form::new(
            "Profile",
            vec![TextField::new("First name").with_value("Zoë"), TextField::new("PIN").masked()],
        );
        assert_eq!(form.optional(0).as_deref(), Some("Zoë"));
        assert_eq!(form.fields[0].cursor(), 3);

        form.handle_key(key(KeyCode::Left));
        form.handle_key(key(KeyCode::Backspace));
        type_text(&mut form, "é");
        form.handle_key(key(KeyCode::End));
        type_text(&mut form, "ñ");
        assert_eq!(form.value(0), "Zéëñ");

        form.handle_key(key(KeyCode::Home));
        form.handle_key(key(KeyCode::Right));
        form.handle_key(key(KeyCode::Delete));
        assert_eq!(form.value(0), "Zëñ");
        assert_eq!(form.fields[0].cursor(), 1);

        form.handle_key(key(KeyCode::Tab));
        type_text(&mut form, "ßø");
        assert_eq!(form.fields[1].display(), "••");
        assert_eq!(form.raw(1), "ßø");
    }
}
