//! Add/edit dialog state. Keeps a local draft until submission succeeds.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use zeroize::Zeroize;

use crate::controller::Controller;
use crate::models::{ApiKey, Category, KeyDraft, KeyUpdate};
use crate::wire::{format_date, parse_date};

const REQUIRED_MESSAGE: &str = "Name and API key are required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Secret,
    Category,
    Description,
    ServiceUrl,
    ExpiresAt,
    Tags,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Name,
        Field::Secret,
        Field::Category,
        Field::Description,
        Field::ServiceUrl,
        Field::ExpiresAt,
        Field::Tags,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "Name (required)",
            Field::Secret => "API key (required)",
            Field::Category => "Category",
            Field::Description => "Description",
            Field::ServiceUrl => "Service URL",
            Field::ExpiresAt => "Expires (YYYY-MM-DD)",
            Field::Tags => "Tags",
        }
    }

    fn index(self) -> usize {
        Field::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Field {
        Field::ALL[(self.index() + 1).min(Field::ALL.len() - 1)]
    }

    pub fn prev(self) -> Field {
        Field::ALL[self.index().saturating_sub(1)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogMode {
    Add,
    Edit { original: ApiKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogAction {
    None,
    Cancel,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation stopped the submission before the backend was called.
    Blocked(String),
    /// Edit mode with nothing changed.
    Unchanged,
    Failed,
    Saved,
}

#[derive(Debug)]
pub struct KeyDialog {
    pub mode: DialogMode,
    pub name: String,
    pub description: String,
    pub api_key: String,
    pub category: Category,
    pub service_url: String,
    pub expires_at: String,
    pub tags: Vec<String>,
    pub tag_input: String,
    /// Tag picked with ←/→ while the tag input is empty.
    pub selected_tag: Option<usize>,
    pub focus: Field,
    pub show_secret: bool,
    pub submitting: bool,
}

impl Default for KeyDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyDialog {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl KeyDialog {
    pub fn new() -> Self {
        Self {
            mode: DialogMode::Add,
            name: String::new(),
            description: String::new(),
            api_key: String::new(),
            category: Category::General,
            service_url: String::new(),
            expires_at: String::new(),
            tags: Vec::new(),
            tag_input: String::new(),
            selected_tag: None,
            focus: Field::Name,
            show_secret: false,
            submitting: false,
        }
    }

    /// Dialog prefilled from `key`; submission sends only changed fields.
    pub fn edit(key: &ApiKey) -> Self {
        let mut dialog = Self::new();
        dialog.mode = DialogMode::Edit {
            original: key.clone(),
        };
        dialog.name = key.name.clone();
        dialog.description = key.description.clone().unwrap_or_default();
        dialog.api_key = key.api_key.clone();
        dialog.category = key.category;
        dialog.service_url = key.service_url.clone().unwrap_or_default();
        dialog.expires_at = key.expires_at.map(format_date).unwrap_or_default();
        dialog.tags = key.tags.clone();
        dialog
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.mode, DialogMode::Edit { .. })
    }

    pub fn title(&self) -> &'static str {
        if self.is_edit() {
            "Edit API Key"
        } else {
            "Add New API Key"
        }
    }

    /// Normalizes the pending tag input and appends it unless empty or
    /// already present.
    pub fn add_tag(&mut self) -> bool {
        let tag = self.tag_input.trim().to_lowercase();
        if tag.is_empty() || self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        self.tag_input.clear();
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn pop_tag(&mut self) -> Option<String> {
        self.selected_tag = None;
        self.tags.pop()
    }

    /// Moves the tag selection left; with nothing selected it picks the last
    /// tag.
    pub fn select_prev_tag(&mut self) {
        self.selected_tag = match self.selected_tag {
            _ if self.tags.is_empty() => None,
            None => Some(self.tags.len() - 1),
            Some(i) => Some(i.saturating_sub(1)),
        };
    }

    /// Moves the tag selection right; past the last tag it clears.
    pub fn select_next_tag(&mut self) {
        self.selected_tag = match self.selected_tag {
            Some(i) if i + 1 < self.tags.len() => Some(i + 1),
            _ => None,
        };
    }

    pub fn remove_selected_tag(&mut self) -> Option<String> {
        let index = self.selected_tag.filter(|i| *i < self.tags.len())?;
        let tag = self.tags[index].clone();
        self.remove_tag(&tag);
        self.selected_tag = match self.tags.len() {
            0 => None,
            len => Some(index.min(len - 1)),
        };
        Some(tag)
    }

    pub fn can_submit(&self) -> bool {
        !self.name.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    fn parsed_expiry(&self) -> Result<Option<chrono::NaiveDate>, String> {
        let raw = self.expires_at.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        parse_date(raw)
            .map(Some)
            .map_err(|_| format!("Expiry '{raw}' is not a YYYY-MM-DD date"))
    }

    pub fn to_draft(&self) -> Result<KeyDraft, String> {
        if !self.can_submit() {
            return Err(REQUIRED_MESSAGE.to_string());
        }
        let mut draft = KeyDraft::new(self.name.trim(), self.api_key.trim());
        draft.description = non_empty(&self.description);
        draft.category = self.category;
        draft.service_url = non_empty(&self.service_url);
        draft.expires_at = self.parsed_expiry()?;
        draft.tags = self.tags.clone();
        Ok(draft)
    }

    /// Fields that differ from `original`, normalized the same way as
    /// [`KeyDialog::to_draft`].
    pub fn to_update(&self, original: &ApiKey) -> Result<KeyUpdate, String> {
        let draft = self.to_draft()?;
        let mut update = KeyUpdate::default();
        if draft.name != original.name {
            update.name = Some(draft.name.clone());
        }
        if draft.api_key != original.api_key {
            update.api_key = Some(draft.api_key.clone());
        }
        if draft.description != original.description {
            update.description = Some(draft.description.clone());
        }
        if draft.category != original.category {
            update.category = Some(draft.category);
        }
        if draft.service_url != original.service_url {
            update.service_url = Some(draft.service_url.clone());
        }
        if draft.expires_at != original.expires_at {
            update.expires_at = Some(draft.expires_at);
        }
        if draft.tags != original.tags {
            update.tags = Some(draft.tags.clone());
        }
        Ok(update)
    }

    /// Clears the draft, keeping the mode.
    pub fn reset(&mut self) {
        let mode = std::mem::replace(&mut self.mode, DialogMode::Add);
        *self = Self::new();
        self.mode = mode;
    }

    pub fn submit(&mut self, controller: &mut Controller) -> SubmitOutcome {
        self.submitting = true;
        let outcome = self.persist(controller);
        self.submitting = false;
        if outcome == SubmitOutcome::Saved {
            self.reset();
        }
        outcome
    }

    fn persist(&self, controller: &mut Controller) -> SubmitOutcome {
        match &self.mode {
            DialogMode::Add => match self.to_draft() {
                Ok(draft) => saved_or_failed(controller.add_key(draft)),
                Err(message) => SubmitOutcome::Blocked(message),
            },
            DialogMode::Edit { original } => match self.to_update(original) {
                Ok(update) if update.is_empty() => SubmitOutcome::Unchanged,
                Ok(update) => saved_or_failed(controller.update_key(&original.id, update)),
                Err(message) => SubmitOutcome::Blocked(message),
            },
        }
    }

    pub fn next_category(&mut self) {
        self.category = self.category.next();
    }

    pub fn prev_category(&mut self) {
        self.category = self.category.prev();
    }

    fn text_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Name => Some(&mut self.name),
            Field::Secret => Some(&mut self.api_key),
            Field::Description => Some(&mut self.description),
            Field::ServiceUrl => Some(&mut self.service_url),
            Field::ExpiresAt => Some(&mut self.expires_at),
            Field::Tags => Some(&mut self.tag_input),
            Field::Category => None,
        }
    }

    /// Display text for `field`; the secret is starred unless revealed.
    pub fn display_value(&self, field: Field) -> String {
        match field {
            Field::Name => self.name.clone(),
            Field::Secret if self.show_secret => self.api_key.clone(),
            Field::Secret => "*".repeat(self.api_key.chars().count()),
            Field::Category => format!("◀ {} ▶", self.category.label()),
            Field::Description => self.description.clone(),
            Field::ServiceUrl => self.service_url.clone(),
            Field::ExpiresAt => self.expires_at.clone(),
            Field::Tags => {
                let mut shown: Vec<String> = self
                    .tags
                    .iter()
                    .enumerate()
                    .map(|(i, t)| match self.selected_tag {
                        Some(selected) if selected == i => format!("[{t} ✕]"),
                        _ => format!("[{t}]"),
                    })
                    .collect();
                shown.push(self.tag_input.clone());
                shown.join(" ")
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DialogAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return DialogAction::Cancel,
            KeyCode::Char('s') if ctrl => return DialogAction::Submit,
            KeyCode::Char('h') if ctrl => {
                self.show_secret = !self.show_secret;
            }
            KeyCode::Up | KeyCode::BackTab => self.focus = self.focus.prev(),
            KeyCode::Down | KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::Left if self.focus == Field::Category => self.prev_category(),
            KeyCode::Right if self.focus == Field::Category => self.next_category(),
            KeyCode::Left if self.focus == Field::Tags && self.tag_input.is_empty() => {
                self.select_prev_tag();
            }
            KeyCode::Right if self.focus == Field::Tags && self.tag_input.is_empty() => {
                self.select_next_tag();
            }
            KeyCode::Delete if self.focus == Field::Tags => {
                self.remove_selected_tag();
            }
            KeyCode::Enter => match self.focus {
                Field::Tags if self.tag_input.trim().is_empty() => return DialogAction::Submit,
                Field::Tags => {
                    self.add_tag();
                }
                _ => self.focus = self.focus.next(),
            },
            KeyCode::Backspace => {
                if self.focus == Field::Tags && self.tag_input.is_empty() {
                    if self.remove_selected_tag().is_none() {
                        self.pop_tag();
                    }
                } else if let Some(text) = self.text_mut(self.focus) {
                    text.pop();
                }
            }
            KeyCode::Char(c) if !ctrl => {
                self.selected_tag = None;
                if let Some(text) = self.text_mut(self.focus) {
                    text.push(c);
                }
            }
            _ => {}
        }
        if self.focus != Field::Tags {
            self.selected_tag = None;
        }
        DialogAction::None
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn saved_or_failed(saved: bool) -> SubmitOutcome {
    if saved {
        SubmitOutcome::Saved
    } else {
        SubmitOutcome::Failed
    }
}
