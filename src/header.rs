use crate::models::{CategoryFilter, User};

/// Search text and category chip selection.
#[derive(Debug, Clone, Default)]
pub struct HeaderState {
    pub query: String,
    pub category: CategoryFilter,
    pub search_focused: bool,
    pub user_menu_open: bool,
}

impl HeaderState {
    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
    }

    pub fn pop_char(&mut self) {
        self.query.pop();
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
    }

    pub fn next_category(&mut self) {
        self.category = self.category.next();
    }

    pub fn prev_category(&mut self) {
        self.category = self.category.prev();
    }
}

/// Avatar initials: display-name word initials, else the first two
/// characters of the email, else "U".
pub fn user_initials(user: &User) -> String {
    if let Some(name) = user.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .collect::<String>()
            .to_uppercase();
    }
    if !user.email.is_empty() {
        return user.email.chars().take(2).collect::<String>().to_uppercase();
    }
    "U".to_string()
}
