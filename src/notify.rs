use std::collections::VecDeque;
use std::time::{Duration, Instant};

const TOAST_LIFETIME: Duration = Duration::from_secs(4);
const TOAST_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
    raised_at: Instant,
}

/// Transient notifications. The newest toast is shown; older ones wait
/// underneath until they expire or are dismissed.
#[derive(Debug)]
pub struct Toaster {
    toasts: VecDeque<Toast>,
    lifetime: Duration,
}

impl Default for Toaster {
    fn default() -> Self {
        Self::new(TOAST_LIFETIME)
    }
}

impl Toaster {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            toasts: VecDeque::new(),
            lifetime,
        }
    }

    pub fn push(&mut self, title: impl Into<String>, description: impl Into<String>, variant: ToastVariant) {
        self.toasts.push_back(Toast {
            title: title.into(),
            description: description.into(),
            variant,
            raised_at: Instant::now(),
        });
        while self.toasts.len() > TOAST_LIMIT {
            self.toasts.pop_front();
        }
    }

    pub fn success(&mut self, description: impl Into<String>) {
        self.push("Success", description, ToastVariant::Default);
    }

    pub fn error(&mut self, description: impl Into<String>) {
        self.push("Error", description, ToastVariant::Destructive);
    }

    pub fn current(&self) -> Option<&Toast> {
        self.toasts.back()
    }

    pub fn dismiss(&mut self) {
        self.toasts.pop_back();
    }

    pub fn expire(&mut self, now: Instant) {
        let lifetime = self.lifetime;
        self.toasts
            .retain(|t| now.saturating_duration_since(t.raised_at) < lifetime);
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }
}
