use std::io::{self, Write};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use ratatui::{
    prelude::*,
    style::Style,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use rpassword::prompt_password;

use crate::card::{expiry_status, mask_secret, relative_time, service_host, ExpiryStatus};
use crate::dialog::{Field, KeyDialog};
use crate::grid::KeyStats;
use crate::header::{user_initials, HeaderState};
use crate::models::{ApiKey, Category, CategoryFilter, User};
use crate::notify::{Toast, ToastVariant};

const COLOR_SAND: Color = Color::Rgb(0xEB, 0xDB, 0xB2);
const COLOR_OLIVE: Color = Color::Rgb(0x98, 0x97, 0x1A);
const COLOR_MOSS: Color = Color::Rgb(0x67, 0x67, 0x1C);
const COLOR_RUST: Color = Color::Rgb(0xCC, 0x24, 0x1D);
const COLOR_AMBER: Color = Color::Rgb(0xD7, 0x99, 0x21);

pub const CARD_WIDTH: u16 = 40;
pub const CARD_HEIGHT: u16 = 9;
const MAX_COLUMNS: u16 = 3;

pub const DIALOG_HINT: &str = "↑/↓ move | ←/→ category or tag | Enter next/add tag | Del remove tag | Ctrl+s save | Ctrl+h show/hide | Esc close";

#[derive(Clone, Copy)]
struct OverlayTheme {
    border: Color,
    title: Color,
    text: Color,
    bg: Color,
}

fn themed_overlay(title: &str) -> OverlayTheme {
    match title {
        "Add New API Key" => OverlayTheme {
            border: COLOR_OLIVE,
            title: COLOR_SAND,
            text: COLOR_SAND,
            bg: Color::Rgb(0x1D, 0x21, 0x10),
        },
        "Edit API Key" => OverlayTheme {
            border: Color::Rgb(0xB3, 0xB2, 0x3A),
            title: COLOR_OLIVE,
            text: COLOR_SAND,
            bg: Color::Rgb(0x20, 0x23, 0x12),
        },
        "Account" => OverlayTheme {
            border: Color::Rgb(0x86, 0x86, 0x35),
            title: COLOR_SAND,
            text: Color::Rgb(0xE3, 0xD5, 0xAE),
            bg: Color::Rgb(0x1A, 0x1D, 0x12),
        },
        "Confirm quit" => OverlayTheme {
            border: Color::Rgb(0xA7, 0xA2, 0x36),
            title: Color::Rgb(0xE6, 0xD8, 0xB2),
            text: COLOR_SAND,
            bg: Color::Rgb(0x25, 0x24, 0x13),
        },
        _ => OverlayTheme {
            border: COLOR_MOSS,
            title: COLOR_SAND,
            text: COLOR_SAND,
            bg: Color::Rgb(0x1E, 0x20, 0x12),
        },
    }
}

fn centered_overlay_area(frame_size: Rect, lines: &[String]) -> Rect {
    let maxw = lines.iter().map(|s| s.chars().count()).max().unwrap_or(0) as u16 + 4;
    let maxh = lines.len() as u16 + 2;
    Rect::new(
        (frame_size.width.saturating_sub(maxw)) / 2,
        (frame_size.height.saturating_sub(maxh)) / 2,
        maxw.min(frame_size.width),
        maxh.min(frame_size.height),
    )
}

fn render_overlay(f: &mut Frame<'_>, lines: &[String], title: &str) {
    let area = centered_overlay_area(f.size(), lines);
    let theme = themed_overlay(title);
    let paragraph = Paragraph::new(
        lines
            .iter()
            .map(|l| Line::from(l.as_str()))
            .collect::<Vec<Line>>(),
    )
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(Span::styled(
                title,
                Style::default()
                    .fg(theme.title)
                    .add_modifier(Modifier::BOLD),
            ))
            .border_style(
                Style::default()
                    .fg(theme.border)
                    .add_modifier(Modifier::BOLD),
            )
            .style(Style::default().bg(theme.bg)),
    );
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

const ASCII_BANNER: [&str; 6] = [
    "██╗  ██╗███████╗██╗   ██╗██╗     ███████╗██████╗  ██████╗ ███████╗██████╗ ",
    "██║ ██╔╝██╔════╝╚██╗ ██╔╝██║     ██╔════╝██╔══██╗██╔════╝ ██╔════╝██╔══██╗",
    "█████╔╝ █████╗   ╚████╔╝ ██║     █████╗  ██║  ██║██║  ███╗█████╗  ██████╔╝",
    "██╔═██╗ ██╔══╝    ╚██╔╝  ██║     ██╔══╝  ██║  ██║██║   ██║██╔══╝  ██╔══██╗",
    "██║  ██╗███████╗   ██║   ███████╗███████╗██████╔╝╚██████╔╝███████╗██║  ██║",
    "╚═╝  ╚═╝╚══════╝   ╚═╝   ╚══════╝╚══════╝╚═════╝  ╚═════╝ ╚══════╝╚═╝  ╚═╝",
];

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const KEY_TRAVEL: usize = 6;

/// A key sliding toward its lock, one cell per frame.
fn key_frame(frame: usize) -> [String; 3] {
    let step = frame % (KEY_TRAVEL + 1);
    let gap = " ".repeat(KEY_TRAVEL - step);
    let lead = " ".repeat(step);
    [
        format!("{lead} ,-.          {gap}┌───┐"),
        format!("{lead}( o )━━━━┳━┳━{gap}│ ▮ │"),
        format!("{lead} `-'          {gap}└───┘"),
    ]
}

fn banner(f: &mut Frame<'_>, area: Rect) {
    let banner_lines: Vec<Line> = ASCII_BANNER
        .iter()
        .map(|l| {
            let spans: Vec<Span> = l
                .chars()
                .map(|ch| {
                    let color = match ch {
                        '█' => COLOR_SAND,
                        '═' | '╗' | '╝' | '╔' | '╚' => COLOR_OLIVE,
                        '║' => COLOR_MOSS,
                        _ => Color::Reset,
                    };
                    Span::styled(ch.to_string(), Style::default().fg(color).add_modifier(Modifier::BOLD))
                })
                .collect();
            Line::from(spans)
        })
        .collect();
    let banner = Paragraph::new(banner_lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::NONE));
    f.render_widget(banner, area);
}

pub struct SignInState<'a> {
    pub status: &'a str,
    pub input_display: &'a str,
    pub input_visible: bool,
    pub anim_frame: usize,
    /// Seconds until sign-in is accepted again.
    pub locked_for: Option<u64>,
}

pub fn draw_loading(f: &mut Frame<'_>, anim_frame: usize) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(f.size());
    banner(f, layout[1]);
    let spinner = SPINNER[anim_frame % SPINNER.len()];
    let loading = Paragraph::new(format!("{spinner} Loading..."))
        .alignment(Alignment::Center)
        .style(Style::default().fg(COLOR_SAND));
    f.render_widget(loading, layout[2]);
}

pub fn draw_sign_in(f: &mut Frame<'_>, state: &SignInState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),  // top padding
            Constraint::Length(8),  // banner
            Constraint::Length(6),  // input
            Constraint::Length(5),  // animation
            Constraint::Min(0),
            Constraint::Length(3),  // footer
        ])
        .split(f.size());

    banner(f, layout[1]);

    let box_width: u16 = 44;
    let input_area = layout[2];
    let w = box_width.min(input_area.width);
    let x = input_area.x + input_area.width.saturating_sub(w) / 2;
    let label_area = Rect::new(x, input_area.y, w, 1);
    let box_area = Rect::new(x, input_area.y + 1, w, 3);

    let label = Paragraph::new("Sign in to manage your API keys")
        .alignment(Alignment::Center)
        .style(Style::default().fg(COLOR_SAND).add_modifier(Modifier::BOLD));
    f.render_widget(label, label_area);

    let (prompt_text, prompt_style) = match state.locked_for {
        Some(secs) => (
            format!("Locked, try again in {secs}s"),
            Style::default().fg(COLOR_RUST),
        ),
        None => (format!("> {}", state.input_display), Style::default().fg(COLOR_SAND)),
    };
    let prompt = Paragraph::new(Span::styled(prompt_text, prompt_style))
        .alignment(Alignment::Left)
        .block(
            Block::default().borders(Borders::ALL).title(if state.input_visible {
                "Passphrase (visible)"
            } else {
                "Passphrase (hidden)"
            }),
        );
    f.render_widget(prompt, box_area);

    let anim = key_frame(state.anim_frame);
    let anim_lines: Vec<Line> = anim
        .iter()
        .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(COLOR_SAND))))
        .collect();
    f.render_widget(Paragraph::new(anim_lines).alignment(Alignment::Center), layout[3]);

    let footer = Paragraph::new(state.status).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, layout[5]);
}

pub struct ViewState<'a> {
    pub user: &'a User,
    pub header: &'a HeaderState,
    /// Filtered view, in display order.
    pub keys: &'a [&'a ApiKey],
    pub stats: KeyStats,
    pub has_records: bool,
    pub selected: usize,
    pub revealed: Option<&'a str>,
    pub now: DateTime<Utc>,
    pub dialog: Option<&'a KeyDialog>,
    pub quit_overlay: bool,
    pub toast: Option<&'a Toast>,
    pub status: &'a str,
}

pub fn draw(f: &mut Frame<'_>, state: &ViewState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // stats
            Constraint::Min(1),    // cards
            Constraint::Length(3), // footer
        ])
        .split(f.size());

    draw_header(f, layout[0], state);
    draw_stats(f, layout[1], &state.stats);
    if state.keys.is_empty() {
        draw_empty_state(f, layout[2], state.has_records);
    } else {
        draw_grid(f, layout[2], state);
    }
    draw_footer(f, layout[3], state);

    if let Some(dialog) = state.dialog {
        render_overlay(f, &dialog_lines(dialog), dialog.title());
    }

    if state.header.user_menu_open {
        render_overlay(f, &user_menu_lines(state.user), "Account");
    }

    if state.quit_overlay {
        let lines = vec![
            "Quit?".to_string(),
            "".to_string(),
            "[y] Yes   [n] No".to_string(),
        ];
        render_overlay(f, &lines, "Confirm quit");
    }
}

fn draw_header(f: &mut Frame<'_>, area: Rect, state: &ViewState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Min(10),
            Constraint::Length(8),
        ])
        .split(area);

    let search_style = if state.header.search_focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(COLOR_MOSS)
    };
    let search_text = if state.header.query.is_empty() && !state.header.search_focused {
        Span::styled("Search API keys...", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(format!("{}{}", state.header.query, if state.header.search_focused { "▏" } else { "" }))
    };
    let search = Paragraph::new(Line::from(search_text)).block(
        Block::default()
            .title("Search (/)")
            .borders(Borders::ALL)
            .border_style(search_style),
    );
    f.render_widget(search, cols[0]);

    let mut chips: Vec<Span> = Vec::new();
    for chip in CategoryFilter::chips() {
        let style = if chip == state.header.category {
            Style::default()
                .fg(Color::Black)
                .bg(COLOR_SAND)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_SAND)
        };
        chips.push(Span::styled(format!(" {} ", chip.label()), style));
        chips.push(Span::raw(" "));
    }
    let chips = Paragraph::new(Line::from(chips))
        .block(Block::default().title("Category (Tab)").borders(Borders::ALL));
    f.render_widget(chips, cols[1]);

    let avatar = Paragraph::new(Span::styled(
        user_initials(state.user),
        Style::default().fg(COLOR_OLIVE).add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center)
    .block(Block::default().title("(u)").borders(Borders::ALL));
    f.render_widget(avatar, cols[2]);
}

fn draw_stats(f: &mut Frame<'_>, area: Rect, stats: &KeyStats) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);
    let tiles = [
        ("Total Keys", stats.total, COLOR_SAND),
        ("Active", stats.active, Color::Green),
        ("Expiring Soon", stats.expiring_soon, COLOR_AMBER),
        ("Categories", stats.categories, COLOR_OLIVE),
    ];
    for (idx, (title, value, color)) in tiles.into_iter().enumerate() {
        let tile = Paragraph::new(Span::styled(
            value.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(tile, cols[idx]);
    }
}

fn draw_empty_state(f: &mut Frame<'_>, area: Rect, has_records: bool) {
    let (headline, hint) = if has_records {
        ("No API keys found", "Try a different search or category.")
    } else {
        ("No API keys yet", "Press n to add your first API key.")
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            headline,
            Style::default().fg(COLOR_SAND).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))),
    ];
    let empty = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(COLOR_MOSS)));
    f.render_widget(empty, area);
}

/// Cards per row for a grid `width` cells wide.
pub fn grid_columns(width: u16) -> usize {
    (width / CARD_WIDTH).clamp(1, MAX_COLUMNS) as usize
}

/// First card row to draw so that the selected card stays on screen.
pub fn first_visible_row(selected: usize, columns: usize, visible_rows: usize) -> usize {
    let row = selected / columns.max(1);
    row.saturating_sub(visible_rows.max(1) - 1)
}

fn draw_grid(f: &mut Frame<'_>, area: Rect, state: &ViewState) {
    let columns = grid_columns(area.width);
    let visible_rows = ((area.height / CARD_HEIGHT) as usize).max(1);
    let first = first_visible_row(state.selected, columns, visible_rows);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(CARD_HEIGHT); visible_rows])
        .split(area);
    for (r, row_area) in rows.iter().enumerate() {
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, columns as u32); columns])
            .split(*row_area);
        for (c, cell) in cells.iter().enumerate() {
            let idx = (first + r) * columns + c;
            if let Some(key) = state.keys.get(idx) {
                let revealed = state.revealed == Some(key.id.as_str());
                draw_card(f, *cell, key, idx == state.selected, revealed, state.now);
            }
        }
    }
}

fn category_color(category: Category) -> Color {
    match category {
        Category::Ai => Color::Magenta,
        Category::Payment => Color::Green,
        Category::Email => Color::Blue,
        Category::Database => COLOR_AMBER,
        Category::Analytics => Color::Cyan,
        Category::Social => Color::LightRed,
        Category::General => COLOR_SAND,
    }
}

fn expiry_color(status: ExpiryStatus) -> Color {
    match status {
        ExpiryStatus::Expired | ExpiryStatus::Expiring(_) => COLOR_RUST,
        ExpiryStatus::Warning(_) => COLOR_AMBER,
        ExpiryStatus::Good(_) => Color::Green,
    }
}

pub fn card_lines(key: &ApiKey, revealed: bool, now: DateTime<Utc>) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);

    let mut badges = vec![Span::styled(
        format!("[{}]", key.category.label()),
        Style::default().fg(category_color(key.category)).add_modifier(Modifier::BOLD),
    )];
    if !key.is_active {
        badges.push(Span::styled(" Inactive", dim));
    }

    let description = match key.description.as_deref() {
        Some(text) => Line::from(text.to_string()),
        None => Line::from(Span::styled("No description", dim)),
    };

    let secret = if revealed {
        key.api_key.clone()
    } else {
        mask_secret(&key.api_key)
    };

    let service = match key.service_url.as_deref() {
        Some(url) => Line::from(format!("Service: {}", service_host(url))),
        None => Line::from(Span::styled("Service: -", dim)),
    };

    let expiry = match expiry_status(key.expires_at, now) {
        Some(status) => Line::from(Span::styled(
            status.label(),
            Style::default().fg(expiry_color(status)).add_modifier(Modifier::BOLD),
        )),
        None => Line::from(Span::styled("No expiry", dim)),
    };

    let tags = if key.tags.is_empty() {
        Line::from(Span::styled("No tags", dim))
    } else {
        Line::from(
            key.tags
                .iter()
                .map(|t| format!("#{t}"))
                .collect::<Vec<_>>()
                .join(" "),
        )
    };

    let last_used = key
        .last_used_at
        .map(|at| relative_time(at, now))
        .unwrap_or_else(|| "never".to_string());
    let timeline = Line::from(Span::styled(
        format!("Created {} · Used {last_used}", relative_time(key.created_at, now)),
        dim,
    ));

    vec![
        Line::from(badges),
        description,
        Line::from(format!("Key: {secret}")),
        service,
        expiry,
        tags,
        timeline,
    ]
}

fn draw_card(
    f: &mut Frame<'_>,
    area: Rect,
    key: &ApiKey,
    selected: bool,
    revealed: bool,
    now: DateTime<Utc>,
) {
    let border = if selected {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else if key.is_active {
        Style::default().fg(COLOR_MOSS)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let title = Span::styled(
        format!(" {} ", key.name),
        Style::default().fg(COLOR_SAND).add_modifier(Modifier::BOLD),
    );
    let card = Paragraph::new(card_lines(key, revealed, now))
        .wrap(Wrap { trim: true })
        .block(Block::default().title(title).borders(Borders::ALL).border_style(border));
    f.render_widget(card, area);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, state: &ViewState) {
    let line = match state.toast {
        Some(toast) => {
            let color = match toast.variant {
                ToastVariant::Default => Color::Green,
                ToastVariant::Destructive => COLOR_RUST,
            };
            Line::from(vec![
                Span::styled(
                    format!("{}: ", toast.title),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(toast.description.clone()),
                Span::styled("  (x dismiss)", Style::default().fg(Color::DarkGray)),
            ])
        }
        None => Line::from(state.status),
    };
    let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

pub fn dialog_lines(dialog: &KeyDialog) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(if dialog.is_edit() {
        "Update the details of this API key.".to_string()
    } else {
        "Store a new API key with its details.".to_string()
    });
    lines.push("".to_string());
    for field in Field::ALL {
        let marker = if field == dialog.focus { ">" } else { " " };
        lines.push(format!("{marker} {}: {}", field.label(), dialog.display_value(field)));
    }
    lines.push("".to_string());
    if dialog.submitting {
        lines.push("Saving...".to_string());
    }
    lines.push(DIALOG_HINT.to_string());
    lines
}

fn user_menu_lines(user: &User) -> Vec<String> {
    vec![
        user.display_name.clone().unwrap_or_else(|| "Signed in".to_string()),
        user.email.clone(),
        "".to_string(),
        "[l] Sign out   [Esc] Close".to_string(),
    ]
}

/// Reads one line from stdin after printing `label`.
pub fn prompt_line(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

pub fn prompt_new_master_password() -> Result<String> {
    loop {
        let p1 = prompt_password("Set a passphrase: ")?;
        let p2 = prompt_password("Confirm passphrase: ")?;
        if p1 != p2 {
            println!("Passphrases did not match, try again.");
            continue;
        }
        if let Err(e) = validate_master_passphrase(&p1) {
            println!("{e}");
            continue;
        }
        return Ok(p1);
    }
}

pub fn validate_master_passphrase(passphrase: &str) -> Result<()> {
    if passphrase.chars().count() < 8 {
        return Err(anyhow!("Passphrase should be at least 8 characters."));
    }
    if !passphrase.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(anyhow!("Passphrase should include at least one uppercase letter."));
    }
    if !passphrase.chars().any(|c| c.is_ascii_digit()) {
        return Err(anyhow!("Passphrase should include at least one number."));
    }
    if !passphrase
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        return Err(anyhow!(
            "Passphrase should include at least one special character."
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyDraft;
    use chrono::{Duration, TimeZone};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn text(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    fn sample_key() -> ApiKey {
        let mut draft = KeyDraft::new("OpenAI", "sk-abc123xyz789");
        draft.category = Category::Ai;
        draft.service_url = Some("https://api.openai.com/v1".into());
        draft.expires_at = Some((now() + Duration::days(3)).date_naive());
        draft.tags = vec!["prod".into(), "llm".into()];
        ApiKey::from_draft(draft, "user_1", now() - Duration::days(2))
    }

    #[test]
    fn passphrase_rules() {
        assert!(validate_master_passphrase("short1!").is_err());
        assert!(validate_master_passphrase("longenough1!").is_err());
        assert!(validate_master_passphrase("Longenough!").is_err());
        assert!(validate_master_passphrase("Longenough1").is_err());
        assert!(validate_master_passphrase("Longenough1!").is_ok());
    }

    #[test]
    fn grid_columns_fit_width() {
        assert_eq!(grid_columns(10), 1);
        assert_eq!(grid_columns(CARD_WIDTH * 2), 2);
        assert_eq!(grid_columns(500), 3);
    }

    #[test]
    fn selection_scrolls_into_view() {
        assert_eq!(first_visible_row(0, 3, 2), 0);
        assert_eq!(first_visible_row(5, 3, 2), 0);
        assert_eq!(first_visible_row(6, 3, 2), 1);
        assert_eq!(first_visible_row(11, 1, 3), 9);
    }

    #[test]
    fn card_masks_secret_until_revealed() {
        let key = sample_key();
        let masked = text(&card_lines(&key, false, now()));
        assert_eq!(masked[0], "[AI & ML]");
        assert_eq!(masked[1], "No description");
        assert_eq!(masked[2], "Key: sk-a•••••••z789");
        assert_eq!(masked[3], "Service: api.openai.com");
        assert_eq!(masked[4], "Expires in 3 days");
        assert_eq!(masked[5], "#prod #llm");
        assert_eq!(masked[6], "Created 2 days ago · Used never");

        let shown = text(&card_lines(&key, true, now()));
        assert_eq!(shown[2], "Key: sk-abc123xyz789");
    }

    #[test]
    fn inactive_cards_are_badged() {
        let mut key = sample_key();
        key.is_active = false;
        key.expires_at = None;
        let lines = text(&card_lines(&key, false, now()));
        assert_eq!(lines[0], "[AI & ML] Inactive");
        assert_eq!(lines[4], "No expiry");
    }

    #[test]
    fn dialog_overlay_marks_focused_field() {
        let mut dialog = KeyDialog::new();
        dialog.name = "Stripe".into();
        dialog.focus = Field::Secret;
        let lines = dialog_lines(&dialog);
        assert!(lines.contains(&"  Name (required): Stripe".to_string()));
        assert!(lines.contains(&"> API key (required): ".to_string()));
        assert!(lines.contains(&"  Category: ◀ General ▶".to_string()));
    }

    #[test]
    fn dashboard_renders_stats_and_empty_state() {
        let user = User {
            id: "user_1".into(),
            email: "ada@example.com".into(),
            display_name: Some("Ada Lovelace".into()),
        };
        let header = HeaderState::default();
        let keys: Vec<&ApiKey> = Vec::new();
        let state = ViewState {
            user: &user,
            header: &header,
            keys: &keys,
            stats: KeyStats::default(),
            has_records: false,
            selected: 0,
            revealed: None,
            now: now(),
            dialog: None,
            quit_overlay: false,
            toast: None,
            status: "n add",
        };
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| draw(f, &state)).unwrap();
        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("No API keys yet"));
        assert!(rendered.contains("Total Keys"));
        assert!(rendered.contains("AL"));
        assert!(rendered.contains("All Keys"));
    }
}
