use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use tinyfront_core::auth::Account;

use crate::app::{App, AppState};

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(3), // Actions
            Constraint::Min(6),    // Output
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_actions(frame, app, chunks[1]);
    render_output(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    // Render overlays
    match app.state {
        AppState::ShowingHelp => render_help_overlay(frame),
        AppState::ConfirmingQuit => render_quit_overlay(frame),
        AppState::AwaitingRedirect => render_redirect_overlay(frame, app),
        AppState::Normal | AppState::Quitting => {}
    }
}

/// Right-hand side of the title bar: the login button or a greeting.
pub fn greeting(account: Option<&Account>) -> String {
    match account {
        Some(account) => format!("Welcome, {}", account.first_name()),
        None => "[l] Login".to_string(),
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  Tiny Frontend";
    let greeting = greeting(app.account.as_ref());
    let help_hint = "  [?] Help";
    let used = title.len() + greeting.chars().count() + help_hint.len() + 2;

    let greeting_style = if app.is_authenticated() {
        styles::success_style()
    } else {
        styles::highlight_style()
    };

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat((area.width as usize).saturating_sub(used))),
        Span::styled(greeting, greeting_style),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(title_line).block(block);
    frame.render_widget(paragraph, area);
}

fn render_actions(frame: &mut Frame, app: &App, area: Rect) {
    let authenticated = app.is_authenticated();
    let actions = [
        ("[h] Health check", true),
        ("[u] User info", authenticated),
        ("[a] Admin info", authenticated),
        ("[x] Clear session", authenticated),
    ];

    let mut spans = vec![Span::raw(" ")];
    for (i, (label, enabled)) in actions.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", styles::muted_style()));
        }
        spans.push(Span::styled(*label, styles::action_style(*enabled)));
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}

fn render_output(frame: &mut Frame, app: &App, area: Rect) {
    let style = if app.output_failed {
        styles::error_style()
    } else {
        styles::text_style()
    };

    let block = Block::default()
        .title(" Output ")
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    let paragraph = Paragraph::new(app.output.as_str())
        .style(style)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", msg),
        None if app.is_authenticated() => " Signed in ".to_string(),
        None => " Not signed in ".to_string(),
    };
    let right_text = " [?] help | [q]uit ";

    let width = area.width as usize;
    let padding_len = width
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    let paragraph = Paragraph::new(status_line).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

fn help_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(key, styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let help_text = help_lines();
    // Room for every line inside the border
    let height = help_text.len() as u16 + 2;
    let area = centered_rect_fixed(46, height, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

fn help_lines() -> Vec<Line<'static>> {
    let version = env!("CARGO_PKG_VERSION");

    vec![
        Line::from(Span::styled("  Tiny Frontend", styles::title_style())),
        Line::from(Span::styled(
            format!("  version {}", version),
            styles::muted_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(" Actions", styles::highlight_style())),
        help_line("  h         ", "Call the health check"),
        help_line("  u         ", "Get user info"),
        help_line("  a         ", "Get admin info"),
        help_line("  l         ", "Log in"),
        help_line("  x         ", "Clear the session"),
        help_line("  q         ", "Quit"),
        Line::from(""),
        Line::from(Span::styled(" Sign-in", styles::highlight_style())),
        help_line("  Enter     ", "Continue with the pasted URL"),
        help_line("  Esc       ", "Cancel sign-in"),
        Line::from(""),
        Line::from(vec![
            Span::styled("     Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ]
}

/// Last `max` characters of `s`.
pub fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((start, _)) => &s[start..],
        None => s,
    }
}

fn render_redirect_overlay(frame: &mut Frame, app: &App) {
    let screen = frame.area();
    let width = screen.width.saturating_sub(4).min(100);
    let area = centered_rect_fixed(width, 16, screen);
    frame.render_widget(Clear, area);

    let url = app.auth_url.as_deref().unwrap_or_default();
    // Inner width minus borders, prompt and cursor
    let input_room = (width as usize).saturating_sub(6);

    let lines = vec![
        Line::from(Span::styled(" Sign in with Microsoft", styles::title_style())),
        Line::from(""),
        Line::from(Span::styled(
            " Open this address in your browser:",
            styles::muted_style(),
        )),
        Line::from(Span::styled(format!(" {}", url), styles::link_style())),
        Line::from(""),
        Line::from(Span::styled(
            " Then paste the address the browser was sent back to:",
            styles::muted_style(),
        )),
        Line::from(vec![
            Span::styled(" > ", styles::help_key_style()),
            Span::styled(
                format!("{}▌", tail(&app.callback_input, input_room)),
                styles::text_style(),
            ),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled(" [Enter]", styles::help_key_style()),
            Span::styled(" continue  ", styles::muted_style()),
            Span::styled("[Esc]", styles::help_key_style()),
            Span::styled(" cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(40, 7, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
