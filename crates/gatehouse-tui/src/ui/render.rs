use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use gatehouse_core::guard::{GuardState, Route};

use crate::app::{App, AppState, CallOutcome, LoginFocus};

use super::styles;

/// Visible width of the username/password fields.
const FIELD_WIDTH: usize = 24;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(3), // Nav
            Constraint::Min(10),   // Page
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_nav(frame, app, chunks[1]);
    match app.page {
        Route::Home => render_home(frame, app, chunks[2]),
        Route::Login => render_login(frame, app, chunks[2]),
        Route::OAuthCallback => render_callback(frame, app, chunks[2]),
    }
    render_status_bar(frame, app, chunks[3]);

    // Render overlays
    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        render_quit_overlay(frame);
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  Gatehouse";
    let backend = format!("{} ({} auth)", app.flow.api().base_url(), app.mode());
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::styled(format!("  {}", backend), styles::muted_style()),
        Span::raw(" ".repeat(
            (area.width as usize)
                .saturating_sub(title.len() + backend.len() + 2 + help_hint.len() + 2),
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_nav(frame: &mut Frame, app: &App, area: Rect) {
    let links = [("[1] Home", Route::Home), ("[2] Login", Route::Login)];

    let mut spans = vec![Span::raw(" ")];
    for (i, (label, route)) in links.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", styles::muted_style()));
        }
        spans.push(Span::styled(*label, styles::tab_style(app.page == *route)));
    }
    if app.page == Route::OAuthCallback {
        spans.push(Span::styled(" | ", styles::muted_style()));
        spans.push(Span::styled(Route::OAuthCallback.title(), styles::tab_style(true)));
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn page_block(route: Route) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .title(Span::styled(format!(" {} ", route.title()), styles::title_style()))
}

fn key_hint(key: &'static str, desc: &'static str) -> Vec<Span<'static>> {
    vec![
        Span::styled(key, styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ]
}

// ============================================================================
// Pages
// ============================================================================

fn render_home(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![Line::from("")];

    let state = app.guard.as_ref().map(|g| g.state());
    match (state, app.user.as_ref()) {
        (_, Some(user)) => {
            lines.push(Line::from(Span::styled(
                format!("  {}", user.welcome_message()),
                styles::success_style(),
            )));
            lines.push(Line::from(""));
            if let Some(id) = user.id_display() {
                lines.push(Line::from(vec![
                    Span::styled("  id        ", styles::muted_style()),
                    Span::styled(id, styles::text_style()),
                ]));
            }
            for (label, flag) in [
                ("  active    ", user.is_active),
                ("  verified  ", user.is_verified),
                ("  superuser ", user.is_superuser),
            ] {
                lines.push(Line::from(vec![
                    Span::styled(label, styles::muted_style()),
                    Span::styled(if flag { "yes" } else { "no" }, styles::text_style()),
                ]));
            }
            lines.push(Line::from(""));

            let mut hints = vec![Span::raw("  ")];
            hints.extend(key_hint("[c]", " Call /authenticated-route   "));
            hints.extend(key_hint("[o]", " Logout   "));
            hints.extend(key_hint("[r]", " Reload"));
            lines.push(Line::from(hints));
        }
        (Some(GuardState::Unauthenticated), None) => {
            lines.push(Line::from(Span::styled(
                "  Not signed in. Redirecting to login...",
                styles::muted_style(),
            )));
        }
        _ => {
            lines.push(Line::from(Span::styled(
                "  Checking session...",
                styles::muted_style(),
            )));
        }
    }

    let has_result = app.call_outcome.is_some();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(if has_result {
            [Constraint::Min(9), Constraint::Length(7)]
        } else {
            [Constraint::Min(9), Constraint::Length(0)]
        })
        .split(area);

    frame.render_widget(
        Paragraph::new(lines).block(page_block(Route::Home)),
        chunks[0],
    );

    if let Some(ref outcome) = app.call_outcome {
        let (text, style) = match outcome {
            CallOutcome::Pending => ("Calling...".to_string(), styles::muted_style()),
            CallOutcome::Body(body) => (body.clone(), styles::text_style()),
            CallOutcome::Failed(error) => (error.clone(), styles::error_style()),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(styles::border_style(false))
            .title(Span::styled(" Response ", styles::muted_style()));
        frame.render_widget(
            Paragraph::new(Span::styled(text, style))
                .block(block)
                .wrap(Wrap { trim: false }),
            chunks[1],
        );
    }
}

fn render_login(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![Line::from("")];

    if app.session.is_signed_in() {
        lines.push(Line::from(Span::styled(
            "  You are already logged in.",
            styles::success_style(),
        )));
        lines.push(Line::from(""));
        let mut hints = vec![Span::raw("  ")];
        hints.extend(key_hint("[1]", " Go to Home   "));
        hints.extend(key_hint("[o]", " Logout"));
        lines.push(Line::from(hints));
        frame.render_widget(Paragraph::new(lines).block(page_block(Route::Login)), area);
        return;
    }

    lines.push(button_line(
        "[g] Login with Google",
        app.login_focus == LoginFocus::Google,
    ));

    if app.shows_password_form() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  or sign in with a password",
            styles::muted_style(),
        )));
        lines.push(Line::from(""));

        let masked = "*".repeat(app.login_password.chars().count());
        lines.push(field_line(
            "Username",
            &app.login_username,
            app.login_focus == LoginFocus::Username,
        ));
        lines.push(field_line(
            "Password",
            &masked,
            app.login_focus == LoginFocus::Password,
        ));
        lines.push(Line::from(""));
        lines.push(button_line("Login", app.login_focus == LoginFocus::Button));
    }

    if app.login_busy {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("  Signing in...", styles::muted_style())));
    }

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", error),
            styles::error_style(),
        )));
    }

    frame.render_widget(
        Paragraph::new(lines)
            .block(page_block(Route::Login))
            .wrap(Wrap { trim: false }),
        area,
    );
}

/// Shows the tail of long input so the cursor stays visible.
fn field_line(label: &str, value: &str, focused: bool) -> Line<'static> {
    let style = if focused {
        styles::selected_style()
    } else {
        styles::text_style()
    };
    let count = value.chars().count();
    let visible: String = value.chars().skip(count.saturating_sub(FIELD_WIDTH)).collect();
    let cursor = if focused { "▌" } else { "" };
    Line::from(vec![
        Span::styled(format!("  {}: [", label), styles::muted_style()),
        Span::styled(format!("{:<width$}{}", visible, cursor, width = FIELD_WIDTH), style),
        Span::styled("]", styles::muted_style()),
    ])
}

fn button_line(label: &str, focused: bool) -> Line<'static> {
    if focused {
        Line::from(vec![
            Span::raw("  ["),
            Span::styled(format!(" ▶ {} ◀ ", label), styles::selected_style()),
            Span::raw("]"),
        ])
    } else {
        Line::from(vec![
            Span::raw("  ["),
            Span::styled(format!("   {}   ", label), styles::text_style()),
            Span::raw("]"),
        ])
    }
}

fn render_callback(frame: &mut Frame, app: &App, area: Rect) {
    let failed = app.callback_status.starts_with("Login failed")
        || app.callback_status.starts_with("Failed")
        || app.callback_status.starts_with("OAuth callback failed")
        || app.callback_status.starts_with("Timed out");
    let status_style = if failed {
        styles::error_style()
    } else {
        styles::text_style()
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!("  {}", app.callback_status), status_style)),
    ];

    if let Some(ref url) = app.authorization_url {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  If no browser opened, visit:",
            styles::muted_style(),
        )));
        lines.push(Line::from(Span::styled(format!("  {}", url), styles::highlight_style())));
    }

    lines.push(Line::from(""));
    let mut hints = vec![Span::raw("  ")];
    hints.extend(key_hint("[Esc]", " Back to login"));
    lines.push(Line::from(hints));

    frame.render_widget(
        Paragraph::new(lines)
            .block(page_block(Route::OAuthCallback))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", msg),
        None => format!(" {} ", app.session_summary()),
    };
    let right_text = " [1] home | [2] login | [q]uit ";

    let padding_len = (area.width as usize)
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    frame.render_widget(
        Paragraph::new(status_line).style(styles::status_bar_style()),
        area,
    );
}

// ============================================================================
// Overlays
// ============================================================================

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(52, 20, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");
    let entry = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<10}", key), styles::help_key_style()),
            Span::styled(desc, styles::help_desc_style()),
        ])
    };

    let help_text = vec![
        Line::from(Span::styled("  Gatehouse", styles::title_style())),
        Line::from(Span::styled(
            format!("  version {}", version),
            styles::muted_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(" Navigation", styles::highlight_style())),
        entry("1 / 2", "Home / Login"),
        entry("Tab ↑/↓", "Move between login fields"),
        entry("Esc", "Leave a field, or the callback page"),
        Line::from(""),
        Line::from(Span::styled(" Actions", styles::highlight_style())),
        entry("g", "Login with Google"),
        entry("Enter", "Submit / activate"),
        entry("c", "Call the protected route"),
        entry("o", "Logout"),
        entry("r", "Reload Home"),
        entry("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 7, frame.area());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_rect_fits_small_terminal() {
        let rect = centered_rect_fixed(52, 20, Rect::new(0, 0, 40, 10));
        assert_eq!(rect.width, 40);
        assert_eq!(rect.height, 10);
    }

    #[test]
    fn test_field_line_keeps_tail_visible() {
        let long = "a".repeat(FIELD_WIDTH) + "xyz";
        let line = field_line("Username", &long, true);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.contains("xyz▌"));
    }
}
