//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes. Network work is started here but always runs
//! in the background, so no handler blocks the UI loop.

use crossterm::event::{KeyCode, KeyEvent};

use gatehouse_core::guard::Route;

use crate::app::{can_add_password_char, can_add_username_char, App, AppState, LoginFocus};

/// Handle keyboard input. Returns true if the app should quit.
pub fn handle_input(app: &mut App, key: KeyEvent) -> bool {
    // Handle help overlay
    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return false;
    }

    // Handle quit confirmation
    if matches!(app.state, AppState::ConfirmingQuit) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
                return true;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Normal;
            }
            _ => {}
        }
        return false;
    }

    // Text fields swallow printable keys
    if app.page == Route::Login && app.shows_password_form() && app.login_focus.is_text_field() {
        handle_login_field_input(app, key);
        return false;
    }

    // Global keys
    match key.code {
        KeyCode::Char('q') => {
            app.state = AppState::ConfirmingQuit;
            return false;
        }
        KeyCode::Char('?') => {
            app.state = AppState::ShowingHelp;
            return false;
        }
        KeyCode::Char('1') => {
            app.status_message = None;
            app.navigate(Route::Home);
            return false;
        }
        KeyCode::Char('2') => {
            app.status_message = None;
            app.navigate(Route::Login);
            return false;
        }
        _ => {}
    }

    match app.page {
        Route::Home => handle_home_input(app, key),
        Route::Login => handle_login_input(app, key),
        Route::OAuthCallback => handle_callback_input(app, key),
    }
    false
}

fn handle_home_input(app: &mut App, key: KeyEvent) {
    // Actions need the guard to have let the page render
    if app.user.is_none() {
        return;
    }
    match key.code {
        KeyCode::Char('o') => app.logout(),
        KeyCode::Char('c') | KeyCode::Enter => app.call_protected(),
        KeyCode::Char('r') => app.navigate(Route::Home),
        _ => {}
    }
}

fn handle_login_input(app: &mut App, key: KeyEvent) {
    if app.session.is_signed_in() {
        if key.code == KeyCode::Char('o') {
            app.logout();
        }
        return;
    }
    if app.login_busy {
        return;
    }

    let with_form = app.shows_password_form();
    match key.code {
        KeyCode::Char('g') => app.start_oauth(),
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = app.login_focus.next(with_form);
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = app.login_focus.prev(with_form);
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Google => app.start_oauth(),
            LoginFocus::Button => app.attempt_login(),
            LoginFocus::Username | LoginFocus::Password => {}
        },
        _ => {}
    }
}

fn handle_login_field_input(app: &mut App, key: KeyEvent) {
    if app.login_busy {
        return;
    }
    match key.code {
        KeyCode::Esc => {
            app.login_focus = LoginFocus::Google;
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = app.login_focus.next(true);
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = app.login_focus.prev(true);
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Username => {
                app.login_focus = LoginFocus::Password;
            }
            _ => app.attempt_login(),
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Username => {
                app.login_username.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            _ => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Username => {
                if can_add_username_char(app.login_username.chars().count(), c) {
                    app.login_username.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.chars().count(), c) {
                    app.login_password.push(c);
                }
            }
            _ => {}
        },
        _ => {}
    }
}

fn handle_callback_input(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.navigate(Route::Login);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use gatehouse_core::api::{ApiClient, ApiSettings};
    use gatehouse_core::auth::{AuthFlow, Session};
    use gatehouse_core::config::{AuthMode, Config, Endpoints};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn login_app(dir: &std::path::Path, mode: AuthMode) -> App {
        let api = ApiClient::new(ApiSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            endpoints: Endpoints::default(),
        })
        .unwrap();
        App::from_parts(
            Config::default(),
            dir.join("config.json"),
            Session::new(dir.to_path_buf()),
            AuthFlow::new(api, mode),
        )
    }

    #[test]
    fn test_typing_into_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = login_app(dir.path(), AuthMode::Cookie);

        handle_input(&mut app, key(KeyCode::Tab));
        assert_eq!(app.login_focus, LoginFocus::Username);
        for c in "a@b.c".chars() {
            handle_input(&mut app, key(KeyCode::Char(c)));
        }
        handle_input(&mut app, key(KeyCode::Enter));
        assert_eq!(app.login_focus, LoginFocus::Password);
        // '1' and 'q' are text here, not navigation
        handle_input(&mut app, key(KeyCode::Char('q')));
        handle_input(&mut app, key(KeyCode::Char('1')));
        handle_input(&mut app, key(KeyCode::Backspace));

        assert_eq!(app.login_username, "a@b.c");
        assert_eq!(app.login_password, "q");
        assert_eq!(app.page, Route::Login);
        assert_eq!(app.state, AppState::Normal);
    }

    #[test]
    fn test_empty_form_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = login_app(dir.path(), AuthMode::Cookie);
        app.login_username.clear();
        app.login_focus = LoginFocus::Button;

        handle_input(&mut app, key(KeyCode::Enter));
        assert_eq!(app.login_error.as_deref(), Some("Username and password required"));
        assert!(!app.login_busy);
    }

    #[test]
    fn test_bearer_mode_has_no_form() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = login_app(dir.path(), AuthMode::Bearer);
        handle_input(&mut app, key(KeyCode::Tab));
        assert_eq!(app.login_focus, LoginFocus::Google);
    }

    #[test]
    fn test_quit_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = login_app(dir.path(), AuthMode::Bearer);

        assert!(!handle_input(&mut app, key(KeyCode::Char('q'))));
        assert_eq!(app.state, AppState::ConfirmingQuit);
        assert!(!handle_input(&mut app, key(KeyCode::Char('n'))));
        assert_eq!(app.state, AppState::Normal);

        handle_input(&mut app, key(KeyCode::Char('q')));
        assert!(handle_input(&mut app, key(KeyCode::Char('y'))));
        assert_eq!(app.state, AppState::Quitting);
    }
}
