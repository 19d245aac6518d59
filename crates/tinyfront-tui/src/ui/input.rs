//! Keyboard input handling for the TUI.
//!
//! This module handles key and paste events and translates them into
//! application state changes.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use tinyfront_core::api::Endpoint;

use crate::app::{App, AppState};

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.state {
        AppState::AwaitingRedirect => {
            handle_redirect_input(app, key).await;
            Ok(false)
        }
        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.state = AppState::Normal;
            }
            Ok(false)
        }
        AppState::ConfirmingQuit => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
                Ok(true)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Normal;
                Ok(false)
            }
            _ => Ok(false),
        },
        AppState::Quitting => Ok(true),
        AppState::Normal => {
            handle_normal_input(app, key).await;
            Ok(false)
        }
    }
}

async fn handle_normal_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('h') => app.fetch(Endpoint::Health),
        KeyCode::Char('u') => app.fetch(Endpoint::User),
        KeyCode::Char('a') => app.fetch(Endpoint::Admin),
        KeyCode::Char('l') => app.login().await,
        KeyCode::Char('x') => {
            if app.is_authenticated() {
                app.clear_session().await;
            }
        }
        KeyCode::Esc => app.status_message = None,
        _ => {}
    }
}

async fn handle_redirect_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_redirect().await,
        KeyCode::Enter => app.submit_callback().await,
        KeyCode::Backspace => {
            app.callback_input.pop();
        }
        KeyCode::Char(c) => app.push_callback_char(c),
        _ => {}
    }
}

/// Handle pasted text (bracketed paste). Only the callback field takes it.
pub fn handle_paste(app: &mut App, text: &str) {
    if app.state != AppState::AwaitingRedirect {
        return;
    }
    for c in text.trim().chars() {
        app.push_callback_char(c);
    }
}
