//! Keyboard and mouse events to dashboard actions.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};

use crate::highlight::Control;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Control(Control),
    Reconnect,
    Quit,
}

pub fn action_for_key(key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            _ => None,
        };
    }
    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('p') | KeyCode::Char(' ') => Action::Control(Control::PlayPause),
        KeyCode::Char('n') | KeyCode::Right => Action::Control(Control::Next),
        KeyCode::Char('b') | KeyCode::Left => Action::Control(Control::Previous),
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => Action::Control(Control::VolumeUp),
        KeyCode::Char('-') | KeyCode::Down => Action::Control(Control::VolumeDown),
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Reconnect,
        _ => return None,
    };
    Some(action)
}

/// Left-button presses on a drawn button.
pub fn action_for_mouse(mouse: MouseEvent, boxes: &[(Control, Rect)]) -> Option<Action> {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => action_for_click(mouse.column, mouse.row, boxes),
        _ => None,
    }
}

pub fn action_for_click(column: u16, row: u16, boxes: &[(Control, Rect)]) -> Option<Action> {
    let at = Position::new(column, row);
    boxes
        .iter()
        .find(|(_, area)| area.contains(at))
        .map(|(control, _)| Action::Control(*control))
}
