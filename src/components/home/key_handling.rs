use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::{Home, action::{self, HomeAction}};
use crate::action::Action;

pub fn handle(home: &mut Home, key: KeyEvent) -> Result<Option<Action>> {
    if key.kind != KeyEventKind::Press {
        return Ok(None);
    }
    action::perform(home, map_key(key))
}

fn map_key(key: KeyEvent) -> HomeAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('e') if ctrl => HomeAction::Export,
        KeyCode::Char('r') if ctrl => HomeAction::Reattach,
        KeyCode::Char(_) if ctrl => HomeAction::None,
        KeyCode::Char(c) => HomeAction::Type(c),
        KeyCode::Backspace => HomeAction::Backspace,
        KeyCode::Enter => HomeAction::Submit,
        KeyCode::Tab | KeyCode::BackTab => HomeAction::ToggleMode,
        KeyCode::Left => HomeAction::CycleDish { forward: false },
        KeyCode::Right => HomeAction::CycleDish { forward: true },
        _ => HomeAction::None,
    }
}
