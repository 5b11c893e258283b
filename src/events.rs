use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};
use std::time::Duration;

use crate::actions::ActionCommand;

/// Terminal input the dashboard reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    /// Left button press at a terminal cell.
    Click { column: u16, row: u16 },
    Resize,
}

impl InputEvent {
    /// Check if this is a quit key (q, Esc or Ctrl-C)
    pub fn is_quit_key(&self) -> bool {
        match self {
            InputEvent::Key(key) => {
                key.code == KeyCode::Char('q')
                    || key.code == KeyCode::Esc
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
            }
            _ => false,
        }
    }
}

/// What the main loop should do after an input was applied to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Nothing changed, keep waiting.
    Continue,
    Redraw,
    Quit,
    /// Run an external command, then redraw.
    Run(ActionCommand),
}

/// Block for at most `timeout` (forever when `None`) waiting for relevant input.
///
/// Returns `Ok(None)` when the timeout elapsed or the event is not one the
/// dashboard handles.
pub fn wait_for_input(timeout: Option<Duration>) -> Result<Option<InputEvent>> {
    if let Some(timeout) = timeout {
        if !event::poll(timeout)? {
            return Ok(None);
        }
    }
    Ok(translate(event::read()?))
}

pub fn translate(event: Event) -> Option<InputEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(InputEvent::Key(key)),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => Some(InputEvent::Click {
                column: mouse.column,
                row: mouse.row,
            }),
            _ => None,
        },
        Event::Resize(_, _) => Some(InputEvent::Resize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventState, MouseEvent};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> InputEvent {
        InputEvent::Key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn test_quit_keys() {
        assert!(key(KeyCode::Char('q'), KeyModifiers::NONE).is_quit_key());
        assert!(key(KeyCode::Esc, KeyModifiers::NONE).is_quit_key());
        assert!(key(KeyCode::Char('c'), KeyModifiers::CONTROL).is_quit_key());
        assert!(!key(KeyCode::Char('c'), KeyModifiers::NONE).is_quit_key());
        assert!(!InputEvent::Resize.is_quit_key());
    }

    #[test]
    fn test_translate_filters_events() {
        let release = KeyEvent {
            code: KeyCode::Char('p'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(translate(Event::Key(release)), None);
        assert_eq!(translate(Event::Resize(80, 24)), Some(InputEvent::Resize));

        let click = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 12,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(
            translate(Event::Mouse(click)),
            Some(InputEvent::Click { column: 12, row: 0 })
        );

        let scroll = MouseEvent {
            kind: MouseEventKind::ScrollDown,
            ..click
        };
        assert_eq!(translate(Event::Mouse(scroll)), None);
    }
}
