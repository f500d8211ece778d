use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use speedprobe::speedtest::{SpeedTest, TestStatus};
use std::time::Duration;

pub struct App {
    pub engine: SpeedTest,
    pub should_quit: bool,
}

impl App {
    pub fn new(engine: SpeedTest) -> Self {
        Self {
            engine,
            should_quit: false,
        }
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if self.engine.status() == TestStatus::Testing {
                    None
                } else {
                    Some(AppAction::StartTest)
                }
            }
            KeyCode::Char('r') | KeyCode::Esc => Some(AppAction::Reset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    StartTest,
    Reset,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
