use color_eyre::Result;
use crossterm::event::KeyEvent;
use ratatui::{Frame, layout::Rect};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::Component;
use crate::{
    action::{Action, RelevantKey},
    config::Config,
    sync,
    tui::Event,
};

mod action;
mod draw;
mod key_handling;
mod state;
mod sync_handling;

use state::HomeState;

lazy_static::lazy_static! {
    pub static ref PREP_KEYS: Vec<RelevantKey> = vec![
        RelevantKey::new("Enter", "Scan"),
        RelevantKey::new("Tab", "Return mode"),
        RelevantKey::new("←/→", "Dish"),
        RelevantKey::new("^e", "Export"),
        RelevantKey::new("^r", "Reconnect"),
        RelevantKey::new("^c", "Quit"),
    ];
    pub static ref RETURN_KEYS: Vec<RelevantKey> = vec![
        RelevantKey::new("Enter", "Scan"),
        RelevantKey::new("Tab", "Prep mode"),
        RelevantKey::new("^e", "Export"),
        RelevantKey::new("^r", "Reconnect"),
        RelevantKey::new("^c", "Quit"),
    ];
}

#[derive(Default)]
pub struct Home {
    config: Config,
    action_tx: Option<UnboundedSender<Action>>,
    sync_tx: Option<UnboundedSender<sync::Command>>,

    state: HomeState,
    need_status_line_reset: bool,
}

impl Home {
    fn send_sync(&self, command: sync::Command) {
        let Some(tx) = &self.sync_tx else {
            debug!("No sync handler registered, dropping {command:?}");
            return;
        };
        if let Err(err) = tx.send(command) {
            debug!("Unable to send sync command: {err:?}");
        }
    }
}

impl Component for Home {
    fn register_action_handler(&mut self, tx: UnboundedSender<Action>) -> Result<()> {
        self.action_tx = Some(tx);
        Ok(())
    }

    fn register_sync_handler(&mut self, tx: UnboundedSender<sync::Command>) -> Result<()> {
        self.sync_tx = Some(tx);
        Ok(())
    }

    fn register_config_handler(&mut self, config: Config) -> Result<()> {
        self.config = config;
        Ok(())
    }

    fn handle_events(&mut self, event: Option<Event>) -> Result<Option<Action>> {
        match event {
            Some(Event::Key(key)) => self.handle_key_event(key),
            Some(Event::Paste(text)) => action::perform(self, action::HomeAction::Paste(text)),
            _ => Ok(None),
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        key_handling::handle(self, key)
    }

    fn handle_synced(&mut self, event: sync::Event) -> Result<Option<Action>> {
        match sync_handling::handle(self, event) {
            action::HomeAction::None => Ok(None),
            action => action::perform(self, action),
        }
    }

    fn update(&mut self, action: Action) -> Result<Option<Action>> {
        if action == Action::EnableScanInput {
            self.state.input_enabled = true;
        }
        Ok(None)
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect) -> Result<()> {
        draw::draw(self, frame, area)
    }
}
