use educe::Educe;
use ratatui::widgets::TableState;

use crate::sync::{delta::DeltaSync, model::ScanMode, projection::ProjectionState};

#[derive(Educe)]
#[educe(Default)]
pub struct HomeState {
    pub projection: ProjectionState,
    /// Set once the sync handler reports an attachment.
    pub engine: Option<DeltaSync>,
    pub generation: u64,

    pub mode: ScanMode,
    pub dish_idx: usize,
    pub input: String,
    #[educe(Default(expression = true))]
    pub input_enabled: bool,
    pub table: TableState,
}

impl HomeState {
    pub fn selected_dish<'a>(&self, dishes: &'a [String]) -> Option<&'a String> {
        dishes.get(self.dish_idx)
    }

    pub fn cycle_dish(&mut self, dishes: &[String], forward: bool) {
        if dishes.is_empty() {
            return;
        }
        let len = dishes.len();
        self.dish_idx = if forward {
            (self.dish_idx + 1) % len
        } else {
            (self.dish_idx + len - 1) % len
        };
    }
}
