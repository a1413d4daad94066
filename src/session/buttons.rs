//! Touch dispatch: presses become Data Bus writes with an optimistic "changing" picture.
use super::{Session, WriteRequest};
use crate::bus::BusError;
use crate::model::Mode;
use crate::nextion;
use log::{debug, info, warn};
use std::sync::Arc;

impl Session {
    /// Handle a press of button `key` on `page`.
    ///
    /// Presses on a path whose previous write is still outstanding are ignored.
    pub fn press(&mut self, page: u8, key: &str) {
        let model = Arc::clone(&self.model);
        let Some(button) = model.get_page(page).and_then(|p| p.buttons.get(key)) else {
            debug!("[{}] no button {} on page {}", self.label, key, page);
            return;
        };
        if self.state.changing_paths.contains(&button.path) {
            debug!("[{}] {} already changing, ignoring press", self.label, button.path);
            return;
        }

        let current = self.bus.read_current(&button.path);
        let target = button.value.target(current.as_ref());

        if let Some(changing) = &button.changing {
            self.state.changing_paths.insert(button.path.clone());
            let mode = self.state.current_mode.unwrap_or(Mode::Day);
            let picture = changing.picture(mode, &target);
            self.send(nextion::set_pic(&changing.objname, picture));
        }

        info!("[{}] setting {} to {}", self.label, button.path, target);
        self.writes.push(WriteRequest {
            path: button.path.clone(),
            value: target,
        });
    }

    /// A button write finished. Success or failure, the path stops being "changing";
    /// the panel catches up with the next delta for it.
    pub fn complete_write(&mut self, path: &str, result: &Result<(), BusError>) -> bool {
        match result {
            Ok(()) => debug!("[{}] write to {} acknowledged", self.label, path),
            Err(e) => warn!("[{}] write to {} failed: {}", self.label, path, e),
        }
        self.state.changing_paths.remove(path)
    }
}
