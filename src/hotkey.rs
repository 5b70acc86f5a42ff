use std::str::FromStr;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use eframe::egui;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState, hotkey::HotKey};

use crate::models::AppMessage;

pub struct HotKeyRegistration {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
}

impl Drop for HotKeyRegistration {
    fn drop(&mut self) {
        let _ = self.manager.unregister(self.hotkey);
    }
}

/// Registers `combo` (e.g. `super+Space`) and forwards each press as
/// [`AppMessage::ToggleMenu`]. Returns no registration if the hotkey cannot
/// be set up; the receiver then never yields.
pub fn setup_hotkey_listener(
    ctx: &egui::Context,
    combo: &str,
) -> (Receiver<AppMessage>, Option<HotKeyRegistration>) {
    let (tx, rx) = mpsc::channel();

    let manager = match GlobalHotKeyManager::new() {
        Ok(manager) => manager,
        Err(err) => {
            log::error!("global hotkey manager init failed: {err}");
            return (rx, None);
        }
    };

    let hotkey = match HotKey::from_str(combo) {
        Ok(hotkey) => hotkey,
        Err(err) => {
            log::error!("invalid hotkey '{combo}': {err}");
            return (rx, None);
        }
    };

    if let Err(err) = manager.register(hotkey) {
        log::error!("registering global hotkey '{combo}' failed: {err}, it may already be in use");
        return (rx, None);
    }
    log::info!("toggling the menu with {combo}");

    let hotkey_id = hotkey.id();
    let ctx = ctx.clone();
    thread::spawn(move || {
        let events = GlobalHotKeyEvent::receiver();
        let mut key_is_down = false;
        while let Ok(event) = events.recv() {
            if event.id != hotkey_id {
                continue;
            }

            match event.state {
                HotKeyState::Pressed => {
                    // Ignore key repeat while the shortcut is held down.
                    if key_is_down {
                        continue;
                    }
                    key_is_down = true;
                    if tx.send(AppMessage::ToggleMenu).is_err() {
                        break;
                    }
                    ctx.request_repaint();
                }
                HotKeyState::Released => key_is_down = false,
            }
        }
    });

    (rx, Some(HotKeyRegistration { manager, hotkey }))
}
