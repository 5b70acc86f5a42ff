//! A stand-alone XDG application menu popup.
//!
//! [`menu::load_menu`] turns an `applications.menu` definition into a
//! [`models::Menu`] tree; [`app::MenuPopup`] shows it and launches the
//! selected entry.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod hotkey;
pub mod icons;
pub mod launch;
pub mod menu;
pub mod models;
pub mod nav;
