//! XDG menu loading: `.menu` parsing, desktop-file matching and layout.

pub mod parse;
pub mod pool;
pub mod resolve;
pub mod rules;

use crate::config::Config;
use crate::error::MenuError;
use crate::models::Menu;

pub use parse::{MenuDef, parse_menu_file};
pub use pool::EntryPool;
pub use resolve::{ResolveOptions, resolve};

/// Locates, parses and resolves the menu selected by `config`.
pub fn load_menu(config: &Config) -> Result<Menu, MenuError> {
    let path = config.resolve_menu_file()?;
    log::info!("loading menu from {}", path.display());

    let def = parse_menu_file(&path, config)?;
    let mut pool = EntryPool::new(config.locale.clone());
    let options = ResolveOptions {
        show_empty: config.show_empty,
        include_nodisplay: config.include_nodisplay,
        desktops: config.desktops.clone(),
    };
    let menu = resolve(def, &mut pool, &options);
    log::debug!("resolved {} entries", menu.entry_count());
    Ok(menu)
}
