use clap::Parser;

use crate::config::DEFAULT_ICON_SIZE;

/// A stand-alone XDG application menu, for window managers like i3 and
/// sway that don't have a built-in launcher.
#[derive(Debug, Parser)]
#[command(name = "somenu", version, about)]
pub struct Args {
    /// Menu definition file to load instead of the XDG lookup.
    #[arg(short, long, value_name = "PATH", conflicts_with = "prefix")]
    pub file: Option<String>,

    /// Menu prefix, selecting `<PREFIX>applications.menu` (defaults to
    /// $XDG_MENU_PREFIX).
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Icon size in pixels.
    #[arg(
        long,
        value_name = "PX",
        default_value_t = DEFAULT_ICON_SIZE,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub icon_size: u16,

    /// Icon theme searched before hicolor.
    #[arg(long, value_name = "NAME")]
    pub icon_theme: Option<String>,

    /// Keep menus that end up without any entries.
    #[arg(long)]
    pub show_empty: bool,

    /// Keep entries marked NoDisplay.
    #[arg(long)]
    pub include_nodisplay: bool,

    /// Print the resolved menu tree and exit.
    #[arg(long)]
    pub dump: bool,

    /// Stay resident and toggle the menu with this global hotkey,
    /// e.g. "super+Space".
    #[arg(long, value_name = "COMBO")]
    pub hotkey: Option<String>,
}
