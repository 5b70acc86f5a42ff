use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::Args;
use crate::error::MenuError;

pub const DEFAULT_ICON_SIZE: u16 = 24;
const MENU_BASENAME: &str = "applications.menu";
const FALLBACK_MENU_FILE: &str = "/etc/xdg/menus/applications.menu";

/// Runtime configuration assembled from the command line and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub menu_file: Option<PathBuf>,
    pub menu_prefix: String,
    /// XDG config directories, highest priority first.
    pub config_dirs: Vec<PathBuf>,
    /// XDG data directories, highest priority first.
    pub data_dirs: Vec<PathBuf>,
    pub locale: Option<String>,
    pub desktops: Vec<String>,
    pub icon_size: u16,
    pub icon_theme: Option<String>,
    pub show_empty: bool,
    pub include_nodisplay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            menu_file: None,
            menu_prefix: String::new(),
            config_dirs: Vec::new(),
            data_dirs: Vec::new(),
            locale: None,
            desktops: Vec::new(),
            icon_size: DEFAULT_ICON_SIZE,
            icon_theme: None,
            show_empty: false,
            include_nodisplay: false,
        }
    }
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let dirs = xdg::BaseDirectories::new().context("cannot determine XDG base directories")?;

        let mut config_dirs = vec![dirs.get_config_home()];
        config_dirs.extend(dirs.get_config_dirs());
        let mut data_dirs = vec![dirs.get_data_home()];
        data_dirs.extend(dirs.get_data_dirs());

        let menu_file = args
            .file
            .as_deref()
            .map(|file| PathBuf::from(shellexpand::tilde(file).as_ref()));
        let menu_prefix = match &args.prefix {
            Some(prefix) => prefix.clone(),
            None => env::var("XDG_MENU_PREFIX").unwrap_or_default(),
        };

        Ok(Self {
            menu_file,
            menu_prefix,
            config_dirs,
            data_dirs,
            locale: locale_from_env(),
            desktops: parse_desktops(&env::var("XDG_CURRENT_DESKTOP").unwrap_or_default()),
            icon_size: args.icon_size,
            icon_theme: args.icon_theme.clone(),
            show_empty: args.show_empty,
            include_nodisplay: args.include_nodisplay,
        })
    }

    /// Locates the menu definition file to load.
    pub fn resolve_menu_file(&self) -> Result<PathBuf, MenuError> {
        if let Some(file) = &self.menu_file {
            return if file.is_file() {
                Ok(file.clone())
            } else {
                Err(MenuError::NotFound(file.display().to_string()))
            };
        }

        let relative = format!("menus/{}{MENU_BASENAME}", self.menu_prefix);
        if let Some(found) = find_in_dirs(&self.config_dirs, &relative) {
            return Ok(found);
        }

        let fallback = Path::new(FALLBACK_MENU_FILE);
        if fallback.is_file() {
            log::debug!("no {relative} in XDG config dirs, using {FALLBACK_MENU_FILE}");
            return Ok(fallback.to_path_buf());
        }

        Err(MenuError::NotFound(relative))
    }

    /// `<dir>/<sub>` for every data dir, lowest priority first, as the
    /// `Default*Dirs` elements expect.
    pub fn default_data_subdirs(&self, sub: &str) -> Vec<PathBuf> {
        self.data_dirs.iter().rev().map(|dir| dir.join(sub)).collect()
    }

    /// `<dir>/menus/<prefix>applications-merged` for every config dir,
    /// lowest priority first.
    pub fn default_merge_dirs(&self) -> Vec<PathBuf> {
        let name = format!("menus/{}applications-merged", self.menu_prefix);
        self.config_dirs.iter().rev().map(|dir| dir.join(&name)).collect()
    }
}

fn find_in_dirs(dirs: &[PathBuf], relative: &str) -> Option<PathBuf> {
    dirs.iter().map(|dir| dir.join(relative)).find(|path| path.is_file())
}

/// Locale for localized keys, e.g. `de_DE` from `LANG=de_DE.UTF-8`.
fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| normalize_locale(&value))
}

fn normalize_locale(value: &str) -> Option<String> {
    let locale = value.split_once('.').map_or(value, |(locale, _)| locale);
    let locale = locale.split_once('@').map_or(locale, |(locale, _)| locale);
    match locale {
        "" | "C" | "POSIX" => None,
        locale => Some(locale.to_string()),
    }
}

pub fn parse_desktops(value: &str) -> Vec<String> {
    value
        .split(':')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculoos::prelude::*;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    #[test]
    fn strips_encoding_and_modifier_from_locale() {
        assert_that!(normalize_locale("de_DE.UTF-8")).is_equal_to(Some("de_DE".to_string()));
        assert_that!(normalize_locale("sr_RS@latin")).is_equal_to(Some("sr_RS".to_string()));
        assert_that!(normalize_locale("C.UTF-8")).is_none();
        assert_that!(normalize_locale("POSIX")).is_none();
    }

    #[test]
    fn splits_current_desktop_list() {
        assert_that!(parse_desktops("ubuntu:GNOME")).is_equal_to(vec![
            "ubuntu".to_string(),
            "GNOME".to_string(),
        ]);
        assert_that!(parse_desktops("")).is_empty();
    }

    #[test]
    fn finds_prefixed_menu_in_config_dirs() {
        let config = Config {
            menu_prefix: "test-".to_string(),
            config_dirs: vec![PathBuf::from("/nonexistent"), fixtures().join("config")],
            ..Default::default()
        };

        assert_that!(config.resolve_menu_file())
            .is_ok()
            .is_equal_to(fixtures().join("config/menus/test-applications.menu"));
    }

    #[test]
    fn explicit_menu_file_must_exist() {
        let config = Config {
            menu_file: Some(fixtures().join("config/menus/missing.menu")),
            ..Default::default()
        };

        assert_that!(config.resolve_menu_file())
            .is_err()
            .matches(|err| matches!(err, MenuError::NotFound(_)));
    }

    #[test]
    fn default_dirs_are_listed_lowest_priority_first() {
        let config = Config {
            data_dirs: vec![PathBuf::from("/home/u/.local/share"), PathBuf::from("/usr/share")],
            ..Default::default()
        };

        assert_that!(config.default_data_subdirs("applications")).is_equal_to(vec![
            PathBuf::from("/usr/share/applications"),
            PathBuf::from("/home/u/.local/share/applications"),
        ]);
    }
}
