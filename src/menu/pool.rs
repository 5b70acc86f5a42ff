//! Desktop and directory files available to the menus.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use freedesktop_desktop_entry::DesktopEntry;

use crate::models::{AppEntry, DirectoryInfo};

/// Scanned `AppDir` contents, read once per directory and shared by every
/// menu that names the directory.
#[derive(Debug, Default)]
pub struct EntryPool {
    locale: Option<String>,
    scanned: HashMap<PathBuf, Vec<AppEntry>>,
    directories: HashMap<PathBuf, Option<DirectoryInfo>>,
}

impl EntryPool {
    pub fn new(locale: Option<String>) -> Self {
        Self {
            locale,
            ..Default::default()
        }
    }

    /// All entries of the given `AppDir`s keyed by desktop-file ID. Later
    /// directories override earlier ones.
    pub fn entries_for(&mut self, app_dirs: &[PathBuf]) -> BTreeMap<String, AppEntry> {
        let mut pool = BTreeMap::new();
        for dir in app_dirs {
            for entry in self.scan(dir) {
                pool.insert(entry.id.clone(), entry.clone());
            }
        }
        pool
    }

    fn scan(&mut self, dir: &Path) -> &[AppEntry] {
        let locale = self.locale.as_deref();
        self.scanned
            .entry(dir.to_path_buf())
            .or_insert_with(|| scan_app_dir(dir, locale))
    }

    /// The `.directory` file for a menu: later `<Directory>` names and later
    /// directory dirs take priority.
    pub fn directory(&mut self, directory_dirs: &[PathBuf], names: &[String]) -> Option<DirectoryInfo> {
        for name in names.iter().rev() {
            for dir in directory_dirs.iter().rev() {
                let path = dir.join(name);
                if !path.is_file() {
                    continue;
                }
                let locale = self.locale.as_deref();
                let info = self
                    .directories
                    .entry(path.clone())
                    .or_insert_with(|| read_directory_info(&path, locale));
                if let Some(info) = info {
                    return Some(info.clone());
                }
            }
        }
        None
    }
}

fn scan_app_dir(dir: &Path, locale: Option<&str>) -> Vec<AppEntry> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    collect_desktop_files(dir, dir, &mut visited, &mut files);
    files.sort();

    files
        .into_iter()
        .filter_map(|(id, path)| read_app_entry(&path, id, locale))
        .collect()
}

/// Walks `dir` recursively. Symlinked directories are followed, but each
/// real directory is entered only once.
fn collect_desktop_files(
    root: &Path,
    dir: &Path,
    visited: &mut HashSet<PathBuf>,
    out: &mut Vec<(String, PathBuf)>,
) {
    let real = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !visited.insert(real) {
        log::debug!("skipping {}: directory already scanned", dir.display());
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect_desktop_files(root, &path, visited, out);
        } else if path.extension().is_some_and(|ext| ext == "desktop") {
            if let Some(id) = desktop_file_id(root, &path) {
                out.push((id, path));
            }
        }
    }
}

/// `<root>/kde/konsole.desktop` has the ID `kde-konsole.desktop`.
pub fn desktop_file_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("-"))
}

pub fn read_app_entry(path: &Path, id: String, locale: Option<&str>) -> Option<AppEntry> {
    let input = match fs::read_to_string(path) {
        Ok(input) => input,
        Err(err) => {
            log::warn!("skipping {}: {err}", path.display());
            return None;
        }
    };
    let de = match DesktopEntry::decode(path, &input) {
        Ok(de) => de,
        Err(err) => {
            log::warn!("skipping {}: {err}", path.display());
            return None;
        }
    };

    if de.type_() != Some("Application") {
        log::debug!("skipping {}: not an application", path.display());
        return None;
    }
    let Some(name) = de.name(locale) else {
        log::warn!("skipping {}: no Name key", path.display());
        return None;
    };

    Some(AppEntry {
        id,
        path: path.to_path_buf(),
        name: name.into_owned(),
        generic_name: de.generic_name(locale).map(|s| s.into_owned()),
        comment: de.comment(locale).map(|s| s.into_owned()),
        icon: non_empty(de.icon()),
        exec: non_empty(de.exec()),
        try_exec: non_empty(de.desktop_entry("TryExec")),
        working_dir: non_empty(de.desktop_entry("Path")),
        terminal: de.terminal(),
        categories: split_list(de.categories()),
        no_display: de.no_display(),
        hidden: de.desktop_entry("Hidden").is_some_and(|value| value.trim() == "true"),
        only_show_in: split_list(de.desktop_entry("OnlyShowIn")),
        not_show_in: split_list(de.desktop_entry("NotShowIn")),
    })
}

fn read_directory_info(path: &Path, locale: Option<&str>) -> Option<DirectoryInfo> {
    let input = fs::read_to_string(path)
        .map_err(|err| log::warn!("skipping {}: {err}", path.display()))
        .ok()?;
    let de = DesktopEntry::decode(path, &input)
        .map_err(|err| log::warn!("skipping {}: {err}", path.display()))
        .ok()?;

    Some(DirectoryInfo {
        name: de.name(locale).map(|s| s.into_owned()),
        comment: de.comment(locale).map(|s| s.into_owned()),
        icon: non_empty(de.icon()),
        no_display: de.no_display(),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Splits a `;`-separated list value such as `Categories`.
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(';')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
