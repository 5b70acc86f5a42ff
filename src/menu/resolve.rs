//! Turns a parsed [`MenuDef`] into the [`Menu`] tree that gets displayed.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use crate::menu::parse::{LayoutItem, MenuDef, MergeKind, RuleOp};
use crate::menu::pool::EntryPool;
use crate::models::{AppEntry, DirectoryInfo, Menu, MenuItem};

static DEFAULT_LAYOUT: [LayoutItem; 2] = [
    LayoutItem::Merge(MergeKind::Menus),
    LayoutItem::Merge(MergeKind::Files),
];

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub show_empty: bool,
    pub include_nodisplay: bool,
    /// Entries of `$XDG_CURRENT_DESKTOP`.
    pub desktops: Vec<String>,
}

/// A menu between matching and layout.
struct Pending {
    name: String,
    directory: Option<DirectoryInfo>,
    app_dirs: Vec<PathBuf>,
    rules: Vec<RuleOp>,
    only_unallocated: bool,
    deleted: bool,
    layout: Option<Vec<LayoutItem>>,
    entries: BTreeMap<String, AppEntry>,
    children: Vec<Pending>,
}

struct Inherited<'a> {
    app_dirs: &'a [PathBuf],
    directory_dirs: &'a [PathBuf],
    default_layout: Option<&'a [LayoutItem]>,
}

pub fn resolve(mut def: MenuDef, pool: &mut EntryPool, options: &ResolveOptions) -> Menu {
    fold_duplicates(&mut def);

    let root_scope = Inherited {
        app_dirs: &[],
        directory_dirs: &[],
        default_layout: None,
    };
    let mut root = prepare(def, &root_scope, pool);

    let mut allocated = HashSet::new();
    match_entries(&mut root, false, pool, &mut allocated);
    match_entries(&mut root, true, pool, &mut allocated);

    let name = root.name.clone();
    finish(root, options, true).unwrap_or_else(|| Menu::new(name))
}

/// Merges sibling submenus that share a `<Name>`, keeping the position of
/// the first one.
fn fold_duplicates(def: &mut MenuDef) {
    let mut folded: Vec<MenuDef> = Vec::with_capacity(def.submenus.len());
    for submenu in std::mem::take(&mut def.submenus) {
        match folded.iter_mut().find(|m| m.name == submenu.name) {
            Some(existing) => absorb(existing, submenu),
            None => folded.push(submenu),
        }
    }
    for submenu in &mut folded {
        fold_duplicates(submenu);
    }
    def.submenus = folded;
}

fn absorb(into: &mut MenuDef, later: MenuDef) {
    into.directories.extend(later.directories);
    into.app_dirs.extend(later.app_dirs);
    into.directory_dirs.extend(later.directory_dirs);
    into.rules.extend(later.rules);
    into.only_unallocated = later.only_unallocated.or(into.only_unallocated);
    into.deleted = later.deleted.or(into.deleted);
    if later.layout.is_some() {
        into.layout = later.layout;
    }
    if later.default_layout.is_some() {
        into.default_layout = later.default_layout;
    }
    into.submenus.extend(later.submenus);
}

fn prepare(def: MenuDef, scope: &Inherited<'_>, pool: &mut EntryPool) -> Pending {
    let mut app_dirs = scope.app_dirs.to_vec();
    app_dirs.extend(def.app_dirs);
    let mut directory_dirs = scope.directory_dirs.to_vec();
    directory_dirs.extend(def.directory_dirs);
    let default_layout = def.default_layout.as_deref().or(scope.default_layout);

    let directory = pool.directory(&directory_dirs, &def.directories);
    let layout = def
        .layout
        .clone()
        .or_else(|| default_layout.map(<[LayoutItem]>::to_vec));

    let child_scope = Inherited {
        app_dirs: &app_dirs,
        directory_dirs: &directory_dirs,
        default_layout,
    };
    let children = def
        .submenus
        .into_iter()
        .map(|submenu| prepare(submenu, &child_scope, pool))
        .collect();

    Pending {
        name: def.name,
        directory,
        app_dirs,
        rules: def.rules,
        only_unallocated: def.only_unallocated.unwrap_or(false),
        deleted: def.deleted.unwrap_or(false),
        layout,
        entries: BTreeMap::new(),
        children,
    }
}

/// First pass (`unallocated_pass == false`) fills ordinary menus and records
/// every entry it places; the second pass fills `<OnlyUnallocated>` menus
/// from what is left.
fn match_entries(
    menu: &mut Pending,
    unallocated_pass: bool,
    pool: &mut EntryPool,
    allocated: &mut HashSet<String>,
) {
    if menu.deleted {
        return;
    }

    if menu.only_unallocated == unallocated_pass {
        let candidates = pool.entries_for(&menu.app_dirs);
        for rule in &menu.rules {
            match rule {
                RuleOp::Include(rule) => {
                    let matched = candidates.iter().filter(|(id, entry)| {
                        !(unallocated_pass && allocated.contains(id.as_str())) && rule.matches(entry)
                    });
                    for (id, entry) in matched {
                        menu.entries.insert(id.clone(), entry.clone());
                    }
                }
                RuleOp::Exclude(rule) => menu.entries.retain(|_, entry| !rule.matches(entry)),
            }
        }
        if !unallocated_pass {
            allocated.extend(menu.entries.keys().cloned());
        }
    }

    for child in &mut menu.children {
        match_entries(child, unallocated_pass, pool, allocated);
    }
}

fn finish(pending: Pending, options: &ResolveOptions, is_root: bool) -> Option<Menu> {
    if pending.deleted {
        return None;
    }
    let directory = pending.directory.unwrap_or_default();
    if directory.no_display && !is_root {
        return None;
    }

    let submenus: Vec<Menu> = pending
        .children
        .into_iter()
        .filter_map(|child| finish(child, options, false))
        .collect();
    let entries: Vec<AppEntry> = pending
        .entries
        .into_values()
        .filter(|entry| is_visible(entry, options))
        .collect();

    let layout = pending.layout.as_deref().unwrap_or(&DEFAULT_LAYOUT);
    let menu = Menu {
        display_name: directory.name.unwrap_or_else(|| pending.name.clone()),
        name: pending.name,
        icon: directory.icon,
        comment: directory.comment,
        items: collapse_separators(apply_layout(submenus, entries, layout)),
    };

    if menu.is_empty() && !options.show_empty && !is_root {
        return None;
    }
    Some(menu)
}

fn is_visible(entry: &AppEntry, options: &ResolveOptions) -> bool {
    if entry.hidden || (entry.no_display && !options.include_nodisplay) {
        return false;
    }
    if !entry.shown_in(&options.desktops) {
        return false;
    }
    match &entry.try_exec {
        Some(program) if !program_exists(program) => {
            log::debug!("hiding {}: TryExec {program} not found", entry.id);
            false
        }
        _ => true,
    }
}

fn program_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.is_absolute() {
        return path.is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

fn sort_key(label: &str) -> String {
    label.to_lowercase()
}

pub fn apply_layout(
    mut menus: Vec<Menu>,
    mut entries: Vec<AppEntry>,
    layout: &[LayoutItem],
) -> Vec<MenuItem> {
    menus.sort_by_cached_key(|menu| sort_key(&menu.display_name));
    entries.sort_by_cached_key(|entry| sort_key(&entry.name));

    let named_menus: HashSet<&str> = layout
        .iter()
        .filter_map(|item| match item {
            LayoutItem::Menuname(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    let named_files: HashSet<&str> = layout
        .iter()
        .filter_map(|item| match item {
            LayoutItem::Filename(id) => Some(id.as_str()),
            _ => None,
        })
        .collect();

    let mut items = Vec::with_capacity(menus.len() + entries.len());
    for item in layout {
        match item {
            LayoutItem::Menuname(name) => {
                if let Some(pos) = menus.iter().position(|m| &m.name == name) {
                    items.push(MenuItem::Submenu(menus.remove(pos)));
                }
            }
            LayoutItem::Filename(id) => {
                if let Some(pos) = entries.iter().position(|e| &e.id == id) {
                    items.push(MenuItem::Entry(entries.remove(pos)));
                }
            }
            LayoutItem::Separator => items.push(MenuItem::Separator),
            LayoutItem::Merge(MergeKind::Menus) => {
                let merged;
                (merged, menus) = menus
                    .into_iter()
                    .partition(|m| !named_menus.contains(m.name.as_str()));
                items.extend(merged.into_iter().map(MenuItem::Submenu));
            }
            LayoutItem::Merge(MergeKind::Files) => {
                let merged;
                (merged, entries) = entries
                    .into_iter()
                    .partition(|e| !named_files.contains(e.id.as_str()));
                items.extend(merged.into_iter().map(MenuItem::Entry));
            }
            LayoutItem::Merge(MergeKind::All) => {
                let merged_menus: Vec<Menu>;
                let merged_entries: Vec<AppEntry>;
                (merged_menus, menus) = menus
                    .into_iter()
                    .partition(|m| !named_menus.contains(m.name.as_str()));
                (merged_entries, entries) = entries
                    .into_iter()
                    .partition(|e| !named_files.contains(e.id.as_str()));
                let mut merged: Vec<MenuItem> = merged_menus
                    .into_iter()
                    .map(MenuItem::Submenu)
                    .chain(merged_entries.into_iter().map(MenuItem::Entry))
                    .collect();
                merged.sort_by_cached_key(|item| sort_key(item.label()));
                items.extend(merged);
            }
        }
    }
    items
}

/// Drops leading, trailing and repeated separators.
fn collapse_separators(items: Vec<MenuItem>) -> Vec<MenuItem> {
    let mut out: Vec<MenuItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.is_separator() && out.last().is_none_or(MenuItem::is_separator) {
            continue;
        }
        out.push(item);
    }
    if out.last().is_some_and(MenuItem::is_separator) {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::rules::Rule;
    use speculoos::prelude::*;

    fn entry(id: &str, name: &str) -> AppEntry {
        AppEntry {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn labels(items: &[MenuItem]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item {
                MenuItem::Separator => "--".to_string(),
                other => other.label().to_string(),
            })
            .collect()
    }

    #[test]
    fn default_layout_puts_sorted_menus_before_sorted_entries() {
        let items = apply_layout(
            vec![Menu::new("Office"), Menu::new("Games")],
            vec![entry("z.desktop", "zsh"), entry("a.desktop", "Alacritty")],
            &DEFAULT_LAYOUT,
        );

        assert_that!(labels(&items)).is_equal_to(vec![
            "Games".to_string(),
            "Office".to_string(),
            "Alacritty".to_string(),
            "zsh".to_string(),
        ]);
    }

    #[test]
    fn explicit_layout_places_named_nodes_first() {
        let layout = vec![
            LayoutItem::Filename("z.desktop".to_string()),
            LayoutItem::Separator,
            LayoutItem::Merge(MergeKind::All),
        ];
        let items = apply_layout(
            vec![Menu::new("Office")],
            vec![entry("z.desktop", "zsh"), entry("a.desktop", "Alacritty")],
            &layout,
        );

        assert_that!(labels(&items)).is_equal_to(vec![
            "zsh".to_string(),
            "--".to_string(),
            "Alacritty".to_string(),
            "Office".to_string(),
        ]);
    }

    #[test]
    fn merge_skips_nodes_named_later_in_the_layout() {
        let layout = vec![
            LayoutItem::Merge(MergeKind::Files),
            LayoutItem::Separator,
            LayoutItem::Filename("a.desktop".to_string()),
        ];
        let items = apply_layout(
            Vec::new(),
            vec![entry("b.desktop", "Bravo"), entry("a.desktop", "Alpha")],
            &layout,
        );

        assert_that!(labels(&items)).is_equal_to(vec![
            "Bravo".to_string(),
            "--".to_string(),
            "Alpha".to_string(),
        ]);
    }

    #[test]
    fn separators_are_collapsed() {
        let items = collapse_separators(vec![
            MenuItem::Separator,
            MenuItem::Entry(entry("a.desktop", "A")),
            MenuItem::Separator,
            MenuItem::Separator,
            MenuItem::Entry(entry("b.desktop", "B")),
            MenuItem::Separator,
        ]);

        assert_that!(labels(&items)).is_equal_to(vec![
            "A".to_string(),
            "--".to_string(),
            "B".to_string(),
        ]);
    }

    #[test]
    fn duplicate_submenus_are_folded() {
        let mut def = MenuDef {
            name: "Applications".to_string(),
            submenus: vec![
                MenuDef {
                    name: "Office".to_string(),
                    directories: vec!["a.directory".to_string()],
                    ..Default::default()
                },
                MenuDef {
                    name: "Games".to_string(),
                    ..Default::default()
                },
                MenuDef {
                    name: "Office".to_string(),
                    directories: vec!["b.directory".to_string()],
                    deleted: Some(true),
                    rules: vec![RuleOp::Include(Rule::All)],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        fold_duplicates(&mut def);

        assert_that!(def.submenus).has_length(2);
        let office = &def.submenus[0];
        assert_that!(office.name.as_str()).is_equal_to("Office");
        assert_that!(office.directories)
            .is_equal_to(vec!["a.directory".to_string(), "b.directory".to_string()]);
        assert_that!(office.deleted).is_equal_to(Some(true));
        assert_that!(office.rules).has_length(1);
    }

    #[test]
    fn hidden_and_nodisplay_entries_are_filtered() {
        let options = ResolveOptions::default();
        let mut hidden = entry("h.desktop", "Hidden");
        hidden.hidden = true;
        let mut nodisplay = entry("n.desktop", "NoDisplay");
        nodisplay.no_display = true;

        assert_that!(is_visible(&hidden, &options)).is_false();
        assert_that!(is_visible(&nodisplay, &options)).is_false();
        assert_that!(is_visible(&entry("v.desktop", "Visible"), &options)).is_true();

        let include = ResolveOptions {
            include_nodisplay: true,
            ..Default::default()
        };
        assert_that!(is_visible(&nodisplay, &include)).is_true();
    }

    #[test]
    fn missing_try_exec_hides_entry() {
        let mut app = entry("ghost.desktop", "Ghost");
        app.try_exec = Some("/nonexistent/bin/ghost".to_string());

        assert_that!(is_visible(&app, &ResolveOptions::default())).is_false();
    }
}
