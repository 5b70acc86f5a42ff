use std::fmt::{self, Write as _};
use std::path::PathBuf;

/// A resolved menu: the node a `<Menu>` element turns into once its
/// entries have been matched, filtered and laid out.
#[derive(Debug, Clone, Default)]
pub struct Menu {
    /// Value of `<Name>`, used for `<Menuname>` layout references.
    pub name: String,
    /// Localized name from the `.directory` file, or `name`.
    pub display_name: String,
    pub icon: Option<String>,
    pub comment: Option<String>,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone)]
pub enum MenuItem {
    Submenu(Menu),
    Entry(AppEntry),
    Separator,
}

/// Owned snapshot of the `[Desktop Entry]` group of a `.desktop` file.
#[derive(Debug, Clone, Default)]
pub struct AppEntry {
    /// Desktop-file ID, e.g. `kde-konsole.desktop`.
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    pub generic_name: Option<String>,
    pub comment: Option<String>,
    pub icon: Option<String>,
    pub exec: Option<String>,
    pub try_exec: Option<String>,
    pub working_dir: Option<String>,
    pub terminal: bool,
    pub categories: Vec<String>,
    pub no_display: bool,
    pub hidden: bool,
    pub only_show_in: Vec<String>,
    pub not_show_in: Vec<String>,
}

/// Display data of a `.directory` file.
#[derive(Debug, Clone, Default)]
pub struct DirectoryInfo {
    pub name: Option<String>,
    pub comment: Option<String>,
    pub icon: Option<String>,
    pub no_display: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum AppMessage {
    ToggleMenu,
}

impl Menu {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.items.iter().any(|item| match item {
            MenuItem::Entry(_) => true,
            MenuItem::Submenu(menu) => !menu.is_empty(),
            MenuItem::Separator => false,
        })
    }

    /// Number of application entries in this menu and all submenus.
    pub fn entry_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                MenuItem::Entry(_) => 1,
                MenuItem::Submenu(menu) => menu.entry_count(),
                MenuItem::Separator => 0,
            })
            .sum()
    }

    pub fn submenu(&self, name: &str) -> Option<&Menu> {
        self.items.iter().find_map(|item| match item {
            MenuItem::Submenu(menu) if menu.name == name => Some(menu),
            _ => None,
        })
    }

    pub fn entry(&self, id: &str) -> Option<&AppEntry> {
        self.items.iter().find_map(|item| match item {
            MenuItem::Entry(entry) if entry.id == id => Some(entry),
            _ => None,
        })
    }

    fn write_tree(&self, out: &mut String, depth: usize) -> fmt::Result {
        for item in &self.items {
            let indent = "  ".repeat(depth);
            match item {
                MenuItem::Submenu(menu) => {
                    writeln!(out, "{indent}{}/", menu.display_name)?;
                    menu.write_tree(out, depth + 1)?;
                }
                MenuItem::Entry(entry) => writeln!(out, "{indent}{} ({})", entry.name, entry.id)?,
                MenuItem::Separator => writeln!(out, "{indent}----")?,
            }
        }
        Ok(())
    }
}

impl MenuItem {
    pub fn label(&self) -> &str {
        match self {
            MenuItem::Submenu(menu) => &menu.display_name,
            MenuItem::Entry(entry) => &entry.name,
            MenuItem::Separator => "",
        }
    }

    pub fn icon(&self) -> Option<&str> {
        match self {
            MenuItem::Submenu(menu) => menu.icon.as_deref(),
            MenuItem::Entry(entry) => entry.icon.as_deref(),
            MenuItem::Separator => None,
        }
    }

    pub fn tooltip(&self) -> Option<&str> {
        match self {
            MenuItem::Submenu(menu) => menu.comment.as_deref(),
            MenuItem::Entry(entry) => entry.comment.as_deref().or(entry.generic_name.as_deref()),
            MenuItem::Separator => None,
        }
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, MenuItem::Separator)
    }
}

impl AppEntry {
    pub fn in_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Whether `OnlyShowIn`/`NotShowIn` allow this entry in one of the
    /// given desktops. An empty desktop list matches only entries without
    /// an `OnlyShowIn` restriction.
    pub fn shown_in(&self, desktops: &[String]) -> bool {
        if desktops.iter().any(|d| self.not_show_in.contains(d)) {
            return false;
        }
        self.only_show_in.is_empty() || desktops.iter().any(|d| self.only_show_in.contains(d))
    }
}

/// Renders the tree as indented text, submenus suffixed with `/`.
impl fmt::Display for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writeln!(out, "{}/", self.display_name)?;
        self.write_tree(&mut out, 1)?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculoos::prelude::*;

    fn entry(id: &str, name: &str) -> AppEntry {
        AppEntry {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn submenus_without_entries_are_empty() {
        let mut root = Menu::new("Applications");
        let mut games = Menu::new("Games");
        games.items.push(MenuItem::Separator);
        root.items.push(MenuItem::Submenu(games));

        assert_that!(root.is_empty()).is_true();
        assert_that!(root.entry_count()).is_equal_to(0usize);
    }

    #[test]
    fn counts_entries_recursively() {
        let mut root = Menu::new("Applications");
        let mut office = Menu::new("Office");
        office.items.push(MenuItem::Entry(entry("writer.desktop", "Writer")));
        root.items.push(MenuItem::Submenu(office));
        root.items.push(MenuItem::Entry(entry("term.desktop", "Terminal")));

        assert_that!(root.is_empty()).is_false();
        assert_that!(root.entry_count()).is_equal_to(2usize);
        assert_that!(root.submenu("Office")).is_some();
        assert_that!(root.entry("term.desktop")).is_some();
    }

    #[test]
    fn only_show_in_requires_a_matching_desktop() {
        let mut app = entry("kcalc.desktop", "KCalc");
        app.only_show_in = vec!["KDE".to_string()];

        assert_that!(app.shown_in(&["KDE".to_string()])).is_true();
        assert_that!(app.shown_in(&["sway".to_string()])).is_false();
        assert_that!(app.shown_in(&[])).is_false();
    }

    #[test]
    fn not_show_in_hides_entry() {
        let mut app = entry("nautilus.desktop", "Files");
        app.not_show_in = vec!["i3".to_string()];

        assert_that!(app.shown_in(&["i3".to_string()])).is_false();
        assert_that!(app.shown_in(&["sway".to_string()])).is_true();
    }

    #[test]
    fn display_renders_indented_tree() {
        let mut root = Menu::new("Applications");
        let mut office = Menu::new("Office");
        office.items.push(MenuItem::Entry(entry("writer.desktop", "Writer")));
        root.items.push(MenuItem::Submenu(office));
        root.items.push(MenuItem::Separator);
        root.items.push(MenuItem::Entry(entry("term.desktop", "Terminal")));

        assert_that!(root.to_string()).is_equal_to(
            "Applications/\n  Office/\n    Writer (writer.desktop)\n  ----\n  Terminal (term.desktop)\n"
                .to_string(),
        );
    }
}
