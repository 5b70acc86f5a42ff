//! Which menu level is open and which row is selected.

use crate::models::{AppEntry, Menu, MenuItem};

#[derive(Debug)]
pub enum Activation<'a> {
    /// A submenu was entered.
    Opened,
    Launch(&'a AppEntry),
    Nothing,
}

/// Drill-down position in a menu tree. The tree itself is passed to every
/// call so the navigator never holds a borrow of it.
#[derive(Debug, Default)]
pub struct Navigator {
    /// Item indices of the opened submenus, outermost first.
    path: Vec<usize>,
    selected: Option<usize>,
}

impl Navigator {
    pub fn new(root: &Menu) -> Self {
        Self {
            path: Vec::new(),
            selected: first_selectable(&root.items),
        }
    }

    pub fn reset(&mut self, root: &Menu) {
        *self = Self::new(root);
    }

    pub fn current<'a>(&self, root: &'a Menu) -> &'a Menu {
        let mut menu = root;
        for &index in &self.path {
            match menu.items.get(index) {
                Some(MenuItem::Submenu(submenu)) => menu = submenu,
                _ => break,
            }
        }
        menu
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Display names from the root down to the open level.
    pub fn breadcrumb<'a>(&self, root: &'a Menu) -> Vec<&'a str> {
        let mut names = vec![root.display_name.as_str()];
        let mut menu = root;
        for &index in &self.path {
            let Some(MenuItem::Submenu(submenu)) = menu.items.get(index) else {
                break;
            };
            names.push(submenu.display_name.as_str());
            menu = submenu;
        }
        names
    }

    pub fn select(&mut self, root: &Menu, index: usize) {
        let selectable = self
            .current(root)
            .items
            .get(index)
            .is_some_and(|item| !item.is_separator());
        if selectable {
            self.selected = Some(index);
        }
    }

    pub fn move_down(&mut self, root: &Menu) {
        let items = &self.current(root).items;
        let start = self.selected.map_or(0, |index| index + 1);
        if let Some(next) = (start..items.len()).find(|&i| !items[i].is_separator()) {
            self.selected = Some(next);
        }
    }

    pub fn move_up(&mut self, root: &Menu) {
        let items = &self.current(root).items;
        let end = self.selected.unwrap_or(items.len());
        if let Some(previous) = (0..end).rev().find(|&i| !items[i].is_separator()) {
            self.selected = Some(previous);
        }
    }

    pub fn activate<'a>(&mut self, root: &'a Menu) -> Activation<'a> {
        let Some(index) = self.selected else {
            return Activation::Nothing;
        };
        match self.current(root).items.get(index) {
            Some(MenuItem::Submenu(submenu)) => {
                self.path.push(index);
                self.selected = first_selectable(&submenu.items);
                Activation::Opened
            }
            Some(MenuItem::Entry(entry)) => Activation::Launch(entry),
            Some(MenuItem::Separator) | None => Activation::Nothing,
        }
    }

    /// Returns to the parent level with the submenu row selected. False at
    /// the root.
    pub fn back(&mut self) -> bool {
        match self.path.pop() {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }
}

fn first_selectable(items: &[MenuItem]) -> Option<usize> {
    items.iter().position(|item| !item.is_separator())
}
