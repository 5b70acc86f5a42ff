//! Reader for `.menu` files.
//!
//! Produces an unresolved [`MenuDef`] tree. Merge elements are spliced in
//! place while reading, so a `MenuDef` already reflects every merged file in
//! document order; duplicate submenus are folded later during resolution.

use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;

use crate::config::Config;
use crate::error::MenuError;
use crate::menu::rules::Rule;

#[derive(Debug, Clone, Default)]
pub struct MenuDef {
    pub name: String,
    /// `<Directory>` values in document order; later ones take priority.
    pub directories: Vec<String>,
    /// `<AppDir>`s in document order; later ones take priority.
    pub app_dirs: Vec<PathBuf>,
    pub directory_dirs: Vec<PathBuf>,
    pub rules: Vec<RuleOp>,
    pub only_unallocated: Option<bool>,
    pub deleted: Option<bool>,
    pub layout: Option<Vec<LayoutItem>>,
    pub default_layout: Option<Vec<LayoutItem>>,
    pub submenus: Vec<MenuDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOp {
    Include(Rule),
    Exclude(Rule),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutItem {
    Menuname(String),
    Filename(String),
    Separator,
    Merge(MergeKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Menus,
    Files,
    All,
}

type XmlReader<'a> = Reader<&'a [u8]>;

struct Source<'p> {
    path: &'p Path,
    dir: &'p Path,
}

impl Source<'_> {
    fn resolve(&self, value: &str) -> PathBuf {
        let path = Path::new(value);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

struct MenuParser<'c> {
    config: &'c Config,
    visited: HashSet<PathBuf>,
}

/// Parses `path` and every file it merges into a single definition tree.
pub fn parse_menu_file(path: &Path, config: &Config) -> Result<MenuDef, MenuError> {
    let mut parser = MenuParser {
        config,
        visited: HashSet::new(),
    };
    let mut root = MenuDef::default();
    parser.load(path, &mut root, false)?;
    Ok(root)
}

impl MenuParser<'_> {
    fn load(&mut self, path: &Path, into: &mut MenuDef, merging: bool) -> Result<(), MenuError> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.visited.insert(key) {
            log::warn!("{} was already merged, skipping", path.display());
            return Ok(());
        }

        let text = fs::read_to_string(path).map_err(|source| MenuError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = Reader::from_str(&text);
        let source = Source {
            path,
            dir: path.parent().unwrap_or(Path::new("/")),
        };

        loop {
            match next_event(&mut reader, path)? {
                Event::Start(e) if e.name().as_ref() == b"Menu" => {
                    return self.parse_menu(&mut reader, &source, into, merging);
                }
                Event::Start(_) | Event::Empty(_) | Event::Eof => {
                    return Err(MenuError::NoRootMenu(path.to_path_buf()));
                }
                _ => {}
            }
        }
    }

    fn merge_file(&mut self, path: &Path, into: &mut MenuDef) {
        if let Err(err) = self.load(path, into, true) {
            log::warn!("skipping merge of {}: {err}", path.display());
        }
    }

    fn merge_dir(&mut self, dir: &Path, into: &mut MenuDef) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("skipping merge dir {}: {err}", dir.display());
                return;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "menu"))
            .collect();
        files.sort();
        for file in files {
            self.merge_file(&file, into);
        }
    }

    /// The same file relative to a config dir of lower priority than the
    /// one `current` lives in.
    fn parent_menu_file(&self, current: &Path) -> Option<PathBuf> {
        let dirs = &self.config.config_dirs;
        let (index, relative) = dirs.iter().enumerate().find_map(|(index, dir)| {
            current
                .strip_prefix(dir)
                .ok()
                .map(|relative| (index, relative.to_path_buf()))
        })?;
        dirs[index + 1..]
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|path| path.is_file())
    }

    fn parse_menu(
        &mut self,
        reader: &mut XmlReader<'_>,
        source: &Source<'_>,
        menu: &mut MenuDef,
        merging: bool,
    ) -> Result<(), MenuError> {
        let path = source.path;
        loop {
            match next_event(reader, path)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"Name" => {
                        let name = read_text(reader, path, b"Name")?;
                        // the root name of a merged file is ignored
                        if !merging {
                            menu.name = name;
                        }
                    }
                    b"Directory" => menu.directories.push(read_text(reader, path, b"Directory")?),
                    b"AppDir" => {
                        let dir = read_text(reader, path, b"AppDir")?;
                        menu.app_dirs.push(source.resolve(&dir));
                    }
                    b"DirectoryDir" => {
                        let dir = read_text(reader, path, b"DirectoryDir")?;
                        menu.directory_dirs.push(source.resolve(&dir));
                    }
                    b"Include" => {
                        let rules = parse_rules(reader, path, b"Include")?;
                        menu.rules.push(RuleOp::Include(Rule::Or(rules)));
                    }
                    b"Exclude" => {
                        let rules = parse_rules(reader, path, b"Exclude")?;
                        menu.rules.push(RuleOp::Exclude(Rule::Or(rules)));
                    }
                    b"Menu" => {
                        let mut submenu = MenuDef::default();
                        self.parse_menu(reader, source, &mut submenu, false)?;
                        menu.submenus.push(submenu);
                    }
                    b"MergeFile" => {
                        let kind = attribute(&e, b"type", path, reader.buffer_position())?;
                        let target = read_text(reader, path, b"MergeFile")?;
                        if kind.as_deref() == Some("parent") {
                            match self.parent_menu_file(path) {
                                Some(parent) => self.merge_file(&parent, menu),
                                None => log::debug!("no parent menu file for {}", path.display()),
                            }
                        } else {
                            self.merge_file(&source.resolve(&target), menu);
                        }
                    }
                    b"MergeDir" => {
                        let dir = read_text(reader, path, b"MergeDir")?;
                        self.merge_dir(&source.resolve(&dir), menu);
                    }
                    b"Layout" => menu.layout = Some(parse_layout(reader, path, b"Layout")?),
                    b"DefaultLayout" => {
                        menu.default_layout = Some(parse_layout(reader, path, b"DefaultLayout")?)
                    }
                    flag => {
                        let flag = flag.to_vec();
                        self.apply_flag(&flag, menu, path);
                        skip(reader, path, &flag)?;
                    }
                },
                Event::Empty(e) => {
                    let flag = e.name().as_ref().to_vec();
                    self.apply_flag(&flag, menu, path);
                }
                Event::End(e) if e.name().as_ref() == b"Menu" => return Ok(()),
                Event::Eof => return Err(unexpected_eof(path, reader, "Menu")),
                _ => {}
            }
        }
    }

    /// Elements without content, which may appear either as `<X/>` or as an
    /// empty `<X></X>` pair.
    fn apply_flag(&mut self, name: &[u8], menu: &mut MenuDef, path: &Path) {
        match name {
            b"DefaultAppDirs" => menu
                .app_dirs
                .extend(self.config.default_data_subdirs("applications")),
            b"DefaultDirectoryDirs" => menu
                .directory_dirs
                .extend(self.config.default_data_subdirs("desktop-directories")),
            b"DefaultMergeDirs" => {
                for dir in self.config.default_merge_dirs() {
                    self.merge_dir(&dir, menu);
                }
            }
            b"OnlyUnallocated" => menu.only_unallocated = Some(true),
            b"NotOnlyUnallocated" => menu.only_unallocated = Some(false),
            b"Deleted" => menu.deleted = Some(true),
            b"NotDeleted" => menu.deleted = Some(false),
            other => log::debug!(
                "ignoring <{}> in {}",
                String::from_utf8_lossy(other),
                path.display()
            ),
        }
    }
}

fn parse_rules(reader: &mut XmlReader<'_>, path: &Path, end: &[u8]) -> Result<Vec<Rule>, MenuError> {
    let mut rules = Vec::new();
    loop {
        match next_event(reader, path)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Filename" => rules.push(Rule::Filename(read_text(reader, path, b"Filename")?)),
                b"Category" => rules.push(Rule::Category(read_text(reader, path, b"Category")?)),
                b"All" => {
                    rules.push(Rule::All);
                    skip(reader, path, b"All")?;
                }
                b"And" => rules.push(Rule::And(parse_rules(reader, path, b"And")?)),
                b"Or" => rules.push(Rule::Or(parse_rules(reader, path, b"Or")?)),
                b"Not" => rules.push(Rule::Not(parse_rules(reader, path, b"Not")?)),
                other => {
                    let other = other.to_vec();
                    skip(reader, path, &other)?;
                }
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"All" => rules.push(Rule::All),
                b"And" => rules.push(Rule::And(Vec::new())),
                b"Or" => rules.push(Rule::Or(Vec::new())),
                b"Not" => rules.push(Rule::Not(Vec::new())),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == end => return Ok(rules),
            Event::Eof => return Err(unexpected_eof(path, reader, &String::from_utf8_lossy(end))),
            _ => {}
        }
    }
}

fn parse_layout(
    reader: &mut XmlReader<'_>,
    path: &Path,
    end: &[u8],
) -> Result<Vec<LayoutItem>, MenuError> {
    let mut items = Vec::new();
    loop {
        match next_event(reader, path)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Menuname" => items.push(LayoutItem::Menuname(read_text(reader, path, b"Menuname")?)),
                b"Filename" => items.push(LayoutItem::Filename(read_text(reader, path, b"Filename")?)),
                b"Separator" => {
                    items.push(LayoutItem::Separator);
                    skip(reader, path, b"Separator")?;
                }
                b"Merge" => {
                    items.push(LayoutItem::Merge(merge_kind(&e, path, reader)?));
                    skip(reader, path, b"Merge")?;
                }
                other => {
                    let other = other.to_vec();
                    skip(reader, path, &other)?;
                }
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"Separator" => items.push(LayoutItem::Separator),
                b"Merge" => items.push(LayoutItem::Merge(merge_kind(&e, path, reader)?)),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == end => return Ok(items),
            Event::Eof => return Err(unexpected_eof(path, reader, &String::from_utf8_lossy(end))),
            _ => {}
        }
    }
}

fn merge_kind(e: &BytesStart<'_>, path: &Path, reader: &XmlReader<'_>) -> Result<MergeKind, MenuError> {
    let kind = attribute(e, b"type", path, reader.buffer_position())?;
    Ok(match kind.as_deref() {
        Some("menus") => MergeKind::Menus,
        Some("files") => MergeKind::Files,
        _ => MergeKind::All,
    })
}

fn next_event<'a>(reader: &mut XmlReader<'a>, path: &Path) -> Result<Event<'a>, MenuError> {
    reader
        .read_event()
        .map_err(|err| xml_error(path, reader.buffer_position(), err))
}

fn read_text(reader: &mut XmlReader<'_>, path: &Path, end: &[u8]) -> Result<String, MenuError> {
    let mut text = String::new();
    loop {
        match next_event(reader, path)? {
            Event::Text(t) => {
                let unescaped = t
                    .unescape()
                    .map_err(|err| xml_error(path, reader.buffer_position(), err))?;
                text.push_str(&unescaped);
            }
            Event::CData(data) => text.push_str(&String::from_utf8_lossy(&data)),
            Event::End(e) if e.name().as_ref() == end => return Ok(text.trim().to_string()),
            Event::Eof => return Err(unexpected_eof(path, reader, &String::from_utf8_lossy(end))),
            _ => {}
        }
    }
}

fn skip(reader: &mut XmlReader<'_>, path: &Path, name: &[u8]) -> Result<(), MenuError> {
    reader
        .read_to_end(QName(name))
        .map(|_| ())
        .map_err(|err| xml_error(path, reader.buffer_position(), err))
}

fn attribute(
    e: &BytesStart<'_>,
    key: &[u8],
    path: &Path,
    position: usize,
) -> Result<Option<String>, MenuError> {
    let attr = e
        .try_get_attribute(key)
        .map_err(|err| xml_error(path, position, err))?;
    attr.map(|attr| {
        attr.unescape_value()
            .map(|value| value.into_owned())
            .map_err(|err| xml_error(path, position, err))
    })
    .transpose()
}

fn xml_error(path: &Path, position: usize, err: impl Display) -> MenuError {
    MenuError::Xml {
        path: path.to_path_buf(),
        position,
        message: err.to_string(),
    }
}

fn unexpected_eof(path: &Path, reader: &XmlReader<'_>, element: &str) -> MenuError {
    xml_error(
        path,
        reader.buffer_position(),
        format!("unexpected end of file inside <{element}>"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculoos::prelude::*;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    fn config() -> Config {
        Config {
            config_dirs: vec![fixtures().join("config")],
            data_dirs: vec![fixtures().join("data")],
            ..Default::default()
        }
    }

    #[test]
    fn parses_nested_menus_and_rules() {
        let path = fixtures().join("config/menus/test-applications.menu");
        let root = parse_menu_file(&path, &config()).unwrap();

        assert_that!(root.name.as_str()).is_equal_to("Applications");
        assert_that!(root.app_dirs.contains(&fixtures().join("data/applications"))).is_true();
        assert_that!(root.directory_dirs.contains(&fixtures().join("data/desktop-directories")))
            .is_true();

        let office = root.submenus.iter().find(|m| m.name == "Office").unwrap();
        assert_that!(office.directories).is_equal_to(vec!["office.directory".to_string()]);
        assert_that!(office.rules).is_equal_to(vec![RuleOp::Include(Rule::Or(vec![Rule::And(
            vec![Rule::Category("Office".to_string())],
        )]))]);
    }

    #[test]
    fn splices_merged_files_in_place() {
        let path = fixtures().join("config/menus/test-applications.menu");
        let root = parse_menu_file(&path, &config()).unwrap();

        // the merged file adds a second "Office" definition and "Extras"
        let offices = root.submenus.iter().filter(|m| m.name == "Office").count();
        assert_that!(offices).is_equal_to(2usize);
        assert_that!(root.submenus.iter().any(|m| m.name == "Extras")).is_true();
        // merged root <Name> does not rename the menu
        assert_that!(root.name.as_str()).is_equal_to("Applications");
    }

    #[test]
    fn reads_layout_elements() {
        let path = fixtures().join("config/menus/test-applications.menu");
        let root = parse_menu_file(&path, &config()).unwrap();

        assert_that!(root.layout).is_equal_to(Some(vec![
            LayoutItem::Filename("terminal.desktop".to_string()),
            LayoutItem::Separator,
            LayoutItem::Merge(MergeKind::Menus),
            LayoutItem::Merge(MergeKind::Files),
        ]));
    }

    #[test]
    fn flags_last_one_wins() {
        let path = fixtures().join("config/menus/test-applications.menu");
        let root = parse_menu_file(&path, &config()).unwrap();

        let other = root.submenus.iter().find(|m| m.name == "Other").unwrap();
        assert_that!(other.only_unallocated).is_equal_to(Some(true));
        let legacy = root.submenus.iter().find(|m| m.name == "Legacy").unwrap();
        assert_that!(legacy.deleted).is_equal_to(Some(true));
    }

    #[test]
    fn reports_malformed_xml() {
        let path = fixtures().join("broken.menu");
        let result = parse_menu_file(&path, &config());

        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, MenuError::Xml { .. }));
    }

    #[test]
    fn rejects_file_without_menu_root() {
        let path = fixtures().join("no-root.menu");
        let result = parse_menu_file(&path, &config());

        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, MenuError::NoRootMenu(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = fixtures().join("does-not-exist.menu");
        let result = parse_menu_file(&path, &config());

        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, MenuError::Io { .. }));
    }

    fn submenu_names(def: &MenuDef) -> Vec<&str> {
        def.submenus.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn files_are_never_merged_twice() {
        let path = fixtures().join("merging/cycle-a.menu");
        let root = parse_menu_file(&path, &config()).unwrap();

        assert_that!(root.name.as_str()).is_equal_to("Cycle");
        assert_that!(submenu_names(&root)).is_equal_to(vec!["A", "B"]);
    }

    #[test]
    fn merge_dir_splices_menu_files_in_name_order() {
        let path = fixtures().join("merging/merge-dir.menu");
        let root = parse_menu_file(&path, &config()).unwrap();

        // 20-broken.menu, the missing dir and the missing file are skipped
        assert_that!(submenu_names(&root)).is_equal_to(vec!["Games", "Science", "Last"]);
        assert_that!(root.name.as_str()).is_equal_to("Applications");
    }

    #[test]
    fn default_merge_dirs_use_config_dirs() {
        let config = Config {
            config_dirs: vec![fixtures().join("merging/config")],
            ..config()
        };
        let path = fixtures().join("merging/default-merge.menu");
        let root = parse_menu_file(&path, &config).unwrap();

        assert_that!(submenu_names(&root)).is_equal_to(vec!["Vendor"]);
    }
}
