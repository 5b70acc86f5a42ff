use std::env;
use std::fs::read_link;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crate::error::LaunchError;
use crate::models::AppEntry;

/// A fully expanded command line for a desktop entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Launches the entry and returns without waiting for it.
pub fn launch(entry: &AppEntry) -> Result<(), LaunchError> {
    let command = LaunchCommand::for_entry(entry, &[])?;
    command.spawn()?;
    log::info!("launched {} ({})", entry.name, entry.id);
    Ok(())
}

impl LaunchCommand {
    pub fn for_entry(entry: &AppEntry, uris: &[&str]) -> Result<Self, LaunchError> {
        let terminal = entry.terminal.then(detect_terminal);
        Self::assemble(entry, uris, terminal)
    }

    fn assemble(
        entry: &AppEntry,
        uris: &[&str],
        terminal: Option<(String, &'static str)>,
    ) -> Result<Self, LaunchError> {
        let exec = entry
            .exec
            .as_deref()
            .ok_or_else(|| LaunchError::MissingExecKey(entry.path.clone()))?;

        let mut args = Vec::new();
        for token in split_exec(exec)? {
            if token.quoted {
                args.push(token.text.replace("%%", "%"));
                continue;
            }
            match ArgOrFieldCode::try_from(token.text.as_str()) {
                Ok(code) => expand_field_code(entry, uris, code, &mut args),
                Err(FieldCodeError::Deprecated) => {}
                Err(FieldCodeError::Unknown(code)) => {
                    return Err(LaunchError::UnknownFieldCode {
                        code,
                        path: entry.path.clone(),
                    });
                }
            }
        }

        if args.is_empty() {
            return Err(LaunchError::EmptyExecString(entry.path.clone()));
        }

        let (program, args) = match terminal {
            Some((terminal, separator)) => {
                args.insert(0, separator.to_string());
                (terminal, args)
            }
            None => {
                let program = args.remove(0);
                (program, args)
            }
        };

        Ok(Self {
            program,
            args,
            working_dir: entry.working_dir.as_ref().map(PathBuf::from),
        })
    }

    pub fn spawn(&self) -> Result<(), LaunchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        // reap the child so a resident menu does not collect zombies
        thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

fn expand_field_code(entry: &AppEntry, uris: &[&str], code: ArgOrFieldCode<'_>, args: &mut Vec<String>) {
    match code {
        ArgOrFieldCode::SingleFileName | ArgOrFieldCode::SingleUrl => {
            if let Some(uri) = uris.first() {
                args.push(uri.to_string());
            }
        }
        ArgOrFieldCode::FileList | ArgOrFieldCode::UrlList => {
            args.extend(uris.iter().map(ToString::to_string));
        }
        ArgOrFieldCode::IconKey => {
            if let Some(icon) = &entry.icon {
                args.push("--icon".to_string());
                args.push(icon.clone());
            }
        }
        ArgOrFieldCode::TranslatedName => args.push(entry.name.clone()),
        ArgOrFieldCode::DesktopFileLocation => args.push(entry.path.to_string_lossy().to_string()),
        ArgOrFieldCode::Arg(arg) => args.push(arg.replace("%%", "%")),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ExecToken {
    text: String,
    quoted: bool,
}

/// Splits an Exec value into arguments. Double-quoted arguments may
/// escape `"`, `` ` ``, `$` and `\` with a backslash.
fn split_exec(exec: &str) -> Result<Vec<ExecToken>, LaunchError> {
    let mut tokens = Vec::new();
    let mut chars = exec.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_ascii_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut text = String::new();
        if first == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some(escaped @ ('"' | '`' | '$' | '\\')) => text.push(escaped),
                        Some(other) => {
                            text.push('\\');
                            text.push(other);
                        }
                        None => break,
                    },
                    c => text.push(c),
                }
            }
            if !closed {
                return Err(LaunchError::UnterminatedQuote(exec.to_string()));
            }
            tokens.push(ExecToken { text, quoted: true });
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_ascii_whitespace()) {
                text.push(c);
            }
            tokens.push(ExecToken {
                text,
                quoted: false,
            });
        }
    }

    Ok(tokens)
}

// either a command line argument or a field code as described in
// https://specifications.freedesktop.org/desktop-entry-spec/latest/exec-variables.html
enum ArgOrFieldCode<'a> {
    SingleFileName,
    FileList,
    SingleUrl,
    UrlList,
    IconKey,
    TranslatedName,
    DesktopFileLocation,
    Arg(&'a str),
}

enum FieldCodeError {
    Deprecated,
    Unknown(String),
}

impl<'a> TryFrom<&'a str> for ArgOrFieldCode<'a> {
    type Error = FieldCodeError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        match value {
            "%f" => Ok(ArgOrFieldCode::SingleFileName),
            "%F" => Ok(ArgOrFieldCode::FileList),
            "%u" => Ok(ArgOrFieldCode::SingleUrl),
            "%U" => Ok(ArgOrFieldCode::UrlList),
            "%i" => Ok(ArgOrFieldCode::IconKey),
            "%c" => Ok(ArgOrFieldCode::TranslatedName),
            "%k" => Ok(ArgOrFieldCode::DesktopFileLocation),
            "%d" | "%D" | "%n" | "%N" | "%v" | "%m" => Err(FieldCodeError::Deprecated),
            "%%" => Ok(ArgOrFieldCode::Arg(value)),
            other if other.len() == 2 && other.starts_with('%') => {
                Err(FieldCodeError::Unknown(other.to_string()))
            }
            other => Ok(ArgOrFieldCode::Arg(other)),
        }
    }
}

/// Returns `$TERMINAL`, the target of `/usr/bin/x-terminal-emulator`, or
/// the first of gnome-terminal, konsole and xterm that is installed, with
/// the argument that introduces the command to run.
fn detect_terminal() -> (String, &'static str) {
    const SYMLINK: &str = "/usr/bin/x-terminal-emulator";

    if let Some(terminal) = env::var("TERMINAL").ok().filter(|t| !t.trim().is_empty()) {
        let separator = if terminal.contains("gnome-terminal") { "--" } else { "-e" };
        return (terminal, separator);
    }

    if let Ok(found) = read_link(SYMLINK) {
        let found = read_link(&found).unwrap_or(found);
        let separator = if found.to_string_lossy().contains("gnome-terminal") {
            "--"
        } else {
            "-e"
        };
        return (found.to_string_lossy().to_string(), separator);
    }

    let candidates = [
        ("/usr/bin/gnome-terminal", "--"),
        ("/usr/bin/konsole", "-e"),
    ];
    candidates
        .iter()
        .find(|(path, _)| Path::new(path).exists())
        .map(|(path, separator)| (path.to_string(), *separator))
        .unwrap_or_else(|| ("xterm".to_string(), "-e"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculoos::prelude::*;

    fn entry(exec: &str) -> AppEntry {
        AppEntry {
            id: "editor.desktop".to_string(),
            path: PathBuf::from("/usr/share/applications/editor.desktop"),
            name: "Editor".to_string(),
            icon: Some("accessories-text-editor".to_string()),
            exec: Some(exec.to_string()),
            ..Default::default()
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn should_fail_if_exec_key_is_missing() {
        let mut app = entry("editor");
        app.exec = None;

        assert_that!(LaunchCommand::assemble(&app, &[], None))
            .is_err()
            .matches(|err| matches!(err, LaunchError::MissingExecKey(_)));
    }

    #[test]
    fn should_fail_if_exec_string_is_empty() {
        let result = LaunchCommand::assemble(&entry("  %f "), &[], None);

        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, LaunchError::EmptyExecString(_)));
    }

    #[test]
    fn should_drop_file_codes_without_uris() {
        let command = LaunchCommand::assemble(&entry("editor --new-window %U"), &[], None).unwrap();

        assert_that!(command.program.as_str()).is_equal_to("editor");
        assert_that!(command.args).is_equal_to(strings(&["--new-window"]));
    }

    #[test]
    fn should_expand_uri_lists_into_separate_arguments() {
        let command =
            LaunchCommand::assemble(&entry("editor %F"), &["a.txt", "b.txt"], None).unwrap();

        assert_that!(command.args).is_equal_to(strings(&["a.txt", "b.txt"]));
    }

    #[test]
    fn should_expand_icon_name_and_location() {
        let command = LaunchCommand::assemble(&entry("editor %i %c %k"), &[], None).unwrap();

        assert_that!(command.args).is_equal_to(strings(&[
            "--icon",
            "accessories-text-editor",
            "Editor",
            "/usr/share/applications/editor.desktop",
        ]));
    }

    #[test]
    fn should_remove_deprecated_field_codes() {
        let command = LaunchCommand::assemble(&entry("editor %d %m --flag"), &[], None).unwrap();

        assert_that!(command.args).is_equal_to(strings(&["--flag"]));
    }

    #[test]
    fn should_reject_unknown_field_codes() {
        let result = LaunchCommand::assemble(&entry("editor %x"), &[], None);

        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, LaunchError::UnknownFieldCode { code, .. } if code == "%x"));
    }

    #[test]
    fn should_keep_quoted_arguments_together() {
        let command = LaunchCommand::assemble(
            &entry(r#""/opt/My App/run" --title "say \"hi\"" 100%%"#),
            &[],
            None,
        )
        .unwrap();

        assert_that!(command.program.as_str()).is_equal_to("/opt/My App/run");
        assert_that!(command.args).is_equal_to(strings(&["--title", "say \"hi\"", "100%"]));
    }

    #[test]
    fn should_unescape_percent_in_quoted_arguments() {
        let command = LaunchCommand::assemble(&entry(r#"printf "100%%" "%f""#), &[], None).unwrap();

        assert_that!(command.program.as_str()).is_equal_to("printf");
        assert_that!(command.args).is_equal_to(strings(&["100%", "%f"]));
    }

    #[test]
    fn should_fail_on_unterminated_quote() {
        let result = LaunchCommand::assemble(&entry(r#"sh -c "echo"#), &[], None);

        assert_that!(result)
            .is_err()
            .matches(|err| matches!(err, LaunchError::UnterminatedQuote(_)));
    }

    #[test]
    fn should_wrap_terminal_commands() {
        let mut app = entry("htop");
        app.terminal = true;
        app.working_dir = Some("/tmp".to_string());
        let command =
            LaunchCommand::assemble(&app, &[], Some(("/usr/bin/konsole".to_string(), "-e"))).unwrap();

        assert_that!(command.program.as_str()).is_equal_to("/usr/bin/konsole");
        assert_that!(command.args).is_equal_to(strings(&["-e", "htop"]));
        assert_that!(command.working_dir).is_equal_to(Some(PathBuf::from("/tmp")));
    }

    #[test]
    #[ignore = "Needs a desktop environment with alacritty installed, run locally only"]
    fn should_launch_application() {
        let mut app = entry("alacritty");
        app.name = "Alacritty".to_string();

        assert_that!(launch(&app)).is_ok();
    }
}
