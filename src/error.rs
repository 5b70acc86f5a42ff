use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MenuError {
    #[error("no menu definition found (looked for {0})")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed menu file {path} at byte {position}: {message}")]
    Xml {
        path: PathBuf,
        position: usize,
        message: String,
    },
    #[error("menu file {0} has no root <Menu> element")]
    NoRootMenu(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{0} has no Exec key")]
    MissingExecKey(PathBuf),
    #[error("Exec key of {0} expands to an empty command line")]
    EmptyExecString(PathBuf),
    #[error("unterminated quote in Exec key: {0}")]
    UnterminatedQuote(String),
    #[error("unknown field code {code} in Exec key of {path}")]
    UnknownFieldCode { code: String, path: PathBuf },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("icon {0} not found in the icon theme")]
    NotFound(String),
    #[error("unsupported icon format: {0}")]
    Unsupported(PathBuf),
    #[error("failed to read icon {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not render SVG icon {path}: {source}")]
    Svg {
        path: PathBuf,
        #[source]
        source: resvg::usvg::Error,
    },
    #[error("could not decode icon {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
