use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eframe::egui;
use egui::{Color32, ColorImage, TextureHandle, TextureOptions};
use image::imageops::FilterType as ResizeFilterType;
use resvg::{tiny_skia, usvg};

use crate::error::IconError;

const FALLBACK_ICON: &str = "application-x-executable";
const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".svg", ".xpm", ".jpg"];

/// Icon textures keyed by the `Icon` value of an entry or directory.
///
/// Every identifier is looked up once; failures are logged and resolve to
/// the placeholder for the rest of the process lifetime.
pub struct IconCache {
    size: u16,
    theme: Option<String>,
    textures: HashMap<String, TextureHandle>,
    placeholder: Option<TextureHandle>,
}

impl IconCache {
    pub fn new(size: u16, theme: Option<String>) -> Self {
        Self {
            size,
            theme,
            textures: HashMap::new(),
            placeholder: None,
        }
    }

    pub fn size(&self) -> f32 {
        f32::from(self.size)
    }

    pub fn get(&mut self, ctx: &egui::Context, icon: Option<&str>) -> TextureHandle {
        let Some(icon) = icon else {
            return self.placeholder(ctx);
        };
        if let Some(texture) = self.textures.get(icon) {
            return texture.clone();
        }

        let texture = match load_icon(icon, self.size, self.theme.as_deref()) {
            Ok(image) => ctx.load_texture(format!("icon-{icon}"), image, TextureOptions::LINEAR),
            Err(err) => {
                log::warn!("{err}, using placeholder");
                self.placeholder(ctx)
            }
        };
        self.textures.insert(icon.to_string(), texture.clone());
        texture
    }

    fn placeholder(&mut self, ctx: &egui::Context) -> TextureHandle {
        if let Some(texture) = &self.placeholder {
            return texture.clone();
        }

        let image = load_icon(FALLBACK_ICON, self.size, self.theme.as_deref())
            .unwrap_or_else(|_| placeholder_image(usize::from(self.size)));
        let texture = ctx.load_texture("icon-placeholder", image, TextureOptions::LINEAR);
        self.placeholder = Some(texture.clone());
        texture
    }
}

pub fn load_icon(icon: &str, size: u16, theme: Option<&str>) -> Result<ColorImage, IconError> {
    let path = find_icon_path(icon, size, theme).ok_or_else(|| IconError::NotFound(icon.to_string()))?;
    decode_icon(&path, size)
}

/// Absolute `Icon` values name a file; anything else is an icon theme name,
/// tolerating a stray image extension.
pub fn find_icon_path(icon: &str, size: u16, theme: Option<&str>) -> Option<PathBuf> {
    let path = Path::new(icon);
    if path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let name = IMAGE_EXTENSIONS
        .iter()
        .find_map(|ext| icon.strip_suffix(ext))
        .unwrap_or(icon);
    let mut lookup = freedesktop_icons::lookup(name).with_size(size).with_cache();
    if let Some(theme) = theme {
        lookup = lookup.with_theme(theme);
    }
    lookup.find()
}

pub fn decode_icon(path: &Path, size: u16) -> Result<ColorImage, IconError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    if extension.as_deref() == Some("xpm") {
        return Err(IconError::Unsupported(path.to_path_buf()));
    }

    let bytes = fs::read(path).map_err(|source| IconError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if matches!(extension.as_deref(), Some("svg" | "svgz")) {
        return rasterize_svg(path, &bytes, size);
    }

    let img = image::load_from_memory(&bytes).map_err(|source| IconError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let size = u32::from(size);
    let img = if img.width() > size || img.height() > size {
        img.resize(size, size, ResizeFilterType::Triangle)
    } else {
        img
    };
    let rgba = img.to_rgba8();
    Ok(ColorImage::from_rgba_unmultiplied(
        [rgba.width() as usize, rgba.height() as usize],
        rgba.as_raw(),
    ))
}

/// Renders an SVG so that its longer side is `size` pixels.
fn rasterize_svg(path: &Path, bytes: &[u8], size: u16) -> Result<ColorImage, IconError> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default()).map_err(|source| {
        IconError::Svg {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let tree_size = tree.size();
    let scale = f32::from(size) / tree_size.width().max(tree_size.height());
    let width = (tree_size.width() * scale).round().max(1.0) as u32;
    let height = (tree_size.height() * scale).round().max(1.0) as u32;
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| IconError::Unsupported(path.to_path_buf()))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    Ok(ColorImage::from_rgba_premultiplied(
        [width as usize, height as usize],
        pixmap.data(),
    ))
}

/// A grey rounded square with a darker outline.
fn placeholder_image(size: usize) -> ColorImage {
    let mut image = ColorImage::new([size, size], Color32::TRANSPARENT);
    if size < 4 {
        return image;
    }

    let last = size - 1;
    for y in 0..size {
        for x in 0..size {
            let corner = (x == 0 || x == last) && (y == 0 || y == last);
            if corner {
                continue;
            }
            let edge = x == 0 || y == 0 || x == last || y == last;
            image.pixels[y * size + x] = if edge {
                Color32::from_gray(110)
            } else {
                Color32::from_gray(190)
            };
        }
    }
    image
}
