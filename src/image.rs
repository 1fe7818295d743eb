use crate::error::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};
use size::{sniff_dimensions, Dimensions};
use std::path::{Path, PathBuf};

pub mod edit;
pub mod generate;
pub mod size;

/// Container format of an image, as far as this crate cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    #[default]
    Jpeg,
    Png,
    Webp,
    /// Anything else. Sniffed as JPEG, requested as JPEG.
    Other,
}

const FORMAT_BY_EXT: &[(&str, Format)] = &[
    ("jpeg", Format::Jpeg),
    ("jpg", Format::Jpeg),
    ("png", Format::Png),
    ("webp", Format::Webp),
];

const MIME_BY_EXT: &[(&str, &str)] = &[
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
];

const DEFAULT_MIME: &str = "image/png";

#[inline]
fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

impl Format {
    /// Looks up the format of a file extension (with or without the leading dot)
    pub fn from_extension(ext: impl AsRef<str>) -> Self {
        let ext = normalize_extension(ext.as_ref());
        return FORMAT_BY_EXT
            .iter()
            .find(|(x, _)| *x == ext)
            .map_or(Format::Other, |(_, format)| *format);
    }

    /// Looks up the format of a MIME type such as `image/webp`
    pub fn from_mime(mime: impl AsRef<str>) -> Self {
        let subtype = mime.as_ref().split('/').nth(1).unwrap_or_default();
        return Self::from_extension(subtype);
    }

    /// The format the service should produce for an input of this format
    #[inline]
    pub fn output_format(self) -> Self {
        match self {
            Format::Other => Format::Jpeg,
            other => other,
        }
    }

    /// File extension (with leading dot) used when saving results
    #[inline]
    pub fn output_extension(self) -> &'static str {
        match self.output_format() {
            Format::Png => ".png",
            Format::Webp => ".webp",
            _ => ".jpg",
        }
    }
}

/// Looks up the MIME type of a file extension, defaulting to `image/png`
pub fn mime_from_extension(ext: impl AsRef<str>) -> &'static str {
    let ext = normalize_extension(ext.as_ref());
    return MIME_BY_EXT
        .iter()
        .find(|(x, _)| *x == ext)
        .map_or(DEFAULT_MIME, |(_, mime)| *mime);
}

/// Returns `true` for values the service accepts as-is: URLs and data URIs
#[inline]
pub fn is_passthrough(value: &str) -> bool {
    value.is_empty()
        || value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("data:")
}

#[inline]
pub(crate) fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Makes `path` absolute against the current directory
pub(crate) fn resolve(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    return Ok(std::env::current_dir()?.join(path));
}

/// Lowercase extension of a path, without the dot
pub(crate) fn extension_of(path: impl AsRef<Path>) -> Option<String> {
    return path
        .as_ref()
        .extension()
        .map(|x| x.to_string_lossy().to_ascii_lowercase());
}

/// Path for a result derived from the first input image: `{dir}/{stem}-{ext}`.
///
/// Local images keep their directory. URLs land in the current directory, and inline or
/// missing inputs are named `output`.
pub fn sibling_output(source: Option<&ImageInput>, extension: &str) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let (dir, stem) = match source {
        Some(ImageInput::Local(image)) => (
            image
                .path
                .parent()
                .map_or_else(|| cwd.clone(), Path::to_path_buf),
            image.path.file_stem().map(|x| x.to_string_lossy().into_owned()),
        ),
        Some(ImageInput::Remote(url)) if is_url(url) => (
            cwd,
            Path::new(url_file_name(url))
                .file_stem()
                .map(|x| x.to_string_lossy().into_owned()),
        ),
        _ => (cwd, None),
    };

    let stem = stem.unwrap_or_else(|| "output".to_string());
    return Ok(dir.join(format!("{stem}-{extension}")));
}

/// Path component of a URL, without query or fragment
pub fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.find('/').map_or("", |i| &rest[i..]);
    return path.split(['?', '#']).next().unwrap_or_default();
}

fn url_file_name(url: &str) -> &str {
    return url_path(url).rsplit('/').next().unwrap_or_default();
}

/// An image argument ready to be embedded into a request body.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageInput {
    /// URL, data URI or empty value, forwarded unchanged
    Remote(String),
    /// Local file, inlined as a base64 data URI
    Local(LocalImage),
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct LocalImage {
    pub path: PathBuf,
    pub format: Format,
    /// Lowercase extension, without the dot
    pub extension: String,
    pub data_uri: String,
    pub size: Dimensions,
}

impl ImageInput {
    /// Loads an image argument. Local paths are read and inlined; everything else is kept as-is.
    pub async fn load(value: impl Into<String>) -> Result<Self> {
        let value: String = value.into();
        if is_passthrough(&value) {
            return Ok(Self::Remote(value));
        }

        let path = resolve(&value)?;
        let extension = extension_of(&path).unwrap_or_default();
        let format = Format::from_extension(&extension);
        let mime = mime_from_extension(&extension);

        let bytes = tokio::fs::read(&path).await?;
        let size = sniff_dimensions(&bytes, format);
        let data_uri = format!(
            "data:{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), ?size, "Loaded image");

        return Ok(Self::Local(LocalImage {
            path,
            format,
            extension,
            data_uri,
            size,
        }));
    }

    /// Loads several image arguments concurrently, preserving order
    pub async fn load_all<I>(values: I) -> Result<Vec<Self>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        return futures::future::try_join_all(values.into_iter().map(Self::load)).await;
    }

    /// The value sent to the service
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            ImageInput::Remote(x) => x,
            ImageInput::Local(x) => &x.data_uri,
        }
    }

    /// The value written to logs, with inline data replaced by `[data]`
    #[inline]
    pub fn redacted(&self) -> &str {
        match self.as_str() {
            x if x.starts_with("data:") => "[data]",
            x => x,
        }
    }

    /// Lowercase extension of the input, without the dot
    pub fn extension(&self) -> Option<String> {
        match self {
            ImageInput::Local(x) => Some(x.extension.clone()),
            ImageInput::Remote(x) if x.starts_with("data:") => None,
            ImageInput::Remote(x) => extension_of(url_file_name(x)),
        }
    }

    /// Dimensions sniffed from a local file
    #[inline]
    pub fn size(&self) -> Option<Dimensions> {
        match self {
            ImageInput::Local(x) => Some(x.size),
            ImageInput::Remote(_) => None,
        }
    }
}

/// Splits a comma-separated images argument, dropping empty entries.
///
/// The comma separating a data URI's header from its payload doesn't split it.
pub fn split_images(arg: &str) -> Vec<String> {
    let mut images = Vec::<String>::new();
    for piece in arg.split(',') {
        match images.last_mut() {
            Some(last) if last.starts_with("data:") && !last.contains(',') => {
                last.push(',');
                last.push_str(piece.trim_end());
            }
            _ if piece.trim().is_empty() => {}
            _ => images.push(piece.trim().to_string()),
        }
    }
    return images;
}
