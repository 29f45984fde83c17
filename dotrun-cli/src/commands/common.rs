use std::path::Path;

use anyhow::Context;
use dotrun::CilImage;

/// Decode a .NET image from disk.
pub fn load_image(path: &Path) -> anyhow::Result<CilImage> {
    CilImage::from_file(path).with_context(|| format!("failed to load assembly: {}", path.display()))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
