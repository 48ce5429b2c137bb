use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use plotters::style::{FontStyle, register_font};
use tracing::{debug, info, warn};

/// Family name the renderer asks plotters for once a font is registered.
pub const FONT_FAMILY: &str = "timetable-sans";

static LOADED: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Loads and registers the label font once per process.
///
/// Returns whether text can be drawn. The first call decides; later calls
/// with a different path keep the font that is already registered.
pub fn ensure_font(path: Option<&Path>) -> bool {
    let loaded = LOADED.get_or_init(|| match path {
        Some(path) => match register_from_file(path) {
            Ok(()) => {
                info!("Registered label font: {}", path.display());
                Some(path.to_path_buf())
            }
            Err(err) => {
                warn!("Labels disabled, font could not be loaded: {err:#}");
                None
            }
        },
        None => {
            warn!("No font configured; charts will be drawn without text");
            None
        }
    });

    if let (Some(active), Some(requested)) = (loaded.as_deref(), path)
        && active != requested
    {
        debug!(
            "font {} already registered, ignoring {}",
            active.display(),
            requested.display()
        );
    }
    loaded.is_some()
}

fn register_from_file(path: &Path) -> Result<()> {
    let bytes = fs::read(path)
        .with_context(|| format!("unable to read font file {}", path.display()))?;
    // plotters keeps registered fonts for the life of the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    for style in [FontStyle::Normal, FontStyle::Bold] {
        register_font(FONT_FAMILY, style, bytes)
            .map_err(|_| anyhow!("{} is not a usable TrueType/OpenType font", path.display()))?;
    }
    Ok(())
}
