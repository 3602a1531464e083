use opencv::{core::Mat, highgui};
use vision::{utils::mask_to_mat, Mask};

use crate::Config;

/// Blocking preview window for intermediate images.
///
/// HighGUI must be driven from the main thread, so previews are only shown
/// when videos are processed one at a time.
pub struct Preview {
    window: String,
}

impl Preview {
    /// Opens a window if previews are enabled for this run.
    pub fn open(config: &Config, title: &str) -> anyhow::Result<Option<Self>> {
        if !config.preview {
            return Ok(None);
        }
        if config.jobs > 1 {
            log::warn!("Preview disabled while processing {} videos in parallel", config.jobs);
            return Ok(None);
        }

        highgui::named_window(title, highgui::WINDOW_NORMAL)?;
        Ok(Some(Self { window: title.to_string() }))
    }

    /// Shows `img` and waits for a key press.
    pub fn show(&self, img: &Mat) -> anyhow::Result<()> {
        highgui::imshow(&self.window, img)?;
        highgui::wait_key(0)?;
        Ok(())
    }

    pub fn show_mask(&self, mask: &Mask) -> anyhow::Result<()> {
        self.show(&mask_to_mat(mask)?)
    }

    pub fn close(self) -> anyhow::Result<()> {
        highgui::destroy_window(&self.window)?;
        Ok(())
    }
}

/// Opens, shows and closes a preview of `mask` in one go.
pub fn preview_mask(config: &Config, title: &str, mask: &Mask) -> anyhow::Result<()> {
    if let Some(preview) = Preview::open(config, title)? {
        preview.show_mask(mask)?;
        preview.close()?;
    }
    Ok(())
}
