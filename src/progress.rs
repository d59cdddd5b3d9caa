//! Terminal progress for downloads.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::networking::DownloadProgress;

const BAR_TEMPLATE: &str =
    "{spinner} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner} {bytes} downloaded ({binary_bytes_per_sec})";

pub struct DownloadBar {
    bar: ProgressBar,
    styled: bool,
}

impl DownloadBar {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        Self { bar, styled: false }
    }

    /// Switch to a byte bar when the length is known, otherwise stay a spinner.
    pub fn update(&mut self, update: &DownloadProgress) {
        if !self.styled {
            self.apply_style(update.total);
            self.styled = true;
        }
        self.bar.set_position(update.downloaded);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn apply_style(&self, total: Option<u64>) {
        let template = match total {
            Some(len) => {
                self.bar.set_length(len);
                BAR_TEMPLATE
            }
            None => {
                self.bar.enable_steady_tick(Duration::from_millis(120));
                SPINNER_TEMPLATE
            }
        };
        match ProgressStyle::with_template(template) {
            Ok(style) => self.bar.set_style(style.progress_chars("=> ")),
            Err(err) => warn!("progress: invalid template ({err}); using default style"),
        }
    }
}

impl Drop for DownloadBar {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
