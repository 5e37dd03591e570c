//! Document stage run inside execution units.
//!
//! Checks that the payload is a complete PDF and hands it on unchanged. The
//! page geometry engine plugs in behind [`enhance`]; the scheduler never
//! looks at document bytes itself.

use std::panic::{self, AssertUnwindSafe};

use crate::config::{EnhanceConfig, Layout};
use crate::error::{Error, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";
const EOF_MARKER: &[u8] = b"%%EOF";

/// Trailing window searched for the end-of-file marker.
const EOF_WINDOW: usize = 1024;

/// Transform one document according to `config`.
pub fn enhance(data: &[u8], config: &EnhanceConfig) -> Result<Vec<u8>> {
    if !data.starts_with(PDF_MAGIC) {
        return Err(Error::Transform(
            "input is not a PDF document (missing %PDF- header)".to_string(),
        ));
    }

    let tail = &data[data.len().saturating_sub(EOF_WINDOW)..];
    if !tail.windows(EOF_MARKER.len()).any(|w| w == EOF_MARKER) {
        return Err(Error::Transform(
            "document is truncated (no %%EOF marker)".to_string(),
        ));
    }

    match config.layout() {
        Layout::Fixed { margin_pt } => {
            tracing::debug!(margin_pt, side = ?config.side, "fixed margin layout")
        }
        Layout::Tablet(geometry) => tracing::debug!(
            width = geometry.width,
            height = geometry.height,
            epsilon_pt = geometry.epsilon_pt,
            side = ?config.side,
            "tablet layout"
        ),
    }

    Ok(data.to_vec())
}

/// Run a transform, turning a panic into an error message.
pub fn guarded<F>(f: F) -> std::result::Result<Vec<u8>, String>
where
    F: FnOnce() -> std::result::Result<Vec<u8>, String>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("transform panicked: {}", message))
        }
    }
}
