//! Image size selection under a fixed GPU memory budget.
//!
//! Sizes are counted in 64×64 pixel blocks. The backend card (7.5 GB) fits
//! at most 135 blocks per image, and anything under 64 blocks (512×512)
//! is scaled up for quality.

use crate::error::{Result, SdError};

/// Edge length of a quantization block in pixels.
pub const BLOCK_SIZE: u32 = 64;
/// Largest block count the backend can render.
pub const MAX_BLOCKS: u64 = 135;
/// Smallest block count worth rendering.
pub const MIN_BLOCKS: u64 = 64;

const BLOCK_PIXELS: f64 = (BLOCK_SIZE * BLOCK_SIZE) as f64;
const MAX_PIXELS: f64 = MAX_BLOCKS as f64 * BLOCK_PIXELS;
const MIN_PIXELS: f64 = MIN_BLOCKS as f64 * BLOCK_PIXELS;

/// Preset image orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    /// Recognize an orientation name or one of its aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("portrait") || name == "纵向" {
            Some(Orientation::Portrait)
        } else if name.eq_ignore_ascii_case("landscape") || name == "横向" {
            Some(Orientation::Landscape)
        } else if name.eq_ignore_ascii_case("square") || name == "方形" {
            Some(Orientation::Square)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
            Orientation::Square => "square",
        }
    }

    /// Largest hand-tuned `(width, height)` for this orientation.
    pub fn tensor_size(&self) -> (u32, u32) {
        match self {
            Orientation::Portrait => (576, 960),
            Orientation::Landscape => (960, 576),
            Orientation::Square => (704, 704),
        }
    }
}

/// Preset size for an orientation name. Unknown names get the square size.
pub fn best_tensor_size(name: &str) -> (u32, u32) {
    Orientation::from_name(name)
        .unwrap_or(Orientation::Square)
        .tensor_size()
}

/// Fit an arbitrary source size into the block budget.
///
/// Both sides are multiplied by the same factor to reach the pixel floor or
/// ceiling, then floored to whole blocks (at least one each). The factor is
/// the plain area ratio rather than its square root, so a resized image
/// lands well inside the budget instead of on its edge.
///
/// Fails with [`SdError::Invariant`] when the block product still exceeds
/// [`MAX_BLOCKS`], which only extreme aspect ratios can cause.
///
/// # Example
/// ```
/// use sd_task_client::quantize::select_best_tensor_size;
///
/// assert_eq!(select_best_tensor_size(512, 512).unwrap(), (512, 512));
/// assert_eq!(select_best_tensor_size(4000, 4000).unwrap(), (128, 128));
/// ```
pub fn select_best_tensor_size(width: u32, height: u32) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(SdError::Validation(format!(
            "Image size {}x{} is empty",
            width, height
        )));
    }

    let mut w = width as f64;
    let mut h = height as f64;

    let total = w * h;
    if total < MIN_PIXELS {
        let scale = MIN_PIXELS / total;
        w *= scale;
        h *= scale;
    }

    let total = w * h;
    if total > MAX_PIXELS {
        let scale = MAX_PIXELS / total;
        w *= scale;
        h *= scale;
    }

    let w_blocks = ((w / BLOCK_SIZE as f64).floor() as u64).max(1);
    let h_blocks = ((h / BLOCK_SIZE as f64).floor() as u64).max(1);
    if w_blocks * h_blocks > MAX_BLOCKS {
        return Err(SdError::Invariant(format!(
            "{}x{} maps to {}x{} blocks, budget is {}",
            width, height, w_blocks, h_blocks, MAX_BLOCKS
        )));
    }

    Ok((
        (w_blocks * BLOCK_SIZE as u64) as u32,
        (h_blocks * BLOCK_SIZE as u64) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_lookup() {
        assert_eq!(best_tensor_size("portrait"), (576, 960));
        assert_eq!(best_tensor_size("landscape"), (960, 576));
        assert_eq!(best_tensor_size("square"), (704, 704));
        // Order of calls does not matter.
        assert_eq!(best_tensor_size("portrait"), (576, 960));
    }

    #[test]
    fn test_orientation_aliases() {
        assert_eq!(Orientation::from_name("纵向"), Some(Orientation::Portrait));
        assert_eq!(Orientation::from_name("横向"), Some(Orientation::Landscape));
        assert_eq!(Orientation::from_name("方形"), Some(Orientation::Square));
        assert_eq!(Orientation::from_name(" Portrait "), Some(Orientation::Portrait));
        assert_eq!(Orientation::from_name("diagonal"), None);
        assert_eq!(best_tensor_size("diagonal"), (704, 704));
    }

    #[test]
    fn test_presets_fit_budget() {
        for o in [Orientation::Portrait, Orientation::Landscape, Orientation::Square] {
            let (w, h) = o.tensor_size();
            assert_eq!(w % BLOCK_SIZE, 0);
            assert_eq!(h % BLOCK_SIZE, 0);
            assert!((w / BLOCK_SIZE) as u64 * (h / BLOCK_SIZE) as u64 <= MAX_BLOCKS);
        }
    }

    #[test]
    fn test_in_range_sizes_are_only_floored() {
        assert_eq!(select_best_tensor_size(512, 512).unwrap(), (512, 512));
        assert_eq!(select_best_tensor_size(576, 960).unwrap(), (576, 960));
        assert_eq!(select_best_tensor_size(700, 700).unwrap(), (640, 640));
    }

    #[test]
    fn test_small_size_scales_up_first() {
        // The area-ratio factor overshoots the ceiling and is pulled back down.
        assert_eq!(select_best_tensor_size(100, 100).unwrap(), (192, 192));
    }

    #[test]
    fn test_large_size_scales_down() {
        assert_eq!(select_best_tensor_size(4000, 4000).unwrap(), (128, 128));
        assert_eq!(select_best_tensor_size(1024, 1024).unwrap(), (512, 512));
    }

    #[test]
    fn test_results_respect_budget() {
        let sides = [1, 7, 63, 64, 100, 333, 512, 700, 1000, 2048, 4000, 10_000];
        for &w in &sides {
            for &h in &sides {
                match select_best_tensor_size(w, h) {
                    Ok((qw, qh)) => {
                        assert!(qw > 0 && qh > 0);
                        assert_eq!(qw % BLOCK_SIZE, 0, "{}x{}", w, h);
                        assert_eq!(qh % BLOCK_SIZE, 0, "{}x{}", w, h);
                        assert!(
                            (qw / BLOCK_SIZE) as u64 * (qh / BLOCK_SIZE) as u64 <= MAX_BLOCKS,
                            "{}x{}",
                            w,
                            h
                        );
                    }
                    Err(e) => assert!(matches!(e, SdError::Invariant(_)), "{}x{}: {}", w, h, e),
                }
                if w.max(h) <= 4 * w.min(h) {
                    assert!(select_best_tensor_size(w, h).is_ok(), "{}x{}", w, h);
                }
            }
        }
    }

    #[test]
    fn test_extreme_aspect_ratio_violates_budget() {
        let err = select_best_tensor_size(1, 100_000).unwrap_err();
        assert!(matches!(err, SdError::Invariant(_)));
        assert!(!err.is_user_facing());
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(matches!(
            select_best_tensor_size(0, 512),
            Err(SdError::Validation(_))
        ));
    }
}
