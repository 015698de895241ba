use crate::error::{Result, SdError};
use crate::quantize::select_best_tensor_size;
use crate::types::ProcessResult;

const MIN_STEPS: i64 = 1;
const MAX_STEPS: i64 = 50;
const DEFAULT_STEPS: i64 = 30;

const MIN_SCALE: f64 = 1.0;
const MAX_SCALE: f64 = 30.0;
const DEFAULT_SCALE: f64 = 12.0;

const MIN_DENOISE: f64 = 0.1;
const MAX_DENOISE: f64 = 1.0;
const DEFAULT_DENOISE: f64 = 0.7;

const MIN_RESIZE_MODE: i64 = 0;
const MAX_RESIZE_MODE: i64 = 2;
const DEFAULT_RESIZE_MODE: i64 = 2;

fn clamp_with_default(value: f64, default: f64, min: f64, max: f64) -> f64 {
    let value = if value.is_nan() { default } else { value };
    value.clamp(min, max)
}

/// Parameters for one generation job.
///
/// Fields are public and may hold out-of-range values while a caller is
/// filling them in; [`ProcessArguments::limit_args_range`] brings them back
/// into range. `Clone` copies everything, image buffers included, so a
/// result can be used as the template for a follow-up job.
///
/// # Example
/// ```
/// use sd_task_client::ProcessArguments;
///
/// let mut args = ProcessArguments::new("a lighthouse at dusk")
///     .negative("lowres")
///     .size(960, 576)
///     .steps(80);
/// args.limit_args_range();
///
/// assert_eq!(args.steps, 50);
/// assert_eq!(args.seed, None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessArguments {
    pub width: u32,
    pub height: u32,
    pub prompts: String,
    pub negative_prompts: String,
    /// Number of images to generate.
    pub count: u32,
    pub steps: i64,
    /// Classifier-free guidance scale.
    pub scale: f64,
    /// Strength of the change applied to the initial images.
    pub denoise: f64,
    /// Initial images for image-to-image jobs.
    pub images: Option<Vec<Vec<u8>>>,
    pub resize_mode: i64,
    /// `None` lets the backend pick.
    pub seed: Option<i64>,
    /// Backend-side model variant.
    pub module: Option<String>,
    /// Opaque attribution metadata, forwarded untouched.
    pub comment: Option<String>,
}

impl Default for ProcessArguments {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            prompts: String::new(),
            negative_prompts: String::new(),
            count: 1,
            steps: DEFAULT_STEPS,
            scale: DEFAULT_SCALE,
            denoise: DEFAULT_DENOISE,
            images: None,
            resize_mode: DEFAULT_RESIZE_MODE,
            seed: None,
            module: None,
            comment: None,
        }
    }
}

impl ProcessArguments {
    /// Create arguments with the given prompts and defaults for the rest.
    pub fn new(prompts: impl Into<String>) -> Self {
        Self {
            prompts: prompts.into(),
            ..Default::default()
        }
    }

    pub fn negative(mut self, prompts: impl Into<String>) -> Self {
        self.negative_prompts = prompts.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn steps(mut self, steps: i64) -> Self {
        self.steps = steps;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn denoise(mut self, denoise: f64) -> Self {
        self.denoise = denoise;
        self
    }

    pub fn images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn resize_mode(mut self, mode: i64) -> Self {
        self.resize_mode = mode;
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn clamped_steps(&self) -> i64 {
        self.steps.clamp(MIN_STEPS, MAX_STEPS)
    }

    pub fn clamped_scale(&self) -> f64 {
        clamp_with_default(self.scale, DEFAULT_SCALE, MIN_SCALE, MAX_SCALE)
    }

    pub fn clamped_denoise(&self) -> f64 {
        clamp_with_default(self.denoise, DEFAULT_DENOISE, MIN_DENOISE, MAX_DENOISE)
    }

    pub fn clamped_resize_mode(&self) -> i64 {
        self.resize_mode.clamp(MIN_RESIZE_MODE, MAX_RESIZE_MODE)
    }

    /// Clamp steps, scale, denoise and resize mode into their valid ranges.
    ///
    /// Idempotent and infallible. A `NaN` scale or denoise is replaced by
    /// its default.
    pub fn limit_args_range(&mut self) {
        self.steps = self.clamped_steps();
        self.scale = self.clamped_scale();
        self.denoise = self.clamped_denoise();
        self.resize_mode = self.clamped_resize_mode();
    }

    /// Check the fields that must hold before submission.
    pub fn validate(&self, available_modules: &[String]) -> Result<()> {
        if self.prompts.trim().is_empty() {
            return Err(SdError::Validation("Prompts is empty".into()));
        }
        if self.width == 0 || self.height == 0 || self.width % 64 != 0 || self.height % 64 != 0 {
            return Err(SdError::Validation(format!(
                "Size {}x{} is not a positive multiple of 64",
                self.width, self.height
            )));
        }
        if let Some(module) = &self.module {
            if !available_modules.iter().any(|m| m == module) {
                return Err(SdError::Validation(format!(
                    "Module '{}' is not available",
                    module
                )));
            }
        }
        Ok(())
    }

    /// Resolve the negative prompts against the configured defaults.
    ///
    /// Empty negative prompts become `default`; otherwise every `$` is
    /// replaced by `default`, so users can extend the stock list.
    pub fn mix_negative_prompts(&mut self, default: &str) {
        if self.negative_prompts.is_empty() {
            self.negative_prompts = default.to_string();
        } else {
            self.negative_prompts = self.negative_prompts.replace('$', default);
        }
    }

    /// Template for running the same job again with a fresh seed.
    pub fn follow_up(&self, comment: Option<String>) -> Self {
        Self {
            seed: None,
            comment,
            ..self.clone()
        }
    }

    /// Template for an image-to-image job seeded from a previous result.
    ///
    /// Uses the first result image and sizes the job with
    /// [`select_best_tensor_size`].
    pub fn repaint_from(&self, result: &ProcessResult, comment: Option<String>) -> Result<Self> {
        let image = result
            .images
            .first()
            .ok_or_else(|| SdError::Validation("Result has no images".into()))?;
        let (width, height) = select_best_tensor_size(result.width, result.height)?;

        Ok(Self {
            width,
            height,
            prompts: self.prompts.clone(),
            negative_prompts: self.negative_prompts.clone(),
            count: self.count,
            steps: self.steps,
            scale: self.scale,
            denoise: self.denoise,
            images: Some(vec![image.clone()]),
            resize_mode: self.resize_mode,
            seed: self.seed,
            module: self.module.clone(),
            comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    #[test]
    fn test_defaults() {
        let args = ProcessArguments::default();
        assert_eq!((args.width, args.height), (512, 512));
        assert_eq!(args.count, 1);
        assert_eq!(args.steps, 30);
        assert_eq!(args.scale, 12.0);
        assert_eq!(args.denoise, 0.7);
        assert_eq!(args.resize_mode, 2);
        assert!(args.images.is_none());
        assert!(args.seed.is_none());
        assert!(args.module.is_none());
    }

    #[test]
    fn test_clamping_bounds() {
        let mut args = ProcessArguments::new("x").steps(999);
        args.limit_args_range();
        assert_eq!(args.steps, 50);

        let mut args = ProcessArguments::new("x").steps(0);
        args.limit_args_range();
        assert_eq!(args.steps, 1);

        let mut args = ProcessArguments::new("x")
            .scale(100.0)
            .denoise(0.0)
            .resize_mode(9);
        args.limit_args_range();
        assert_eq!(args.scale, 30.0);
        assert_eq!(args.denoise, 0.1);
        assert_eq!(args.resize_mode, 2);
    }

    #[test]
    fn test_nan_takes_default() {
        let mut args = ProcessArguments::new("x").scale(f64::NAN).denoise(f64::NAN);
        args.limit_args_range();
        assert_eq!(args.scale, 12.0);
        assert_eq!(args.denoise, 0.7);
    }

    #[test]
    fn test_clamping_is_idempotent() {
        let samples = [
            ProcessArguments::default(),
            ProcessArguments::new("a").steps(-5).scale(-1.0).denoise(7.0).resize_mode(-1),
            ProcessArguments::new("b").steps(i64::MAX).scale(f64::INFINITY),
            ProcessArguments::new("c").scale(f64::NEG_INFINITY).denoise(f64::NAN),
            ProcessArguments::new("d").steps(25).scale(7.5).denoise(0.35).resize_mode(1),
        ];
        for sample in samples {
            let mut once = sample.clone();
            once.limit_args_range();
            let mut twice = once.clone();
            twice.limit_args_range();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_validate() {
        let modules = vec!["waifu".to_string()];
        assert!(ProcessArguments::new("cat").validate(&modules).is_ok());
        assert!(ProcessArguments::new("cat").module("waifu").validate(&modules).is_ok());

        let err = ProcessArguments::new("  ").validate(&modules).unwrap_err();
        assert!(matches!(err, SdError::Validation(_)));

        let err = ProcessArguments::new("cat")
            .size(500, 512)
            .validate(&modules)
            .unwrap_err();
        assert!(matches!(err, SdError::Validation(_)));

        let err = ProcessArguments::new("cat")
            .module("unknown")
            .validate(&modules)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid arguments: Module 'unknown' is not available"
        );
    }

    #[test]
    fn test_mix_negative_prompts() {
        let mut args = ProcessArguments::new("x");
        args.mix_negative_prompts("lowres");
        assert_eq!(args.negative_prompts, "lowres");

        let mut args = ProcessArguments::new("x").negative("$, extra arms");
        args.mix_negative_prompts("lowres");
        assert_eq!(args.negative_prompts, "lowres, extra arms");

        let mut args = ProcessArguments::new("x").negative("only this");
        args.mix_negative_prompts("lowres");
        assert_eq!(args.negative_prompts, "only this");
    }

    #[test]
    fn test_clone_is_deep() {
        let original = ProcessArguments::new("x").images(vec![vec![1, 2, 3]]);
        let mut copy = original.clone();
        copy.images.as_mut().unwrap()[0].push(4);
        assert_eq!(original.images, Some(vec![vec![1, 2, 3]]));
    }

    #[test]
    fn test_follow_up_drops_seed() {
        let args = ProcessArguments::new("x").seed(5).comment("old");
        let next = args.follow_up(Some("new".into()));
        assert_eq!(next.seed, None);
        assert_eq!(next.comment.as_deref(), Some("new"));
        assert_eq!(next.prompts, "x");
    }

    #[test]
    fn test_repaint_from_result() {
        let result = ProcessResult {
            task_id: TaskId::Number(1),
            width: 576,
            height: 960,
            images: vec![vec![9, 9], vec![8, 8]],
            seed: Some(77),
        };
        let args = ProcessArguments::new("x").seed(77);
        let next = args.repaint_from(&result, None).unwrap();

        assert_eq!(next.images, Some(vec![vec![9, 9]]));
        assert_eq!(next.width % 64, 0);
        assert_eq!(next.height % 64, 0);
        assert_eq!(next.seed, Some(77));
    }

    #[test]
    fn test_repaint_from_empty_result() {
        let result = ProcessResult {
            task_id: TaskId::Number(1),
            width: 512,
            height: 512,
            images: Vec::new(),
            seed: None,
        };
        assert!(ProcessArguments::default().repaint_from(&result, None).is_err());
    }
}
