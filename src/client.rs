use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::args::ProcessArguments;
use crate::config::ClientConfig;
use crate::error::{Result, SdError};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ProcessResult, TaskId, TaskOutput, TaskState, TaskStatus};

const TASK_SERVICE: &str = "Task";

fn encode_image(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Txt2ImgPayload<'a> {
    width: u32,
    height: u32,
    prompts: &'a str,
    negative_prompts: &'a str,
    count: u32,
    steps: i64,
    scale: f64,
    seed: Option<i64>,
    module: Option<&'a str>,
    comment: Option<&'a str>,
}

impl<'a> Txt2ImgPayload<'a> {
    fn new(args: &'a ProcessArguments) -> Self {
        Self {
            width: args.width,
            height: args.height,
            prompts: &args.prompts,
            negative_prompts: &args.negative_prompts,
            count: args.count,
            steps: args.clamped_steps(),
            scale: args.clamped_scale(),
            seed: args.seed,
            module: args.module.as_deref(),
            comment: args.comment.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Img2ImgPayload<'a> {
    #[serde(flatten)]
    base: Txt2ImgPayload<'a>,
    denoise: f64,
    resize_mode: i64,
    initial_images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UpscalePayload<'a> {
    image: String,
    scale: f64,
    comment: Option<&'a str>,
}

/// Async client for a submit/poll image generation backend.
///
/// Every job is submitted with one request and then polled with
/// `getTaskState` until it finishes or fails. Clones share the underlying
/// transport (and so the HTTP connection pool), so one client can serve
/// many concurrent jobs.
///
/// # Example
/// ```no_run
/// use sd_task_client::{ClientConfig, ProcessArguments, TaskClient};
///
/// # async fn example() -> sd_task_client::Result<()> {
/// let client = TaskClient::new(ClientConfig::new("http://127.0.0.1:8080", "secret"));
///
/// let args = ProcessArguments::new("a cat wearing a tiny hat").size(576, 960);
/// let result = client
///     .txt2img(&args, |p| println!("{:.0}%", p * 100.0))
///     .await?;
/// println!("seed {:?}, {} image(s)", result.seed, result.images.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskClient<T = HttpTransport> {
    transport: T,
    config: ClientConfig,
    cancellation: Option<Arc<AtomicBool>>,
}

impl TaskClient<HttpTransport> {
    /// Create a client talking HTTP to the configured backend.
    pub fn new(config: ClientConfig) -> Self {
        let transport = HttpTransport::new(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> TaskClient<T> {
    /// Create a client over any [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            transport,
            config,
            cancellation: None,
        }
    }

    /// Set a flag that abandons the job once it becomes `true`.
    ///
    /// The flag is checked before submission, before each poll and after
    /// each wait. Use it on a clone to scope it to one job.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancel);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn check_cancelled(&self) -> Result<()> {
        if let Some(ref cancel) = self.cancellation {
            if cancel.load(Ordering::Relaxed) {
                return Err(SdError::Cancelled);
            }
        }
        Ok(())
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        self.check_cancelled()
    }

    fn validate(&self, args: &ProcessArguments) -> Result<()> {
        args.validate(&self.config.available_modules)
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Generate images from text and wait for them.
    ///
    /// `on_progress` receives the backend's completion fraction while the
    /// task is running, exactly as reported.
    pub async fn txt2img<F>(&self, args: &ProcessArguments, on_progress: F) -> Result<ProcessResult>
    where
        F: FnMut(f64),
    {
        self.validate(args)?;
        let payload = serde_json::to_value(Txt2ImgPayload::new(args))?;
        let task_id = self.submit("submitTxt2ImgTask", &payload).await?;
        self.wait_for_task(&task_id, on_progress).await
    }

    /// Repaint `args.images` guided by the prompts and wait for the result.
    pub async fn img2img<F>(&self, args: &ProcessArguments, on_progress: F) -> Result<ProcessResult>
    where
        F: FnMut(f64),
    {
        self.validate(args)?;
        let images = match &args.images {
            Some(images) if !images.is_empty() => images,
            _ => {
                return Err(SdError::Validation(
                    "Image-to-image needs at least one initial image".into(),
                ))
            }
        };

        let payload = serde_json::to_value(Img2ImgPayload {
            base: Txt2ImgPayload::new(args),
            denoise: args.clamped_denoise(),
            resize_mode: args.clamped_resize_mode(),
            initial_images: images.iter().map(|img| encode_image(img)).collect(),
        })?;
        let task_id = self.submit("submitImg2ImgTask", &payload).await?;
        self.wait_for_task(&task_id, on_progress).await
    }

    /// Upscale one image by `scale`, which must lie in `(1, 4]`.
    ///
    /// The returned result never carries a seed.
    pub async fn upscale(
        &self,
        image: &[u8],
        scale: f64,
        comment: Option<&str>,
    ) -> Result<ProcessResult> {
        if !(scale > 1.0 && scale <= 4.0) {
            return Err(SdError::Validation(format!(
                "Upscale factor {} is outside (1, 4]",
                scale
            )));
        }

        let payload = serde_json::to_value(UpscalePayload {
            image: encode_image(image),
            scale,
            comment,
        })?;
        let task_id = self.submit("submitUpscaleTask", &payload).await?;
        let mut result = self.wait_for_task(&task_id, |_| {}).await?;
        result.seed = None;
        Ok(result)
    }

    async fn submit(&self, method: &str, payload: &Value) -> Result<TaskId> {
        self.check_cancelled()?;
        let data = self
            .transport
            .call(TASK_SERVICE, method, payload, self.config.poll.request_timeout)
            .await?;
        let task_id: TaskId = serde_json::from_value(data).map_err(|e| {
            SdError::InvalidResponse(format!("{} returned no task id: {}", method, e))
        })?;
        tracing::debug!(method, task_id = %task_id, "task submitted");
        Ok(task_id)
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// Query the current state of a task once.
    pub async fn task_state(&self, task_id: &TaskId) -> Result<TaskState> {
        let data = self
            .transport
            .call(
                TASK_SERVICE,
                "getTaskState",
                &json!({ "taskId": task_id }),
                self.config.poll.state_timeout,
            )
            .await?;
        TaskState::from_value(data)
    }

    /// Poll a submitted task until it finishes or fails.
    pub async fn wait_for_task<F>(&self, task_id: &TaskId, on_progress: F) -> Result<ProcessResult>
    where
        F: FnMut(f64),
    {
        let output = self.poll_until_finished(task_id, on_progress).await?;
        output.into_result(task_id.clone())
    }

    async fn poll_until_finished<F>(&self, task_id: &TaskId, mut on_progress: F) -> Result<TaskOutput>
    where
        F: FnMut(f64),
    {
        let poll = &self.config.poll;
        let mut failures: u32 = 0;
        let mut last_status: Option<TaskStatus> = None;

        loop {
            self.check_cancelled()?;

            let state = match self.task_state(task_id).await {
                Ok(state) => state,
                Err(e) if e.is_retryable() => {
                    failures += 1;
                    if failures >= poll.max_network_retries {
                        tracing::error!(task_id = %task_id, failures, error = %e, "giving up on task");
                        return Err(e);
                    }
                    tracing::warn!(task_id = %task_id, failures, error = %e, "task state query failed, retrying");
                    self.pause(poll.retry_delay).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            failures = 0;
            let status = state.status();
            if last_status != Some(status) {
                tracing::debug!(task_id = %task_id, status = status.as_str(), "task status changed");
                last_status = Some(status);
            }

            match state {
                TaskState::Pending => self.pause(poll.pending_interval).await?,
                TaskState::Running { progress } => {
                    if let Some(progress) = progress {
                        on_progress(progress);
                    }
                    self.pause(poll.running_interval).await?;
                }
                TaskState::Finished(output) => {
                    tracing::info!(task_id = %task_id, images = output.images.len(), "task finished");
                    return Ok(output);
                }
                TaskState::Error { message } => {
                    tracing::debug!(task_id = %task_id, error = %message, "task failed");
                    return Err(SdError::Task(message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txt2img_payload_shape() {
        let args = ProcessArguments::new("cat")
            .negative("dog")
            .steps(99)
            .module("waifu")
            .comment("{}");
        let value = serde_json::to_value(Txt2ImgPayload::new(&args)).unwrap();

        assert_eq!(
            value,
            json!({
                "width": 512,
                "height": 512,
                "prompts": "cat",
                "negativePrompts": "dog",
                "count": 1,
                "steps": 50,
                "scale": 12.0,
                "seed": null,
                "module": "waifu",
                "comment": "{}"
            })
        );
    }

    #[test]
    fn test_img2img_payload_flattens_base_fields() {
        let args = ProcessArguments::new("cat")
            .denoise(0.0)
            .resize_mode(1)
            .seed(3)
            .images(vec![b"hello".to_vec()]);
        let payload = Img2ImgPayload {
            base: Txt2ImgPayload::new(&args),
            denoise: args.clamped_denoise(),
            resize_mode: args.clamped_resize_mode(),
            initial_images: vec![encode_image(b"hello")],
        };
        let value = serde_json::to_value(payload).unwrap();

        assert_eq!(value["prompts"], "cat");
        assert_eq!(value["seed"], 3);
        assert_eq!(value["denoise"], 0.1);
        assert_eq!(value["resizeMode"], 1);
        assert_eq!(value["initialImages"], json!(["aGVsbG8="]));
    }

    #[test]
    fn test_upscale_payload_shape() {
        let value = serde_json::to_value(UpscalePayload {
            image: encode_image(b"hello"),
            scale: 2.0,
            comment: None,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"image": "aGVsbG8=", "scale": 2.0, "comment": null})
        );
    }

    #[test]
    fn test_client_builder() {
        let cancel = Arc::new(AtomicBool::new(false));
        let client = TaskClient::new(ClientConfig::new("http://127.0.0.1:8080", "s"))
            .with_cancellation(cancel.clone());

        assert!(client.check_cancelled().is_ok());
        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(client.check_cancelled(), Err(SdError::Cancelled)));
    }
}
