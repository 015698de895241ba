//! # sd-task-client
//!
//! Async Rust client for a Stable Diffusion task backend that only speaks
//! an asynchronous submit/poll HTTP protocol.
//!
//! Provides a typed client for text-to-image, image-to-image and upscale
//! jobs with progress callbacks, network retry and cooperative
//! cancellation, a compact `key: value` argument grammar for human-typed
//! job parameters, and a size quantizer that keeps images inside the GPU
//! block budget.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sd_task_client::{grammar, quantize, ClientConfig, TaskClient};
//!
//! # async fn example() -> sd_task_client::Result<()> {
//! let config = ClientConfig::from_file("config.json")?;
//! let client = TaskClient::new(config.clone());
//!
//! // Parse what the user typed
//! let mut args = grammar::parse("prompts: a castle in the clouds negative: $, text seed: 42")?;
//! args.mix_negative_prompts(&config.default_negative_prompts);
//! (args.width, args.height) = quantize::best_tensor_size("landscape");
//!
//! // Submit and wait, reporting progress
//! let result = client
//!     .txt2img(&args, |p| println!("{:.2} %", p * 100.0))
//!     .await?;
//!
//! for (i, image) in result.images.iter().enumerate() {
//!     std::fs::write(format!("{}.png", i + 1), image)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod client;
pub mod config;
pub mod error;
pub mod grammar;
pub mod quantize;
pub mod transport;
pub mod types;

pub use args::ProcessArguments;
pub use client::TaskClient;
pub use config::{ClientConfig, PollConfig};
pub use error::{NetworkErrorKind, Result, SdError};
pub use grammar::{parse, ParseError};
pub use quantize::{best_tensor_size, select_best_tensor_size, Orientation};
pub use transport::{HttpTransport, Transport};
pub use types::{Attribution, ProcessResult, TaskId, TaskState, TaskStatus};
