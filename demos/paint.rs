//! Paint from a typed argument string and save the results.
//!
//! ```sh
//! RUST_LOG=sd_task_client=debug cargo run --example paint -- \
//!     config.json landscape "prompts: a castle in the clouds negative: $, text steps: 40"
//! ```
//!
//! The optional `upscale` fourth argument upscales the first image 2x.

use anyhow::Context;
use sd_task_client::{grammar, quantize, Attribution, ClientConfig, TaskClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut argv = std::env::args().skip(1);
    let config_path = argv.next().unwrap_or_else(|| "config.json".into());
    let orientation = argv.next().unwrap_or_else(|| "square".into());
    let text = argv
        .next()
        .context("usage: paint <config.json> <orientation> <arguments> [upscale]")?;
    let upscale = argv.next().as_deref() == Some("upscale");

    let config = ClientConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let client = TaskClient::new(config.clone());

    let mut args = grammar::parse(&text)?;
    args.mix_negative_prompts(&config.default_negative_prompts);
    (args.width, args.height) = quantize::best_tensor_size(&orientation);
    args.comment = Some(Attribution::new("cli", "demo", 0, 0).to_comment());
    println!("{}x{} {}", args.width, args.height, args.additional_arguments());

    let result = client
        .txt2img(&args, |p| println!("  {:.2} %", p * 100.0))
        .await?;
    println!(
        "Task {} done, seed {:?}, {} image(s)",
        result.task_id,
        result.seed,
        result.images.len()
    );

    for (i, image) in result.images.iter().enumerate() {
        let path = format!("{}.png", i + 1);
        std::fs::write(&path, image)?;
        println!("Saved {}", path);
    }

    if upscale {
        let first = result.images.first().context("no image to upscale")?;
        let big = client.upscale(first, 2.0, args.comment.as_deref()).await?;
        let image = big.images.first().context("upscale returned no image")?;
        std::fs::write("upscaled.png", image)?;
        println!("Upscaled to {}x{}", big.width, big.height);
    }

    Ok(())
}
