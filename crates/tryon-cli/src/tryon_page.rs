// ============================================================================
// Try-on page: two uploads, a progress indicator, result download
// ============================================================================

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tryon_core::acquisition::{SlotKind, UploadSource};
use tryon_core::session::save_result_png;
use tryon_core::{ClientConfig, HttpTryOnBackend, TryOnError, TryOnSession};

pub struct Args {
    pub person: PathBuf,
    pub outfit: PathBuf,
    pub output: PathBuf,
    pub proxy_url: Option<String>,
    pub timeout: Option<u64>,
}

pub async fn run(args: Args) -> Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = args.proxy_url {
        config.proxy_url = url;
    }
    if let Some(secs) = args.timeout {
        config.request_timeout = Duration::from_secs(secs);
    }

    let backend = HttpTryOnBackend::new(&config);
    println!("Virtual Try-On via {}", backend.endpoint());
    let mut session = TryOnSession::with_backend(Arc::new(backend), config.request_timeout);

    for (kind, path) in [(SlotKind::Person, args.person), (SlotKind::Outfit, args.outfit)] {
        let stored = session
            .upload(kind, &UploadSource::Browse(path.clone()))
            .await?;
        if !stored {
            bail!("{}: {} is not an image file", kind.label(), path.display());
        }
        println!("  {:<13} {}", format!("{}:", kind.label()), path.display());
    }

    if !session.can_try_on() {
        bail!("Please upload both your photo and an outfit image.");
    }

    eprint!("Creating your new look");
    let outcome = {
        let try_on = session.try_on();
        tokio::pin!(try_on);
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                outcome = &mut try_on => break outcome,
                _ = ticker.tick() => eprint!("."),
            }
        }
    };
    eprintln!();

    match outcome {
        Ok(result) => {
            println!("Virtual Try-On Complete! {}", result.message);
            save_result_png(&result.result_image, &args.output)?;
            println!("Your new look: {}", args.output.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Try-on failed: {}", e);
            if let TryOnError::Remote {
                details: Some(details),
                ..
            } = &e
            {
                eprintln!("  {}", details);
            }
            if e.is_retryable() {
                eprintln!("You can try again in a moment.");
            }
            Err(anyhow!(e))
        }
    }
}
