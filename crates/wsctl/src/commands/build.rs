use anyhow::Result;
use wsctl_core::{identity::SHARED_IMAGE_TAG, paths, state::StateStore};

use crate::commands::context::{docker, shared_image_build_context};
use crate::ui::spinner::PlainSpinner;

pub async fn run(no_cache: bool) -> Result<()> {
    let docker = docker();
    docker.check_installed().await?;

    let spinner = PlainSpinner::start("Building shared workspace image...");
    let context_dir = shared_image_build_context();
    let log_path = paths::logs_dir().join("build.log");
    match docker
        .build_image(SHARED_IMAGE_TAG, &context_dir, no_cache, &log_path)
        .await
    {
        Ok(()) => spinner.finish_with_message("Shared workspace image built"),
        Err(e) => {
            spinner.fail_with_message("Image build failed");
            return Err(e.into());
        }
    }

    let store = StateStore::default_path();
    store.record_shared_image_build(chrono::Utc::now())?;
    Ok(())
}
