//! UID/GID syncer
//!
//! Rewrites the `workspace` user/group so ownership inside the container
//! matches the host invoker, shifting any numeric conflict out of the way
//! first rather than failing.

use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, warn};
use wsctl_core::process::run_captured;

const SHIFT_ID: &str = "60000";

pub async fn sync() -> Result<()> {
    let host_uid = std::env::var("HOST_UID").ok();
    let host_gid = std::env::var("HOST_GID").ok();

    let (uid, gid) = match (host_uid.and_then(|v| v.parse::<u32>().ok()), host_gid.and_then(|v| v.parse::<u32>().ok())) {
        (Some(uid), Some(gid)) if uid != 0 && gid != 0 => (uid, gid),
        _ => {
            warn!("HOST_UID/HOST_GID missing, zero, or unparseable; skipping uid/gid sync");
            return Ok(());
        }
    };

    if current_ids_match(uid, gid).await {
        info!(uid, gid, "workspace user already has the requested ids");
        return Ok(());
    }

    sync_group(gid).await?;
    sync_user(uid, gid).await?;
    rechown_home(uid, gid).await?;
    Ok(())
}

async fn current_ids_match(uid: u32, gid: u32) -> bool {
    let out = run_captured("id", &["-u", "workspace"], &HashMap::new(), true).await;
    let current_uid = out.ok().and_then(|o| o.stdout.trim().parse::<u32>().ok());
    let out = run_captured("id", &["-g", "workspace"], &HashMap::new(), true).await;
    let current_gid = out.ok().and_then(|o| o.stdout.trim().parse::<u32>().ok());
    current_uid == Some(uid) && current_gid == Some(gid)
}

async fn sync_group(gid: u32) -> Result<()> {
    let gid_s = gid.to_string();
    let out = run_captured("groupmod", &["-g", &gid_s, "workspace"], &HashMap::new(), true).await?;
    if out.success() {
        return Ok(());
    }
    if let Some(conflicting) = group_name_for_gid(gid).await {
        warn!(gid, group = %conflicting, "gid already in use, shifting conflicting group out of the way");
        run_captured("groupmod", &["-g", SHIFT_ID, &conflicting], &HashMap::new(), true).await?;
        run_captured("groupmod", &["-g", &gid_s, "workspace"], &HashMap::new(), false).await?;
    }
    Ok(())
}

async fn sync_user(uid: u32, gid: u32) -> Result<()> {
    let uid_s = uid.to_string();
    let gid_s = gid.to_string();
    let out = run_captured("usermod", &["-u", &uid_s, "-g", &gid_s, "workspace"], &HashMap::new(), true).await?;
    if out.success() {
        return Ok(());
    }
    if let Some(conflicting) = user_name_for_uid(uid).await {
        warn!(uid, user = %conflicting, "uid already in use, shifting conflicting user out of the way");
        run_captured("usermod", &["-u", SHIFT_ID, &conflicting], &HashMap::new(), true).await?;
        run_captured("usermod", &["-u", &uid_s, "-g", &gid_s, "workspace"], &HashMap::new(), false).await?;
    }
    Ok(())
}

async fn rechown_home(uid: u32, gid: u32) -> Result<()> {
    run_captured(
        "chown",
        &["-R", &format!("{uid}:{gid}"), "/home/workspace"],
        &HashMap::new(),
        false,
    )
    .await?;
    Ok(())
}

async fn group_name_for_gid(gid: u32) -> Option<String> {
    let out = run_captured("getent", &["group", &gid.to_string()], &HashMap::new(), true).await.ok()?;
    out.stdout.split(':').next().map(str::to_string)
}

async fn user_name_for_uid(uid: u32) -> Option<String> {
    let out = run_captured("getent", &["passwd", &uid.to_string()], &HashMap::new(), true).await.ok()?;
    out.stdout.split(':').next().map(str::to_string)
}
