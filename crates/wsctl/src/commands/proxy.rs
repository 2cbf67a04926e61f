use anyhow::{bail, Result};
use std::collections::HashMap;
use wsctl_core::paths;
use wsctl_core::process::run_streaming;
use wsctl_core::state::StateStore;

/// Collapse a sorted port list into consecutive runs so a contiguous range
/// of forwards becomes a single `-L` per port rather than one per port
/// repeated in the help text; each port still gets its own `-L` argument,
/// but adjacent ports are logged as a single range for readability.
fn collapse_ranges(ports: &[u32]) -> Vec<(u32, u32)> {
    let mut ranges = Vec::new();
    let mut iter = ports.iter().copied();
    let Some(mut start) = iter.next() else {
        return ranges;
    };
    let mut end = start;
    for port in iter {
        if port == end + 1 {
            end = port;
        } else {
            ranges.push((start, end));
            start = port;
            end = port;
        }
    }
    ranges.push((start, end));
    ranges
}

pub async fn run(workspace: &str) -> Result<()> {
    let store = StateStore::default_path();
    let record = store
        .get_workspace_state(workspace)?
        .ok_or_else(|| anyhow::anyhow!("no recorded state for workspace '{workspace}'"))?;
    if record.forwards.is_empty() {
        bail!("workspace '{workspace}' has no configured forwards");
    }

    let mut sorted = record.forwards.clone();
    sorted.sort_unstable();
    let ranges = collapse_ranges(&sorted);
    for (start, end) in &ranges {
        if start == end {
            println!("forwarding {start} -> 127.0.0.1:{start}");
        } else {
            println!("forwarding {start}-{end} -> 127.0.0.1:{start}-{end}");
        }
    }

    // The container only ever trusts the host-generated access keypair
    // (its public half is the one written into authorized_keys by the
    // agent); `selected_key` is the user's own git-cloning key and is
    // never installed there, so it can't authenticate this connection.
    let key_path = paths::workspace_ssh_key_path(workspace);
    if !key_path.is_file() {
        bail!(
            "no container-access key found at {} for workspace '{workspace}'; start it first",
            key_path.display()
        );
    }

    let mut args = vec![
        "-N".to_string(),
        "-p".to_string(),
        record.ssh_port.to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-i".to_string(),
        key_path.display().to_string(),
    ];
    for port in &sorted {
        args.push("-L".to_string());
        args.push(format!("{port}:localhost:{port}"));
    }
    args.push("workspace@127.0.0.1".to_string());

    let status = run_streaming("ssh", &args, &HashMap::new()).await?;
    if let Some(code) = status {
        if code != 0 {
            std::process::exit(code);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_consecutive_ports_into_ranges() {
        let ranges = collapse_ranges(&[3000, 5000, 5001, 5002, 8080]);
        assert_eq!(ranges, vec![(3000, 3000), (5000, 5002), (8080, 8080)]);
    }

    #[test]
    fn single_port_is_its_own_range() {
        assert_eq!(collapse_ranges(&[22]), vec![(22, 22)]);
    }

    #[test]
    fn empty_input_yields_no_ranges() {
        assert!(collapse_ranges(&[]).is_empty());
    }
}
