//! Concurrent loading of index snapshots from a snapshot tree
//!
//! The tree is laid out as `<root>/<channel>/<distro>_<arch>/Packages`.
//! Each (channel, binary platform) file is read independently; a file that
//! cannot be read leaves its column without a snapshot and never aborts the
//! load of the others.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{info, warn};

use crate::snapshot::error::LoadError;
use crate::snapshot::index::{IndexEntry, parse_index};
use crate::snapshot::store::SnapshotStore;
use crate::status::types::Platform;

/// File name of an index inside a platform directory
pub const INDEX_FILE_NAME: &str = "Packages";

/// Parsed snapshot of one (channel, platform)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSnapshot {
    pub channel: String,
    pub platform: Platform,
    pub entries: Vec<IndexEntry>,
}

/// Path of the index file for one (channel, platform)
pub fn index_path(root: &Path, channel: &str, platform: &Platform) -> PathBuf {
    root.join(channel).join(platform.key()).join(INDEX_FILE_NAME)
}

async fn load_snapshot(
    root: &Path,
    channel: &str,
    platform: &Platform,
) -> Result<LoadedSnapshot, LoadError> {
    let path = index_path(root, channel, platform);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

    let entries = parse_index(&content);
    info!(
        "Loaded {} entries for {}/{}",
        entries.len(),
        channel,
        platform
    );

    Ok(LoadedSnapshot {
        channel: channel.to_string(),
        platform: platform.clone(),
        entries,
    })
}

/// Load every (channel, binary platform) snapshot under `root` concurrently.
///
/// Source pseudo-platforms are skipped: their versions are derived from the
/// binary records. Fails only when no snapshot at all could be loaded.
pub async fn load_snapshots(
    root: &Path,
    channels: &[String],
    platforms: &[Platform],
) -> Result<Vec<LoadedSnapshot>, LoadError> {
    let futures = channels.iter().flat_map(|channel| {
        platforms
            .iter()
            .filter(|platform| !platform.is_source())
            .map(move |platform| load_snapshot(root, channel, platform))
    });

    let snapshots: Vec<LoadedSnapshot> = join_all(futures)
        .await
        .into_iter()
        .filter_map(|result| {
            result
                .inspect_err(|e| warn!("Source unavailable: {}", e))
                .ok()
        })
        .collect();

    if snapshots.is_empty() {
        return Err(LoadError::NoUsableSnapshots(root.to_path_buf()));
    }

    Ok(snapshots)
}

/// Load a snapshot tree and replace the matching snapshots in the store.
///
/// Configured columns whose index could not be read lose their stored
/// snapshot. Returns the number of snapshots imported.
pub async fn import_snapshots(
    store: &SnapshotStore,
    root: &Path,
    channels: &[String],
    platforms: &[Platform],
) -> Result<usize, LoadError> {
    let snapshots = load_snapshots(root, channels, platforms).await?;

    let unavailable: Vec<(String, Platform)> = channels
        .iter()
        .flat_map(|channel| {
            platforms
                .iter()
                .filter(|platform| !platform.is_source())
                .map(move |platform| (channel.clone(), platform.clone()))
        })
        .filter(|(channel, platform)| {
            !snapshots
                .iter()
                .any(|s| &s.channel == channel && &s.platform == platform)
        })
        .collect();

    store.sync_snapshots(&snapshots, &unavailable)?;

    info!(
        "Imported {} snapshots from {:?}, {} unavailable",
        snapshots.len(),
        root,
        unavailable.len()
    );
    Ok(snapshots.len())
}
