//! Builds the asset list of a folder from a storage listing.

use crate::models::{label_file_name, ocr_file_name, Asset, AssetState, LabelData, LabelingState};
use std::collections::HashSet;
use storage::{StorageError, StorageProvider};
use tracing::{debug, warn};

/// Lists the labelable assets under `folder` with their state derived from sidecar files.
pub async fn get_assets(
    storage: &dyn StorageProvider,
    folder: Option<&str>,
) -> Result<Vec<Asset>, StorageError> {
    let files = storage.list_files(folder).await?;
    let index: HashSet<&str> = files.iter().map(String::as_str).collect();
    let built =
        futures::future::try_join_all(files.iter().map(|f| build_asset(storage, f, &index)))
            .await?;
    let assets: Vec<Asset> = built.into_iter().flatten().collect();
    debug!(files = files.len(), assets = assets.len(), ?folder, "assets listed");
    Ok(assets)
}

/// Same as [`get_assets`] for one key; `None` when it is not listed or not labelable.
pub async fn get_asset(
    storage: &dyn StorageProvider,
    folder: Option<&str>,
    name: &str,
) -> Result<Option<Asset>, StorageError> {
    let files = storage.list_files(folder).await?;
    if !files.iter().any(|f| f == name) {
        return Ok(None);
    }
    let index: HashSet<&str> = files.iter().map(String::as_str).collect();
    build_asset(storage, name, &index).await
}

async fn build_asset(
    storage: &dyn StorageProvider,
    key: &str,
    files: &HashSet<&str>,
) -> Result<Option<Asset>, StorageError> {
    let url = storage.get_url(key).await?;
    let mut asset = Asset::from_file_path(&url, key);
    if !asset.asset_type.is_supported() {
        return Ok(None);
    }

    let label_file = label_file_name(&asset.name);
    if files.contains(label_file.as_str()) {
        asset.state = AssetState::Tagged;
        let json = storage.read_text(&label_file).await?;
        match serde_json::from_str::<LabelData>(&json) {
            Ok(label) => {
                asset.labeling_state =
                    Some(label.labeling_state.unwrap_or(LabelingState::ManuallyLabeled));
                asset.schema = label.schema;
            }
            Err(err) => {
                warn!(%label_file, error = %err, "unreadable label file");
                asset.labeling_state = Some(LabelingState::ManuallyLabeled);
            }
        }
    } else if files.contains(ocr_file_name(&asset.name).as_str()) {
        asset.state = AssetState::Visited;
    } else {
        asset.state = AssetState::NotVisited;
    }
    Ok(Some(asset))
}
