//! Persisting generated images.

use std::path::{Path, PathBuf};

use easel_comfyui::GeneratedImages;

/// File name for the `index`-th image of `node_id`.
pub fn image_file_name(node_id: &str, index: usize) -> String {
    format!("{node_id}_{index}.png")
}

/// Write every image to `dir` as `{node_id}_{index}.png`, creating the
/// directory if needed. Returns the written paths in manifest order.
pub async fn write_images(dir: &Path, images: &GeneratedImages) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::new();
    for (node_id, blobs) in images {
        for (index, bytes) in blobs.iter().enumerate() {
            let path = dir.join(image_file_name(node_id, index));
            tokio::fs::write(&path, bytes).await?;
            tracing::debug!(path = %path.display(), size = bytes.len(), "Wrote image");
            written.push(path);
        }
    }
    Ok(written)
}
