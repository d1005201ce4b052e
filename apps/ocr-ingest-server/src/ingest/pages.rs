//! Page image enumeration

use std::io;

use super::artifacts::ArtifactPaths;
use super::types::{IngestError, PageImage};

/// List this document's page images in ascending page order.
///
/// Ordering uses the page number parsed from the file name, never the raw
/// directory order, so `-10.png` always follows `-9.png`.
pub async fn scan_page_images(paths: &ArtifactPaths) -> io::Result<Vec<PageImage>> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(paths.page_dir()).await?;

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(index) = paths.page_index(name) {
            pages.push(PageImage {
                index,
                path: entry.path(),
            });
        }
    }

    pages.sort_by_key(|page| page.index);
    Ok(pages)
}

/// Pages produced by the rasterizer; an empty result is an error
pub async fn enumerate_pages(paths: &ArtifactPaths) -> Result<Vec<PageImage>, IngestError> {
    let pages = scan_page_images(paths)
        .await
        .map_err(|e| IngestError::Storage(format!("failed to find images: {}", e)))?;

    if pages.is_empty() {
        return Err(IngestError::NoPagesProduced);
    }

    Ok(pages)
}
