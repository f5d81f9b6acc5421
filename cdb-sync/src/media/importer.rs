//! Media import from legacy records
//!
//! Turns the media entries of a legacy record into registered media objects
//! and an [`ImageCollection`] with at most one main image.

use cdb_common::config::MediaConfig;
use cdb_common::events::MediaAsset;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::identity::IdentityScheme;
use super::normalize::normalize_uri;
use super::store::MediaStore;
use super::MediaError;
use crate::legacy::{ExternalRecord, MediaFile};

/// Legacy media types that denote images
const IMAGE_MEDIA_TYPES: [&str; 2] = ["photo", "imageweb"];

/// Images of one record, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageCollection {
    pub images: Vec<MediaAsset>,
    pub main: Option<Uuid>,
}

impl ImageCollection {
    pub fn main_image(&self) -> Option<&MediaAsset> {
        let main = self.main?;
        self.images.iter().find(|i| i.id == main)
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }
}

/// MIME type for a legacy file type
pub fn mime_type_for(file_type: &str) -> String {
    let file_type = file_type.trim().to_ascii_lowercase();
    match file_type.as_str() {
        "" => "application/octet-stream".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "png" | "gif" | "bmp" | "webp" | "tiff" | "svg+xml" => format!("image/{}", file_type),
        "svg" => "image/svg+xml".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

pub struct MediaImporter {
    store: Arc<dyn MediaStore>,
    identity: IdentityScheme,
    default_description: String,
    default_copyright_holder: String,
}

impl MediaImporter {
    pub fn new(store: Arc<dyn MediaStore>, config: &MediaConfig) -> Result<Self, MediaError> {
        let identity = match config.identifier_pattern.as_deref() {
            Some(pattern) => IdentityScheme::with_pattern(pattern)
                .map_err(|e| MediaError::InvalidPattern(e.to_string()))?,
            None => IdentityScheme::new(),
        };

        Ok(Self {
            store,
            identity,
            default_description: config.default_description.clone(),
            default_copyright_holder: config.default_copyright_holder.clone(),
        })
    }

    /// Register every image of `record` and collect them
    ///
    /// Entries whose link cannot be normalized are skipped with a warning.
    /// Store failures abort the import.
    pub async fn import_media(&self, record: &ExternalRecord) -> Result<ImageCollection, MediaError> {
        let mut collection = ImageCollection::default();
        let mut seen: HashSet<Uuid> = HashSet::new();

        for file in record.media.iter().filter(|f| is_image(f)) {
            let asset = match self.asset_for(file) {
                Ok(asset) => asset,
                Err(e) => {
                    tracing::warn!(id = %record.id, hlink = %file.hlink, error = %e, "Skipping media entry");
                    continue;
                }
            };

            // First main wins, later main flags are demoted
            if file.is_main && collection.main.is_none() {
                collection.main = Some(asset.id);
            }

            if !seen.insert(asset.id) {
                continue;
            }

            self.store.create(&asset).await?;
            collection.images.push(asset);
        }

        tracing::debug!(
            id = %record.id,
            images = collection.len(),
            has_main = collection.main.is_some(),
            "Imported media"
        );

        Ok(collection)
    }

    fn asset_for(&self, file: &MediaFile) -> Result<MediaAsset, MediaError> {
        let normalized = normalize_uri(&file.hlink)?;

        Ok(MediaAsset {
            id: self.identity.derive(&normalized),
            mime_type: mime_type_for(&file.file_type),
            description: non_blank(file.description.as_deref())
                .unwrap_or(&self.default_description)
                .to_string(),
            copyright_holder: non_blank(file.copyright.as_deref())
                .unwrap_or(&self.default_copyright_holder)
                .to_string(),
            source_location: normalized.to_string(),
        })
    }
}

fn is_image(file: &MediaFile) -> bool {
    let media_type = file.media_type.trim().to_ascii_lowercase();
    IMAGE_MEDIA_TYPES.contains(&media_type.as_str())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::identity::derive_asset_id;
    use crate::media::store::SqliteMediaStore;
    use cdb_common::{ExternalId, RecordKind};

    fn file(hlink: &str, media_type: &str, is_main: bool) -> MediaFile {
        MediaFile {
            hlink: hlink.to_string(),
            media_type: media_type.to_string(),
            file_type: "jpeg".to_string(),
            is_main,
            description: None,
            copyright: None,
        }
    }

    fn record(media: Vec<MediaFile>) -> ExternalRecord {
        ExternalRecord {
            id: ExternalId::new("e-1").unwrap(),
            kind: RecordKind::Event,
            external_url: None,
            title: None,
            categories: Vec::new(),
            keywords: Vec::new(),
            location_id: None,
            organizer_id: None,
            media,
        }
    }

    async fn importer() -> (MediaImporter, Arc<SqliteMediaStore>) {
        let pool = crate::db::init_memory_pool().await.unwrap();
        let store = Arc::new(SqliteMediaStore::new(pool));
        let importer = MediaImporter::new(store.clone(), &MediaConfig::default()).unwrap();
        (importer, store)
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for("jpg"), "image/jpeg");
        assert_eq!(mime_type_for("JPEG"), "image/jpeg");
        assert_eq!(mime_type_for("png"), "image/png");
        assert_eq!(mime_type_for("exe"), "application/octet-stream");
        assert_eq!(mime_type_for(""), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_only_images_are_imported_with_defaults() {
        let (importer, store) = importer().await;
        let rec = record(vec![
            file("http://example.com/a.jpg", "photo", false),
            file("http://example.com/page.html", "webresource", false),
            file("http://example.com/b.jpg", "IMAGEWEB", false),
        ]);

        let collection = importer.import_media(&rec).await.unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection.main.is_none());

        let first = &collection.images[0];
        assert_eq!(first.description, "no description");
        assert_eq!(first.copyright_holder, "no copyright");
        assert_eq!(first.mime_type, "image/jpeg");
        assert!(store.get(first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_first_main_wins() {
        let (importer, _) = importer().await;
        let rec = record(vec![
            file("http://example.com/a.jpg", "photo", false),
            file("http://example.com/b.jpg", "photo", true),
            file("http://example.com/c.jpg", "photo", true),
        ]);

        let collection = importer.import_media(&rec).await.unwrap();
        let expected = derive_asset_id(&normalize_uri("http://example.com/b.jpg").unwrap());
        assert_eq!(collection.main, Some(expected));
        assert_eq!(collection.main_image().unwrap().source_location, "http://example.com/b.jpg");
    }

    #[tokio::test]
    async fn test_converging_links_register_once() {
        let (importer, _) = importer().await;
        let rec = record(vec![
            file("http://Example.com/a/../b/img.JPG", "photo", false),
            file("https://example.com/b/img.jpg", "photo", false),
            file("not a link", "photo", false),
        ]);

        let collection = importer.import_media(&rec).await.unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.images[0].source_location, "http://example.com/b/img.jpg");

        // Importing again yields the same identities
        let again = importer.import_media(&rec).await.unwrap();
        assert_eq!(again, collection);
    }

    #[tokio::test]
    async fn test_entry_values_override_defaults() {
        let (importer, _) = importer().await;
        let mut entry = file("http://example.com/a.png", "photo", true);
        entry.file_type = "png".to_string();
        entry.description = Some("Stage".to_string());
        entry.copyright = Some("  ".to_string());

        let collection = importer.import_media(&record(vec![entry])).await.unwrap();
        let asset = collection.main_image().unwrap();
        assert_eq!(asset.description, "Stage");
        assert_eq!(asset.copyright_holder, "no copyright");
        assert_eq!(asset.mime_type, "image/png");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let store: Arc<dyn MediaStore> = Arc::new(NoopStore);
        let config = MediaConfig {
            identifier_pattern: Some("(unclosed".to_string()),
            ..MediaConfig::default()
        };
        assert!(matches!(
            MediaImporter::new(store, &config),
            Err(MediaError::InvalidPattern(_))
        ));
    }

    struct NoopStore;

    #[async_trait::async_trait]
    impl MediaStore for NoopStore {
        async fn create(&self, _asset: &MediaAsset) -> Result<bool, MediaError> {
            Ok(true)
        }

        async fn get(&self, _id: Uuid) -> Result<Option<MediaAsset>, MediaError> {
            Ok(None)
        }
    }
}
