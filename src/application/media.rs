//! Image URL generation.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::try_join_all;
use lru::LruCache;
use url::Url;
use uuid::Uuid;

use crate::application::repos::{MediaError, MediaUrls};
use crate::cache::lock_or_recover;
use crate::domain::entities::PersonImageRecord;
use crate::domain::snapshots::{ImageSnapshot, ImageUrls};
use crate::domain::types::ImageVariant;

const SOURCE: &str = "application::media";

/// Builds `{base}/images/{id}?w={width}&q={quality}` URLs.
#[derive(Debug, Clone)]
pub struct PublicMediaUrls {
    base: Url,
}

impl PublicMediaUrls {
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }

    fn build(&self, image_id: Uuid, variant: ImageVariant) -> Result<String, MediaError> {
        let mut url = self
            .base
            .join(&format!("images/{image_id}"))
            .map_err(|err| MediaError::InvalidUrl {
                image_id,
                message: err.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("w", &variant.width().to_string())
            .append_pair("q", &variant.quality().to_string());
        Ok(url.into())
    }
}

#[async_trait]
impl MediaUrls for PublicMediaUrls {
    async fn image_url(
        &self,
        image_id: Uuid,
        variant: ImageVariant,
    ) -> Result<String, MediaError> {
        self.build(image_id, variant)
    }
}

/// LRU memo in front of another [`MediaUrls`] implementation.
pub struct CachedMediaUrls<M> {
    inner: M,
    entries: Mutex<LruCache<(Uuid, ImageVariant), String>>,
}

impl<M: MediaUrls> CachedMediaUrls<M> {
    pub fn new(inner: M, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<M: MediaUrls> MediaUrls for CachedMediaUrls<M> {
    async fn image_url(
        &self,
        image_id: Uuid,
        variant: ImageVariant,
    ) -> Result<String, MediaError> {
        let key = (image_id, variant);
        let cached = lock_or_recover(&self.entries, SOURCE, "get").get(&key).cloned();
        if let Some(url) = cached {
            return Ok(url);
        }

        let url = self.inner.image_url(image_id, variant).await?;
        lock_or_recover(&self.entries, SOURCE, "put").put(key, url.clone());
        Ok(url)
    }
}

/// All three renditions of one image.
pub async fn image_urls(media: &dyn MediaUrls, image_id: Uuid) -> Result<ImageUrls, MediaError> {
    let (thumbnail, card, full) = futures::try_join!(
        media.image_url(image_id, ImageVariant::Thumbnail),
        media.image_url(image_id, ImageVariant::Card),
        media.image_url(image_id, ImageVariant::Full),
    )?;
    Ok(ImageUrls {
        thumbnail,
        card,
        full,
    })
}

pub async fn optional_image_urls(
    media: &dyn MediaUrls,
    image_id: Option<Uuid>,
) -> Result<Option<ImageUrls>, MediaError> {
    match image_id {
        Some(id) => image_urls(media, id).await.map(Some),
        None => Ok(None),
    }
}

pub async fn optional_image_url(
    media: &dyn MediaUrls,
    image_id: Option<Uuid>,
    variant: ImageVariant,
) -> Result<Option<String>, MediaError> {
    match image_id {
        Some(id) => media.image_url(id, variant).await.map(Some),
        None => Ok(None),
    }
}

/// Attach URLs to every image, preserving order.
pub async fn image_snapshots(
    media: &dyn MediaUrls,
    images: Vec<PersonImageRecord>,
) -> Result<Vec<ImageSnapshot>, MediaError> {
    try_join_all(images.into_iter().map(|image| async move {
        let urls = image_urls(media, image.image_id).await?;
        Ok::<_, MediaError>(ImageSnapshot {
            id: image.image_id,
            alt_text: image.alt_text,
            caption: image.caption,
            width: image.width,
            height: image.height,
            urls,
        })
    }))
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingMedia {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaUrls for CountingMedia {
        async fn image_url(
            &self,
            image_id: Uuid,
            variant: ImageVariant,
        ) -> Result<String, MediaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{image_id}/{}", variant.width()))
        }
    }

    #[tokio::test]
    async fn public_urls_carry_width_and_quality() {
        let media = PublicMediaUrls::new(Url::parse("https://cdn.example.com/media").unwrap());
        let id = Uuid::nil();
        let url = media.image_url(id, ImageVariant::Card).await.unwrap();
        assert_eq!(
            url,
            "https://cdn.example.com/media/images/00000000-0000-0000-0000-000000000000?w=480&q=80"
        );
    }

    #[tokio::test]
    async fn lru_memoizes_per_variant() {
        let media = CachedMediaUrls::new(
            CountingMedia {
                calls: AtomicUsize::new(0),
            },
            NonZeroUsize::new(8).unwrap(),
        );
        let id = Uuid::new_v4();

        media.image_url(id, ImageVariant::Thumbnail).await.unwrap();
        media.image_url(id, ImageVariant::Thumbnail).await.unwrap();
        media.image_url(id, ImageVariant::Full).await.unwrap();

        assert_eq!(media.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(media.len(), 2);
    }

    #[tokio::test]
    async fn snapshots_keep_image_order() {
        let media = PublicMediaUrls::new(Url::parse("https://cdn.example.com/").unwrap());
        let images = (0..3)
            .map(|position| PersonImageRecord {
                image_id: Uuid::new_v4(),
                position,
                alt_text: format!("image {position}"),
                caption: None,
                width: 800,
                height: 600,
            })
            .collect::<Vec<_>>();
        let ids: Vec<Uuid> = images.iter().map(|image| image.image_id).collect();

        let snapshots = image_snapshots(&media, images).await.unwrap();
        let snapshot_ids: Vec<Uuid> = snapshots.iter().map(|image| image.id).collect();
        assert_eq!(snapshot_ids, ids);
        assert!(snapshots[0].urls.thumbnail.ends_with("w=160&q=70"));
    }
}
