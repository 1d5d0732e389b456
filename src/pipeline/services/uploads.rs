use crate::collaborators::ObjectStore;
use crate::common::ProcessedImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    Uploaded(String),
    /// Upload failed or the store declined; the local copy is authoritative.
    LocalOnly,
}

/// Side table of background upload outcomes, keyed by session.
#[derive(Clone, Default)]
pub struct UploadTable {
    entries: Arc<Mutex<HashMap<Uuid, UploadState>>>,
}

impl UploadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fire-and-forget upload. Its result lands in the table only if
    /// the session entry still exists when the upload finishes.
    pub fn spawn_upload(
        &self,
        store: Arc<dyn ObjectStore>,
        session_id: Uuid,
        image: ProcessedImage,
    ) -> JoinHandle<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(session_id, UploadState::Pending);
        }
        let entries = self.entries.clone();
        tokio::spawn(async move {
            let state = match store.upload(&image).await {
                Ok(Some(url)) => {
                    info!(session_id = %session_id, url = %url, "Image uploaded");
                    UploadState::Uploaded(url)
                }
                Ok(None) => {
                    debug!(session_id = %session_id, "Store kept no remote copy");
                    UploadState::LocalOnly
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Image upload failed");
                    UploadState::LocalOnly
                }
            };
            let Ok(mut entries) = entries.lock() else {
                return;
            };
            match entries.get_mut(&session_id) {
                Some(slot) => *slot = state,
                None => debug!(session_id = %session_id, "Upload finished for discarded session"),
            }
        })
    }

    pub fn state(&self, session_id: Uuid) -> Option<UploadState> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&session_id).cloned())
    }

    /// Removes and returns the entry for `session_id`.
    pub fn take(&self, session_id: Uuid) -> Option<UploadState> {
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.remove(&session_id))
    }

    pub fn remove(&self, session_id: Uuid) {
        self.take(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FixtureCollaborators, Scripted};
    use image::DynamicImage;

    fn image() -> ProcessedImage {
        ProcessedImage::Original(Arc::new(DynamicImage::new_rgb8(2, 2)))
    }

    fn store(upload: Scripted<Option<String>>) -> Arc<dyn ObjectStore> {
        Arc::new(FixtureCollaborators {
            upload,
            ..FixtureCollaborators::default()
        })
    }

    #[tokio::test]
    async fn successful_upload_records_url() {
        let table = UploadTable::new();
        let id = Uuid::new_v4();
        table
            .spawn_upload(store(Scripted::reply(Some("https://cdn/x.jpg".into()))), id, image())
            .await
            .unwrap();
        assert_eq!(
            table.state(id),
            Some(UploadState::Uploaded("https://cdn/x.jpg".into()))
        );
    }

    #[tokio::test]
    async fn failed_upload_keeps_local_copy() {
        let table = UploadTable::new();
        let id = Uuid::new_v4();
        table
            .spawn_upload(store(Scripted::fail("offline")), id, image())
            .await
            .unwrap();
        assert_eq!(table.take(id), Some(UploadState::LocalOnly));
        assert_eq!(table.state(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_session_is_not_resurrected() {
        let table = UploadTable::new();
        let id = Uuid::new_v4();
        let handle = table.spawn_upload(
            store(Scripted::delayed(Some("https://cdn/late.jpg".into()), 1_000)),
            id,
            image(),
        );
        assert_eq!(table.state(id), Some(UploadState::Pending));
        table.remove(id);
        handle.await.unwrap();
        assert_eq!(table.state(id), None);
    }
}
