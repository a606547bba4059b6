use tracing::{info, warn};
use uuid::Uuid;

use super::{category_in, Form, Resource};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::FieldValue;
use crate::uploads::{log_progress, object_key, remove_quietly, upload, StoredMedia, UploadRequest};

/// Outcome of a delete. The record is gone either way; the blob may linger.
#[derive(Debug)]
pub struct Deleted<R> {
    pub record: R,
    pub blob_removed: bool,
}

async fn store_file<R: Resource>(
    state: &AppState,
    file: UploadRequest,
    category: crate::category::Category,
) -> Result<StoredMedia, AppError> {
    let key = object_key(&R::media_prefix(category), &file.file_name, &file.content_type);
    let progress = log_progress(&key);
    Ok(upload(state.storage.as_ref(), key.clone(), file, &progress).await?)
}

/// Validate, upload, then write. A failed write releases the fresh blob.
pub async fn create<R: Resource>(
    state: &AppState,
    mut form: Form,
) -> Result<(R, StoredMedia), AppError> {
    let mut fields = R::create_fields(&form)?;
    R::check_references(state, &fields, None).await?;
    let category = category_in(&fields)
        .ok_or_else(|| AppError::validation("category", "Please select a category."))?;
    let file = form
        .take_file()
        .ok_or_else(|| AppError::validation(super::form::FILE_FIELD, "Please select a file."))?;

    let stored = store_file::<R>(state, file, category).await?;
    fields.push((R::MEDIA_COLUMN, FieldValue::Text(stored.key.clone())));

    match R::store(state).create(fields).await {
        Ok(record) => {
            info!(collection = R::COLLECTION, id = %record.id(), key = %stored.key, "record created");
            Ok((record, stored))
        }
        Err(e) => {
            warn!(error = %e, collection = R::COLLECTION, key = %stored.key, "write failed; releasing blob");
            remove_quietly(state.storage.as_ref(), &stored.key).await;
            Err(e.into())
        }
    }
}

/// Partial merge. A new file is uploaded first; the replaced blob is released
/// only after the update commits.
pub async fn update<R: Resource>(
    state: &AppState,
    id: Uuid,
    mut form: Form,
) -> Result<(R, Option<StoredMedia>), AppError> {
    let store = R::store(state);
    let existing = store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", R::NAME)))?;

    let mut fields = R::update_fields(&form)?;
    R::check_references(state, &fields, Some(&existing)).await?;

    let fresh = match form.take_file() {
        Some(file) => {
            let category = category_in(&fields).unwrap_or_else(|| existing.category());
            let stored = store_file::<R>(state, file, category).await?;
            fields.push((R::MEDIA_COLUMN, FieldValue::Text(stored.key.clone())));
            Some(stored)
        }
        None => None,
    };
    if fields.is_empty() {
        return Ok((existing, None));
    }

    match store.update(id, fields).await {
        Ok(updated) => {
            if fresh.is_some() {
                remove_quietly(state.storage.as_ref(), existing.media_key()).await;
            }
            info!(collection = R::COLLECTION, %id, "record updated");
            Ok((updated, fresh))
        }
        Err(e) => {
            if let Some(stored) = fresh {
                warn!(error = %e, collection = R::COLLECTION, key = %stored.key, "update failed; releasing new blob");
                remove_quietly(state.storage.as_ref(), &stored.key).await;
            }
            Err(e.into())
        }
    }
}

/// Record first, then blob. A failed record delete leaves both in place.
pub async fn delete<R: Resource>(state: &AppState, id: Uuid) -> Result<Deleted<R>, AppError> {
    let record = R::store(state).delete(id).await?;
    let blob_removed = remove_quietly(state.storage.as_ref(), record.media_key()).await;
    if blob_removed {
        info!(collection = R::COLLECTION, %id, "record deleted");
    } else {
        warn!(
            collection = R::COLLECTION,
            %id,
            key = record.media_key(),
            "record deleted but its blob remains"
        );
    }
    Ok(Deleted {
        record,
        blob_removed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bytes::Bytes;

    use super::*;
    use crate::category::Category;
    use crate::events::Event;
    use crate::state::AppState;
    use crate::store::Fields;
    use crate::uploads::UploadError;
    use crate::visuals::Visual;

    fn launch() -> Form {
        Form::default()
            .with_text("title", "Launch")
            .with_text("category", "inTheCity")
            .with_text("date", "2024-05-01")
            .with_file("p.jpg".into(), "image/jpeg".into(), Bytes::from_static(b"jpg"))
    }

    fn crowd(event_id: Uuid) -> Form {
        Form::default()
            .with_text("title", "Crowd")
            .with_text("category", "inTheCity")
            .with_text("event_id", &event_id.to_string())
            .with_file("crowd.jpg".into(), "image/jpeg".into(), Bytes::from_static(b"jpg"))
    }

    #[tokio::test]
    async fn create_stores_blob_and_record() {
        let (state, fakes) = AppState::fake_with();
        let (event, stored) = create::<Event>(&state, launch()).await.unwrap();
        assert_eq!(event.title, "Launch");
        assert_eq!(event.category, Category::InTheCity);
        assert_eq!(stored.key, event.picture_key);
        assert_eq!(stored.url, format!("https://fake.local/{}", event.picture_key));
        assert!(fakes.storage.contains(&event.picture_key));
        assert_eq!(fakes.events.len(), 1);
    }

    #[tokio::test]
    async fn invalid_form_touches_neither_store() {
        let (state, fakes) = AppState::fake_with();
        let err = create::<Event>(&state, launch().with_text("title", " ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "title", .. }));
        assert!(fakes.storage.keys().is_empty());
        assert_eq!(fakes.events.len(), 0);
    }

    #[tokio::test]
    async fn upload_failure_persists_no_record() {
        let (state, fakes) = AppState::fake_with();
        fakes.storage.fail_puts.store(true, Ordering::SeqCst);
        let err = create::<Event>(&state, launch()).await.unwrap_err();
        assert!(matches!(err, AppError::Upload(UploadError::Failed(_))));
        assert_eq!(fakes.events.len(), 0);
    }

    #[tokio::test]
    async fn unresolvable_url_leaves_no_blob_or_record() {
        let (state, fakes) = AppState::fake_with();
        fakes.storage.fail_urls.store(true, Ordering::SeqCst);
        let err = create::<Event>(&state, launch()).await.unwrap_err();
        assert!(matches!(err, AppError::Upload(UploadError::Url(_))));
        assert!(fakes.storage.keys().is_empty());
        assert_eq!(fakes.events.len(), 0);
    }

    #[tokio::test]
    async fn failed_write_releases_fresh_blob() {
        let (state, fakes) = AppState::fake_with();
        fakes.events.fail_creates.store(true, Ordering::SeqCst);
        let err = create::<Event>(&state, launch()).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(fakes.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn replacing_the_file_releases_the_old_blob_after_commit() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        let old = event.picture_key.clone();

        let form = Form::default().with_file("new.png".into(), "image/png".into(), Bytes::from_static(b"png"));
        let (updated, fresh) = update::<Event>(&state, event.id, form).await.unwrap();
        let fresh = fresh.unwrap();
        assert_eq!(updated.picture_key, fresh.key);
        assert_eq!(updated.title, "Launch");
        assert!(!fakes.storage.contains(&old));
        assert!(fakes.storage.contains(&fresh.key));
    }

    #[tokio::test]
    async fn failed_update_keeps_old_blob_and_drops_new_one() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        fakes.events.fail_updates.store(true, Ordering::SeqCst);

        let form = Form::default()
            .with_text("title", "Relaunch")
            .with_file("new.png".into(), "image/png".into(), Bytes::from_static(b"png"));
        assert!(update::<Event>(&state, event.id, form).await.is_err());
        assert_eq!(fakes.storage.keys(), [event.picture_key.clone()]);
        assert_eq!(fakes.events.snapshot()[0].title, "Launch");
    }

    #[tokio::test]
    async fn empty_update_writes_nothing() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        fakes.events.fail_updates.store(true, Ordering::SeqCst);
        let (same, fresh) = update::<Event>(&state, event.id, Form::default()).await.unwrap();
        assert_eq!(same.id, event.id);
        assert!(fresh.is_none());
    }

    #[tokio::test]
    async fn delete_removes_record_then_blob() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        let deleted = delete::<Event>(&state, event.id).await.unwrap();
        assert!(deleted.blob_removed);
        assert_eq!(fakes.events.len(), 0);
        assert!(fakes.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn failed_record_delete_keeps_both() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        fakes.events.fail_deletes.store(true, Ordering::SeqCst);
        assert!(delete::<Event>(&state, event.id).await.is_err());
        assert_eq!(fakes.events.len(), 1);
        assert!(fakes.storage.contains(&event.picture_key));
    }

    #[tokio::test]
    async fn failed_blob_delete_is_reported_not_fatal() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        fakes.storage.fail_deletes.store(true, Ordering::SeqCst);
        let deleted = delete::<Event>(&state, event.id).await.unwrap();
        assert!(!deleted.blob_removed);
        assert_eq!(fakes.events.len(), 0);
        assert!(fakes.storage.contains(&event.picture_key));
    }

    #[tokio::test]
    async fn event_cannot_leave_its_linked_visuals_category() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        create::<Visual>(&state, crowd(event.id)).await.unwrap();

        let form = Form::default().with_text("category", "rockingTheDaisies");
        let err = update::<Event>(&state, event.id, form).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "category", .. }));
        assert_eq!(fakes.events.snapshot()[0].category, Category::InTheCity);

        let form = Form::default().with_text("title", "Launch night");
        update::<Event>(&state, event.id, form).await.unwrap();
    }

    #[tokio::test]
    async fn unlinked_event_can_change_category() {
        let (state, _) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        let form = Form::default().with_text("category", "rockingTheDaisies");
        let (moved, _) = update::<Event>(&state, event.id, form).await.unwrap();
        assert_eq!(moved.category, Category::RockingTheDaisies);
    }

    #[tokio::test]
    async fn visual_edits_that_skip_the_link_do_not_recheck_it() {
        let (state, _) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        let (visual, _) = create::<Visual>(&state, crowd(event.id)).await.unwrap();

        // Drift the event out from under the link.
        let drift: Fields = vec![("category", FieldValue::Category(Category::RockingTheDaisies))];
        state.events.update(event.id, drift).await.unwrap();

        let form = Form::default().with_text("title", "Crowd at dusk");
        let (renamed, _) = update::<Visual>(&state, visual.id, form).await.unwrap();
        assert_eq!(renamed.title, "Crowd at dusk");

        let form = Form::default().with_text("category", "inTheCity");
        assert!(update::<Visual>(&state, visual.id, form).await.is_err());
    }

    #[tokio::test]
    async fn visual_link_must_share_category() {
        let (state, fakes) = AppState::fake_with();
        let (event, _) = create::<Event>(&state, launch()).await.unwrap();
        let form = crowd(event.id).with_text("category", "eventsAndTouring");
        let err = create::<Visual>(&state, form).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "event_id", .. }));
        assert_eq!(fakes.visuals.len(), 0);
        assert_eq!(fakes.storage.keys(), [event.picture_key]);
    }
}
