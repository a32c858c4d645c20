//! Attachment handlers

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Action, EntityType, Resource};

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::attachment::{Attachment, AttachmentOwner, UploadedFile};
use crate::services::{Actor, AttachmentService};
use crate::AppState;

fn service(state: &AppState) -> AttachmentService {
    AttachmentService::new(
        state.db.clone(),
        state.storage.clone(),
        state.config.storage.max_upload_bytes,
    )
}

fn parse_owner(entity_type: &str, entity_id: Uuid) -> Result<AttachmentOwner, AppError> {
    let entity_type = entity_type
        .parse::<EntityType>()
        .map_err(|e| AppError::validation("entity_type", e))?;
    Ok(AttachmentOwner {
        entity_type,
        entity_id,
    })
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File exceeds the upload limit".to_string())
    } else {
        AppError::validation("file", err.body_text())
    }
}

/// Drop the attachments of a deleted record. Failures are logged only.
pub(crate) async fn purge_attachments(state: &AppState, entity_type: EntityType, entity_id: Uuid) {
    let owner = AttachmentOwner {
        entity_type,
        entity_id,
    };
    if let Err(e) = service(state).purge(owner).await {
        tracing::warn!(
            entity_type = entity_type.as_str(),
            entity_id = %entity_id,
            error = %e,
            "Failed to purge attachments"
        );
    }
}

/// Upload the `file` part of a multipart form
pub async fn upload_attachment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Attachment>), AppError> {
    user.require(Resource::Attachment, Action::Create)?;
    let owner = parse_owner(&entity_type, entity_id)?;

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        file = Some(UploadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let file = file.ok_or_else(|| AppError::validation("file", "A file part is required"))?;

    let attachment = service(&state)
        .upload(&Actor::user(user.user_id, client.ip), owner, file)
        .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<Attachment>>, AppError> {
    user.require(Resource::Attachment, Action::View)?;
    let owner = parse_owner(&entity_type, entity_id)?;

    let attachments = service(&state).list(owner).await?;
    Ok(Json(attachments))
}

/// Fetch an attachment, treating one filed under another record as missing
async fn owned_attachment(
    service: &AttachmentService,
    owner: AttachmentOwner,
    attachment_id: Uuid,
) -> Result<Attachment, AppError> {
    let attachment = service.get_attachment(attachment_id).await?;
    if attachment.entity_type != owner.entity_type.as_str()
        || attachment.entity_id != owner.entity_id
    {
        return Err(AppError::NotFound("Attachment".to_string()));
    }
    Ok(attachment)
}

pub async fn get_attachment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((entity_type, entity_id, attachment_id)): Path<(String, Uuid, Uuid)>,
) -> Result<Json<Attachment>, AppError> {
    user.require(Resource::Attachment, Action::View)?;
    let owner = parse_owner(&entity_type, entity_id)?;

    let attachment = owned_attachment(&service(&state), owner, attachment_id).await?;
    Ok(Json(attachment))
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path((entity_type, entity_id, attachment_id)): Path<(String, Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Attachment, Action::Delete)?;
    let owner = parse_owner(&entity_type, entity_id)?;

    let service = service(&state);
    owned_attachment(&service, owner, attachment_id).await?;
    service
        .delete(&Actor::user(user.user_id, client.ip), attachment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner() {
        let id = Uuid::new_v4();
        let owner = parse_owner("compliance_check", id).unwrap();
        assert_eq!(owner.entity_type, EntityType::ComplianceCheck);
        assert_eq!(owner.entity_id, id);

        assert!(matches!(
            parse_owner("plot", id),
            Err(AppError::Validation { ref field, .. }) if field == "entity_type"
        ));
    }
}
