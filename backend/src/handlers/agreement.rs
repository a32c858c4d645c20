//! Rental agreement handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared::{Action, EntityType, PaginatedResponse, Resource};

use crate::error::AppError;
use crate::handlers::attachment::purge_attachments;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::agreement::{
    Agreement, AgreementQuery, CreateAgreementInput, SealVerification, SigningLink,
    TerminateInput, UpdateAgreementInput,
};
use crate::services::{Actor, AgreementService};
use crate::AppState;

fn service(state: &AppState) -> AgreementService {
    AgreementService::new(state.db.clone(), &state.config, state.storage.clone())
}

pub async fn list_agreements(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AgreementQuery>,
) -> Result<Json<PaginatedResponse<Agreement>>, AppError> {
    user.require(Resource::Agreement, Action::View)?;

    let agreements = service(&state).list_agreements(&query).await?;
    Ok(Json(agreements))
}

pub async fn get_agreement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(agreement_id): Path<Uuid>,
) -> Result<Json<Agreement>, AppError> {
    user.require(Resource::Agreement, Action::View)?;

    let agreement = service(&state).get_agreement(agreement_id).await?;
    Ok(Json(agreement))
}

/// Draft an agreement from a template
pub async fn create_agreement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Json(input): Json<CreateAgreementInput>,
) -> Result<(StatusCode, Json<Agreement>), AppError> {
    user.require(Resource::Agreement, Action::Create)?;

    let agreement = service(&state)
        .create_agreement(&Actor::user(user.user_id, client.ip), input)
        .await?;
    Ok((StatusCode::CREATED, Json(agreement)))
}

pub async fn update_agreement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(agreement_id): Path<Uuid>,
    Json(input): Json<UpdateAgreementInput>,
) -> Result<Json<Agreement>, AppError> {
    user.require(Resource::Agreement, Action::Edit)?;

    let agreement = service(&state)
        .update_agreement(&Actor::user(user.user_id, client.ip), agreement_id, input)
        .await?;
    Ok(Json(agreement))
}

pub async fn delete_agreement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(agreement_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Agreement, Action::Delete)?;

    service(&state)
        .delete_agreement(&Actor::user(user.user_id, client.ip), agreement_id)
        .await?;
    purge_attachments(&state, EntityType::Agreement, agreement_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Issue a signing link; sending again replaces the previous link
pub async fn send_for_signature(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(agreement_id): Path<Uuid>,
) -> Result<Json<SigningLink>, AppError> {
    user.require(Resource::Agreement, Action::Edit)?;

    let link = service(&state)
        .send_for_signature(&Actor::user(user.user_id, client.ip), agreement_id)
        .await?;
    Ok(Json(link))
}

pub async fn terminate_agreement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    Path(agreement_id): Path<Uuid>,
    Json(input): Json<TerminateInput>,
) -> Result<Json<Agreement>, AppError> {
    user.require(Resource::Agreement, Action::Edit)?;

    let agreement = service(&state)
        .terminate(&Actor::user(user.user_id, client.ip), agreement_id, input)
        .await?;
    Ok(Json(agreement))
}

/// Check a signed agreement's content digest and seal
pub async fn verify_agreement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(agreement_id): Path<Uuid>,
) -> Result<Json<SealVerification>, AppError> {
    user.require(Resource::Agreement, Action::View)?;

    let verification = service(&state).verify_seal(agreement_id).await?;
    Ok(Json(verification))
}
