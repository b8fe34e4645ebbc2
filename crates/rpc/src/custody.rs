//! Custody status and ingestion endpoints.

use axum::extract::{Path as AxumPath, State};
use axum::Json;
use custody_core::ApplyOutcome;
use custody_types::{
    BackupMetadata, ContentId, DagStructure, Deal, PartitionClaim, Pin, StatusResult,
};
use serde::Serialize;
use tracing::debug;

use crate::server::{ok, ApiError, Envelope, SharedState};

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

#[derive(Debug, Serialize)]
pub struct StructureResponse {
    pub cid: ContentId,
    pub structure: DagStructure,
    pub parts: Vec<ContentId>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub cid: ContentId,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub outcome: &'static str,
    pub applied: bool,
}

impl From<ApplyOutcome> for IngestResponse {
    fn from(outcome: ApplyOutcome) -> Self {
        Self {
            outcome: outcome.as_str(),
            applied: outcome.is_applied(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub cid: ContentId,
    pub partition: ContentId,
    pub structure: DagStructure,
}

fn parse_cid(raw: &str) -> Result<ContentId, ApiError> {
    raw.parse::<ContentId>()
        .map_err(|err| ApiError::bad_request(format!("invalid cid: {err}")))
}

/// GET /api/:cid
pub async fn handle_status(
    State(state): State<SharedState>,
    AxumPath(cid): AxumPath<String>,
) -> ApiResult<StatusResult> {
    state.record_request();
    let cid = parse_cid(&cid)?;
    Ok(ok(state.tracker.status_for(&cid)?))
}

/// DELETE /api/:cid
pub async fn handle_delete(
    State(state): State<SharedState>,
    AxumPath(cid): AxumPath<String>,
) -> ApiResult<DeleteResponse> {
    state.record_request();
    let cid = parse_cid(&cid)?;
    state.tracker.delete(&cid)?;
    Ok(ok(DeleteResponse { cid, deleted: true }))
}

/// GET /api/:cid/structure
pub async fn handle_structure(
    State(state): State<SharedState>,
    AxumPath(cid): AxumPath<String>,
) -> ApiResult<StructureResponse> {
    state.record_request();
    let cid = parse_cid(&cid)?;
    Ok(ok(StructureResponse {
        cid,
        structure: state.tracker.structure_for(&cid)?,
        parts: state.tracker.parts_for(&cid)?,
    }))
}

/// GET /api/:cid/backups
pub async fn handle_backups(
    State(state): State<SharedState>,
    AxumPath(cid): AxumPath<String>,
) -> ApiResult<Vec<BackupMetadata>> {
    state.record_request();
    let cid = parse_cid(&cid)?;
    Ok(ok(state.tracker.backups_for(&cid)?))
}

/// POST /ingest/deals
pub async fn handle_ingest_deal(
    State(state): State<SharedState>,
    Json(deal): Json<Deal>,
) -> ApiResult<IngestResponse> {
    state.record_request();
    debug!(deal = %deal.key(), sequence = deal.sequence, "deal event received");
    let outcome = state.tracker.apply_deal_update(deal)?;
    Ok(ok(outcome.into()))
}

/// POST /ingest/pins
pub async fn handle_ingest_pin(
    State(state): State<SharedState>,
    Json(pin): Json<Pin>,
) -> ApiResult<IngestResponse> {
    state.record_request();
    debug!(request_id = %pin.request_id, status = %pin.status, "pin event received");
    let outcome = state.tracker.apply_pin_update(pin)?;
    Ok(ok(outcome.into()))
}

/// POST /ingest/claims
pub async fn handle_ingest_claim(
    State(state): State<SharedState>,
    Json(claim): Json<PartitionClaim>,
) -> ApiResult<ClaimResponse> {
    state.record_request();
    let (cid, partition) = (claim.cid, claim.partition);
    let structure = state.tracker.record_claim(claim)?;
    Ok(ok(ClaimResponse {
        cid,
        partition,
        structure,
    }))
}

/// POST /ingest/backups
pub async fn handle_ingest_backup(
    State(state): State<SharedState>,
    Json(backup): Json<BackupMetadata>,
) -> ApiResult<IngestResponse> {
    state.record_request();
    let outcome = state.tracker.record_backup(backup)?;
    Ok(ok(outcome.into()))
}
