//! JSON API over the claim workflow.
//!
//! Identity comes from the trusted gateway in front of this service:
//! - `x-user-id`        caller id (required)
//! - `x-user-roles`     comma separated roles, e.g. `managerial,finance`
//! - `x-user-name`      display name used on signatures (optional)
//! - `x-gateway-token`  shared secret, checked when `server.gateway_token` is set
//! - `x-correlation-id` echoed in error bodies; generated when absent
//!
//! Claims:
//! - `GET    /api/v1/claims`                              list with filters
//! - `POST   /api/v1/claims/contractor`                   submit a contractor claim
//! - `POST   /api/v1/claims/surveyor`                     submit a surveyor claim and route its contractor claim
//! - `GET    /api/v1/claims/{claim_id}`                   detail with transition log and signatures
//! - `POST   /api/v1/claims/{claim_id}/versions`          resubmit as version n+1
//! - `GET    /api/v1/claims/{claim_id}/linked`            surveyor claims linked to a contractor claim
//! - `GET    /api/v1/claims/{claim_id}/reconciliation`    current and pinned comparison
//! - `POST   /api/v1/claims/{claim_id}/decisions`         managerial or finance decision
//! - `POST   /api/v1/claims/{claim_id}/system-rejection`  admin rejection
//! - `GET    /api/v1/claims/{claim_id}/signatures`        signature ledger
//! - `GET    /api/v1/claims/{claim_id}/signatures/{role}` one signature
//! - `PUT    /api/v1/claims/{claim_id}/signatures/{role}` sign for a role
//! - `GET    /api/v1/claims/{claim_id}/certificate`       assemble the certificate
//!
//! Thresholds:
//! - `GET    /api/v1/thresholds`, `POST /api/v1/thresholds`
//! - `GET    /api/v1/thresholds/active`
//! - `PATCH  /api/v1/thresholds/{threshold_id}`, `DELETE /api/v1/thresholds/{threshold_id}`
//! - `POST   /api/v1/thresholds/{threshold_id}/activate`, `.../deactivate`
//!
//! - `GET    /api/v1/dashboard?site_id=`

use std::str::FromStr;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use overburden_core::domain::claim::{Claim, ClaimDraft, ClaimId, PartyRole};
use overburden_core::domain::identity::{parse_roles, Actor, Role};
use overburden_core::domain::reference::{PitId, SiteId};
use overburden_core::domain::signature::{Signature, SignatureSource};
use overburden_core::domain::threshold::{Threshold, ThresholdId, ThresholdInput, ThresholdUpdate};
use overburden_core::service::{
    ClaimDetail, DashboardSummary, ReconciliationView, Resubmission, SurveyorSubmission,
};
use overburden_core::{
    ApplicationError, ApprovalStage, Certificate, ClaimFilter, ClaimStatus, ClaimWorkflow,
    DomainError, InterfaceError, RequestContext,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";
const MAX_CORRELATION_ID_LEN: usize = 128;

#[derive(Clone)]
pub struct ApiState {
    workflow: ClaimWorkflow,
    gateway_token: Option<SecretString>,
}

pub fn router(workflow: ClaimWorkflow, gateway_token: Option<SecretString>) -> Router {
    Router::new()
        .route("/api/v1/claims", get(list_claims))
        .route("/api/v1/claims/contractor", post(submit_contractor_claim))
        .route("/api/v1/claims/surveyor", post(submit_surveyor_claim))
        .route("/api/v1/claims/{claim_id}", get(claim_detail))
        .route("/api/v1/claims/{claim_id}/versions", post(resubmit_claim))
        .route("/api/v1/claims/{claim_id}/linked", get(linked_claims))
        .route("/api/v1/claims/{claim_id}/reconciliation", get(reconciliation))
        .route("/api/v1/claims/{claim_id}/decisions", post(decide))
        .route("/api/v1/claims/{claim_id}/system-rejection", post(reject_by_system))
        .route("/api/v1/claims/{claim_id}/signatures", get(list_signatures))
        .route(
            "/api/v1/claims/{claim_id}/signatures/{role}",
            put(submit_signature).get(get_signature),
        )
        .route("/api/v1/claims/{claim_id}/certificate", get(certificate))
        .route("/api/v1/thresholds", get(list_thresholds).post(create_threshold))
        .route("/api/v1/thresholds/active", get(active_threshold))
        .route(
            "/api/v1/thresholds/{threshold_id}",
            axum::routing::patch(update_threshold).delete(delete_threshold),
        )
        .route("/api/v1/thresholds/{threshold_id}/activate", post(activate_threshold))
        .route("/api/v1/thresholds/{threshold_id}/deactivate", post(deactivate_threshold))
        .route("/api/v1/dashboard", get(dashboard))
        .with_state(ApiState { workflow, gateway_token })
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The authenticated caller and the request's correlation id.
pub struct Caller(pub RequestContext);

impl Caller {
    fn fail(&self, error: ApplicationError) -> ApiError {
        ApiError::Interface(error.into_interface(self.0.correlation_id.clone()))
    }

    fn invalid(&self, error: DomainError) -> ApiError {
        self.fail(ApplicationError::Domain(error))
    }

    fn body<T>(&self, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
        payload.map(|Json(value)| value).map_err(|rejection| {
            self.invalid(DomainError::validation("body", rejection.body_text()))
        })
    }
}

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(&parts.headers);

        if let Some(expected) = &state.gateway_token {
            let presented = header(&parts.headers, "x-gateway-token");
            if presented != Some(expected.expose_secret()) {
                return Err(ApiError::Unauthenticated {
                    message: "gateway token is missing or does not match".to_owned(),
                    correlation_id,
                });
            }
        }

        let Some(user_id) = header(&parts.headers, "x-user-id") else {
            return Err(ApiError::Unauthenticated {
                message: "x-user-id header is required".to_owned(),
                correlation_id,
            });
        };

        let roles = parse_roles(header(&parts.headers, "x-user-roles").unwrap_or_default())
            .map_err(|error| {
                ApiError::Interface(ApplicationError::Domain(error).into_interface(correlation_id.clone()))
            })?;

        let mut actor = Actor::new(user_id, roles);
        if let Some(name) = header(&parts.headers, "x-user-name") {
            actor = actor.with_display_name(name);
        }

        Ok(Self(RequestContext::new(actor, correlation_id)))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn correlation_id(headers: &HeaderMap) -> String {
    header(headers, CORRELATION_HEADER)
        .filter(|value| value.len() <= MAX_CORRELATION_ID_LEN)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated { message: String, correlation_id: String },
    Interface(InterfaceError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_kind: String,
    pub message: String,
    pub user_message: String,
    pub correlation_id: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::Interface(error) => match error {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
                InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
                InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
                InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Unauthenticated { message, correlation_id } => ErrorBody {
                error_kind: "authentication_error".to_owned(),
                message: message.clone(),
                user_message: "Sign in again through the site portal.".to_owned(),
                correlation_id: correlation_id.clone(),
            },
            Self::Interface(error) => {
                let error_kind = match error {
                    InterfaceError::BadRequest { kind, .. }
                    | InterfaceError::Conflict { kind, .. }
                    | InterfaceError::Unprocessable { kind, .. } => *kind,
                    InterfaceError::Forbidden { .. } => "permission_error",
                    InterfaceError::NotFound { .. } => "not_found",
                    InterfaceError::ServiceUnavailable { .. } => "persistence_error",
                    InterfaceError::Internal { .. } => "internal_error",
                };
                ErrorBody {
                    error_kind: error_kind.to_owned(),
                    message: error.to_string(),
                    user_message: error.user_message().to_owned(),
                    correlation_id: error.correlation_id().to_owned(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();

        warn!(
            event_name = "api.request.rejected",
            correlation_id = %body.correlation_id,
            error_kind = %body.error_kind,
            status = status.as_u16(),
            error = %body.message,
            "request rejected"
        );

        let mut response = (status, Json(&body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&body.correlation_id) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ClaimQuery {
    pub party_role: Option<String>,
    pub status: Option<String>,
    pub site_id: Option<String>,
    pub pit_id: Option<String>,
    pub period_month: Option<u32>,
    pub period_year: Option<i32>,
}

impl ClaimQuery {
    fn into_filter(self) -> Result<ClaimFilter, DomainError> {
        Ok(ClaimFilter {
            party_role: self.party_role.as_deref().map(PartyRole::from_str).transpose()?,
            status: self.status.as_deref().map(ClaimStatus::from_str).transpose()?,
            site_id: self.site_id.map(SiteId),
            pit_id: self.pit_id.map(PitId),
            period_month: self.period_month,
            period_year: self.period_year,
            ..ClaimFilter::default()
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub stage: ApprovalStage,
    pub status: ClaimStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct SystemRejectionRequest {
    pub reason: Option<String>,
}

/// Exactly one of `inline` and `file` must be set.
#[derive(Debug, Default, Deserialize)]
pub struct SignatureRequest {
    pub inline: Option<String>,
    pub file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub site_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Claim handlers
// ---------------------------------------------------------------------------

async fn list_claims(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<ClaimQuery>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    let filter = query.into_filter().map_err(|error| caller.invalid(error))?;
    let claims = state.workflow.list_claims(&caller.0, filter).await.map_err(|e| caller.fail(e))?;
    Ok(Json(claims))
}

async fn submit_contractor_claim(
    State(state): State<ApiState>,
    caller: Caller,
    payload: Result<Json<ClaimDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    let draft = caller.body(payload)?;
    let claim = state
        .workflow
        .submit_contractor_claim(&caller.0, draft)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(claim)))
}

async fn submit_surveyor_claim(
    State(state): State<ApiState>,
    caller: Caller,
    payload: Result<Json<ClaimDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<SurveyorSubmission>), ApiError> {
    let draft = caller.body(payload)?;
    let submission = state
        .workflow
        .submit_surveyor_claim(&caller.0, draft)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn claim_detail(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
) -> Result<Json<ClaimDetail>, ApiError> {
    let detail = state
        .workflow
        .claim_detail(&caller.0, &ClaimId(claim_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(detail))
}

async fn resubmit_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
    payload: Result<Json<ClaimDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Resubmission>), ApiError> {
    let draft = caller.body(payload)?;
    let resubmission = state
        .workflow
        .resubmit_claim(&caller.0, &ClaimId(claim_id), draft)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(resubmission)))
}

async fn linked_claims(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    let linked = state
        .workflow
        .find_linked_claims(&caller.0, &ClaimId(claim_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(linked))
}

async fn reconciliation(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
) -> Result<Json<ReconciliationView>, ApiError> {
    let view = state
        .workflow
        .reconcile(&caller.0, &ClaimId(claim_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(view))
}

async fn decide(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<Claim>, ApiError> {
    let request = caller.body(payload)?;
    let claim = state
        .workflow
        .decide(&caller.0, &ClaimId(claim_id), request.stage, request.status)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(claim))
}

async fn reject_by_system(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
    payload: Result<Json<SystemRejectionRequest>, JsonRejection>,
) -> Result<Json<Claim>, ApiError> {
    let request = caller.body(payload)?;
    let claim = state
        .workflow
        .reject_by_system(&caller.0, &ClaimId(claim_id), request.reason.as_deref())
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(claim))
}

// ---------------------------------------------------------------------------
// Signatures and certificate
// ---------------------------------------------------------------------------

async fn list_signatures(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
) -> Result<Json<Vec<Signature>>, ApiError> {
    let signatures = state
        .workflow
        .list_signatures(&caller.0, &ClaimId(claim_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(signatures))
}

async fn get_signature(
    State(state): State<ApiState>,
    caller: Caller,
    Path((claim_id, role)): Path<(String, String)>,
) -> Result<Json<Signature>, ApiError> {
    let role = Role::from_str(&role).map_err(|error| caller.invalid(error))?;
    let claim_id = ClaimId(claim_id);
    let signature = state
        .workflow
        .get_signature(&caller.0, &claim_id, role)
        .await
        .map_err(|e| caller.fail(e))?
        .ok_or_else(|| caller.invalid(DomainError::not_found("signature", format!("{claim_id}/{role}"))))?;
    Ok(Json(signature))
}

async fn submit_signature(
    State(state): State<ApiState>,
    caller: Caller,
    Path((claim_id, role)): Path<(String, String)>,
    payload: Result<Json<SignatureRequest>, JsonRejection>,
) -> Result<Json<Signature>, ApiError> {
    let role = Role::from_str(&role).map_err(|error| caller.invalid(error))?;
    let request = caller.body(payload)?;
    let source =
        SignatureSource::from_parts(request.inline, request.file).map_err(|error| caller.invalid(error))?;

    let signature = state
        .workflow
        .submit_signature(&caller.0, &ClaimId(claim_id), role, source)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(signature))
}

async fn certificate(
    State(state): State<ApiState>,
    caller: Caller,
    Path(claim_id): Path<String>,
) -> Result<Json<Certificate>, ApiError> {
    let certificate = state
        .workflow
        .assemble_certificate(&caller.0, &ClaimId(claim_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(certificate))
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

async fn list_thresholds(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<Threshold>>, ApiError> {
    let thresholds = state.workflow.list_thresholds(&caller.0).await.map_err(|e| caller.fail(e))?;
    Ok(Json(thresholds))
}

async fn active_threshold(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Option<Threshold>>, ApiError> {
    let active = state.workflow.active_threshold(&caller.0).await.map_err(|e| caller.fail(e))?;
    Ok(Json(active))
}

async fn create_threshold(
    State(state): State<ApiState>,
    caller: Caller,
    payload: Result<Json<ThresholdInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Threshold>), ApiError> {
    let input = caller.body(payload)?;
    let threshold =
        state.workflow.create_threshold(&caller.0, input).await.map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(threshold)))
}

async fn update_threshold(
    State(state): State<ApiState>,
    caller: Caller,
    Path(threshold_id): Path<String>,
    payload: Result<Json<ThresholdUpdate>, JsonRejection>,
) -> Result<Json<Threshold>, ApiError> {
    let update = caller.body(payload)?;
    let threshold = state
        .workflow
        .update_threshold(&caller.0, &ThresholdId(threshold_id), update)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(threshold))
}

async fn activate_threshold(
    State(state): State<ApiState>,
    caller: Caller,
    Path(threshold_id): Path<String>,
) -> Result<Json<Threshold>, ApiError> {
    let threshold = state
        .workflow
        .set_threshold_active(&caller.0, &ThresholdId(threshold_id), true)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(threshold))
}

async fn deactivate_threshold(
    State(state): State<ApiState>,
    caller: Caller,
    Path(threshold_id): Path<String>,
) -> Result<Json<Threshold>, ApiError> {
    let threshold = state
        .workflow
        .set_threshold_active(&caller.0, &ThresholdId(threshold_id), false)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(threshold))
}

async fn delete_threshold(
    State(state): State<ApiState>,
    caller: Caller,
    Path(threshold_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .workflow
        .delete_threshold(&caller.0, &ThresholdId(threshold_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dashboard(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let summary = state
        .workflow
        .dashboard(&caller.0, query.site_id.map(SiteId))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(summary))
}
