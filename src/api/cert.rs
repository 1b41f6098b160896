/// Certificate endpoints: issuance, verification and revocation
use crate::{
    auth::IssuerAuthContext,
    certificate::{qr, Certificate, CertificatePayload},
    context::AppContext,
    db::account::Role,
    error::{CertError, CertResult, FieldIssue},
    issuance::{IssuanceOutcome, IssueCertificateRequest},
    revocation::{RevocationOutcome, RevokeRequest},
    verification::{HashVerdict, LookupKey, StudentHashVerdict, Verdict},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Build certificate routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/cert/issue", post(issue))
        .route("/api/cert/verify", get(verify_by_token))
        .route("/api/cert/verify/by-id/:id", get(verify_by_id))
        .route("/api/cert/verify/hash", post(verify_hash))
        .route("/api/cert/verify/qr", post(verify_qr))
        .route("/api/cert/verify/student-hash", post(verify_student_hash))
        .route("/api/cert/revoke/:id", post(revoke))
        .route("/api/cert/issuer-certificates", get(issuer_certificates))
        .route("/api/cert/:id", get(get_certificate))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyHashRequest {
    pub certificate_id: String,
    #[serde(alias = "providedHash")]
    pub hash: String,
}

/// Scanned QR content, either the raw string or an already-decoded object
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQrRequest {
    pub qr_data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStudentHashRequest {
    pub certificate_id: String,
    pub student_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateList {
    pub certificates: Vec<Certificate>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetail {
    pub certificate: Certificate,
    pub verify_url: String,
    pub qr_payload: String,
    pub qr_image: String,
}

async fn issue(
    State(ctx): State<AppContext>,
    auth: IssuerAuthContext,
    Json(req): Json<IssueCertificateRequest>,
) -> CertResult<(StatusCode, Json<IssuanceOutcome>)> {
    let outcome = ctx.issuance.issue(&auth.account, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn verify_by_token(
    State(ctx): State<AppContext>,
    Query(query): Query<VerifyQuery>,
) -> CertResult<Json<Verdict>> {
    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| CertError::InvalidInput(vec![FieldIssue::new("token", "is required")]))?;

    Ok(Json(ctx.trust.verify(LookupKey::Token(token.trim())).await?))
}

async fn verify_by_id(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> CertResult<Json<Verdict>> {
    Ok(Json(ctx.trust.verify(LookupKey::CertificateId(&id)).await?))
}

async fn verify_hash(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyHashRequest>,
) -> CertResult<Json<HashVerdict>> {
    Ok(Json(
        ctx.trust
            .verify_hash(req.certificate_id.trim(), req.hash.trim())
            .await?,
    ))
}

async fn verify_qr(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyQrRequest>,
) -> CertResult<Json<HashVerdict>> {
    let raw = match req.qr_data {
        Value::String(raw) => raw,
        other => other.to_string(),
    };

    Ok(Json(ctx.trust.verify_qr_payload(&raw).await?))
}

async fn verify_student_hash(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyStudentHashRequest>,
) -> CertResult<Json<StudentHashVerdict>> {
    Ok(Json(
        ctx.trust
            .verify_student_hash(req.certificate_id.trim(), &req.student_hash)
            .await?,
    ))
}

async fn revoke(
    State(ctx): State<AppContext>,
    auth: IssuerAuthContext,
    Path(id): Path<String>,
    body: Option<Json<RevokeRequest>>,
) -> CertResult<Json<RevocationOutcome>> {
    let reason = body.and_then(|Json(req)| req.reason);
    let outcome = ctx
        .revocation
        .revoke(&auth.account, &id, reason.as_deref())
        .await?;

    Ok(Json(outcome))
}

/// Certificates issued by the caller, newest first
async fn issuer_certificates(
    State(ctx): State<AppContext>,
    auth: IssuerAuthContext,
) -> CertResult<Json<CertificateList>> {
    let certificates = ctx.certificates.list_by_issuer(&auth.account.id).await?;

    Ok(Json(CertificateList {
        count: certificates.len(),
        certificates,
    }))
}

async fn get_certificate(
    State(ctx): State<AppContext>,
    auth: IssuerAuthContext,
    Path(id): Path<String>,
) -> CertResult<Json<CertificateDetail>> {
    let found = if auth.account.role == Role::Admin {
        ctx.certificates.find_by_certificate_id(&id).await?
    } else {
        ctx.certificates.find_for_issuer(&id, &auth.account.id).await?
    };
    let certificate =
        found.ok_or_else(|| CertError::NotFound(format!("Certificate {} not found", id)))?;

    let verify_url = ctx.verify_url(&certificate.verification_token);
    let qr_payload = CertificatePayload::for_certificate(&certificate, &verify_url).encode()?;
    let qr_image = qr::render_data_url(&verify_url)?;

    Ok(Json(CertificateDetail {
        certificate,
        verify_url,
        qr_payload,
        qr_image,
    }))
}
