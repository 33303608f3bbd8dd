//! Axum route handlers for AI document generation and research.
//!
//! Usage metering is the caller's contract: the frontend consumes a
//! generation via the increment-usage endpoint alongside these calls, so
//! these handlers stay meter-free.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::prompts;
use crate::errors::AppError;
use crate::models::document::DocumentKind;
use crate::routes::success;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "jobDescription")]
    pub job_description: String,
    #[serde(rename = "resumeText")]
    pub resume_text: String,
}

fn generation_prompt(resume_text: &str, job_description: &str) -> String {
    format!("CANDIDATE RESUME:\n{resume_text}\n\nJOB DESCRIPTION:\n{job_description}")
}

/// POST /api/create-resume
pub async fn handle_create_resume(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Value>, AppError> {
    validate_generate(&request)?;

    let content = state
        .claude
        .call_text(
            &generation_prompt(&request.resume_text, &request.job_description),
            prompts::RESUME_SYSTEM,
        )
        .await?;

    Ok(success(json!({
        "documentType": DocumentKind::Resume,
        "content": content,
    })))
}

/// POST /api/create-cover-letter
pub async fn handle_create_cover_letter(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Value>, AppError> {
    validate_generate(&request)?;

    let content = state
        .claude
        .call_text(
            &generation_prompt(&request.resume_text, &request.job_description),
            prompts::COVER_LETTER_SYSTEM,
        )
        .await?;

    Ok(success(json!({
        "documentType": DocumentKind::CoverLetter,
        "content": content,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    #[serde(rename = "documentType")]
    pub document_type: String,
    #[serde(rename = "jobDescription")]
    pub job_description: String,
    #[serde(rename = "resumeText")]
    pub resume_text: String,
    #[serde(rename = "currentDocument")]
    pub current_document: String,
    pub feedback: String,
}

/// POST /api/refine-document
///
/// Feedback-driven regeneration of a previously generated document.
pub async fn handle_refine_document(
    State(state): State<AppState>,
    Json(request): Json<RefineRequest>,
) -> Result<Json<Value>, AppError> {
    if request.feedback.trim().is_empty() {
        return Err(AppError::Validation("feedback cannot be empty".to_string()));
    }
    let kind = DocumentKind::parse(&request.document_type).ok_or_else(|| {
        AppError::Validation("documentType must be 'resume' or 'cover_letter'".to_string())
    })?;

    let system = match kind {
        DocumentKind::Resume => prompts::RESUME_FEEDBACK_SYSTEM,
        DocumentKind::CoverLetter => prompts::COVER_LETTER_FEEDBACK_SYSTEM,
    };
    let prompt = format!(
        "CANDIDATE RESUME:\n{}\n\nJOB DESCRIPTION:\n{}\n\nCURRENT DOCUMENT:\n{}\n\nUSER FEEDBACK:\n{}",
        request.resume_text, request.job_description, request.current_document, request.feedback
    );

    let content = state.claude.call_text(&prompt, system).await?;

    Ok(success(json!({
        "documentType": kind,
        "content": content,
    })))
}

#[derive(Debug, Deserialize)]
pub struct JobDescriptionRequest {
    #[serde(rename = "jobDescription")]
    pub job_description: String,
}

/// POST /api/generate-questions
///
/// Returns the structured interview-question bank as JSON.
pub async fn handle_generate_questions(
    State(state): State<AppState>,
    Json(request): Json<JobDescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "jobDescription cannot be empty".to_string(),
        ));
    }

    let questions: Value = state
        .claude
        .call_json(
            &request.job_description,
            prompts::INTERVIEW_QUESTIONS_SYSTEM,
        )
        .await?;

    Ok(success(questions))
}

/// POST /api/company-insights
///
/// Web-grounded company research via Perplexity.
pub async fn handle_company_insights(
    State(state): State<AppState>,
    Json(request): Json<JobDescriptionRequest>,
) -> Result<Json<Value>, AppError> {
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "jobDescription cannot be empty".to_string(),
        ));
    }

    let insights = state
        .perplexity
        .call(&request.job_description, prompts::COMPANY_INSIGHTS_SYSTEM)
        .await?;

    Ok(success(json!({ "insights": insights })))
}

fn validate_generate(request: &GenerateRequest) -> Result<(), AppError> {
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "jobDescription cannot be empty".to_string(),
        ));
    }
    if request.resume_text.trim().is_empty() {
        return Err(AppError::Validation(
            "resumeText cannot be empty".to_string(),
        ));
    }
    Ok(())
}
