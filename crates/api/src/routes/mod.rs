use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use validator::Validate;

use enquete_domain::{
    auth::Role,
    identity::{sign_in_error_message, Company, SignInError, UserProfile, Viewer},
    mutations::{QuestionDraft, SurveyDraft, SurveyMutationService},
    ports::notify::{Notice, NoticeKind, RecordingNotifier},
    responses::{Answer, SurveyResponse},
    surveys::{QuestionType, Survey},
    users::{CompanyWithAdminCreate, UserCreate, UserUpdate},
};

use crate::middleware::AuthContext;
use crate::{
    error::{map_domain_error, ApiError},
    middleware as app_middleware, observability,
    state::AppState,
    validation,
};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/surveys", get(list_surveys).post(create_survey))
        .route(
            "/v1/surveys/:survey_id",
            axum::routing::put(update_survey).delete(delete_survey),
        )
        .route(
            "/v1/surveys/:survey_id/responses",
            get(list_responses).post(submit_response),
        )
        .route("/v1/users", get(list_users))
        .route("/v1/users/:user_id", axum::routing::patch(update_user))
        .route("/v1/users/:user_id/deactivate", post(deactivate_user))
        .route("/v1/companies", get(list_companies))
        .route("/v1/admin/users", post(create_user))
        .route(
            "/v1/admin/users/:user_id/password-reset",
            post(reset_password),
        )
        .route("/v1/admin/companies", post(create_company))
        .route_layer(middleware::from_fn(
            app_middleware::require_auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/auth/sign-in", post(sign_in))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(CorsLayer::permissive());

    if !state.config.is_test() {
        if let Some(governor_config) = GovernorConfigBuilder::default()
            .per_second(100)
            .burst_size(200)
            .finish()
        {
            app = app.layer(GovernorLayer {
                config: Arc::new(governor_config),
            });
        }
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct SignInRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Serialize)]
struct SignInResponse {
    token: String,
    user: UserProfile,
}

async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    validation::validate(&payload)?;
    let service = state.user_service();
    match service.sign_in(&payload.email, &payload.password).await {
        Ok(user) => {
            observability::register_sign_in("success");
            let token = app_middleware::encode_token(&state.config, &user)?;
            Ok(Json(SignInResponse { token, user }))
        }
        Err(err) => {
            let message = sign_in_error_message(&err);
            match err {
                SignInError::InvalidCredentials => {
                    observability::register_sign_in("invalid_credentials");
                    Err(ApiError::Unauthorized(message))
                }
                SignInError::InactiveUser => {
                    observability::register_sign_in("inactive_user");
                    Err(ApiError::Forbidden(message))
                }
                SignInError::Unavailable(detail) => {
                    observability::register_sign_in("unavailable");
                    tracing::error!(error = %detail, "sign-in backend unavailable");
                    Err(ApiError::Unavailable(message))
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SurveyListQuery {
    company_id: Option<String>,
}

#[derive(Serialize)]
struct SurveyListResponse {
    surveys: Vec<Survey>,
}

async fn list_surveys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SurveyListQuery>,
) -> Result<Json<SurveyListResponse>, ApiError> {
    let surveys = state
        .store
        .fetch_surveys(query.company_id.as_deref(), auth.viewer.as_ref())
        .await;
    Ok(Json(SurveyListResponse { surveys }))
}

// Serialize: the `length` rule on `questions` records the value as a param.
#[derive(Debug, Serialize, Deserialize)]
struct QuestionDraftRequest {
    text: String,
    question_type: QuestionType,
    options: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
struct SaveSurveyRequest {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[validate(length(min = 1))]
    questions: Vec<QuestionDraftRequest>,
}

impl SaveSurveyRequest {
    fn into_draft(self) -> SurveyDraft {
        SurveyDraft {
            title: self.title,
            questions: self
                .questions
                .into_iter()
                .map(|question| QuestionDraft {
                    text: question.text,
                    question_type: question.question_type,
                    options: question.options,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct MutationResponse {
    succeeded: bool,
    notices: Vec<Notice>,
}

fn mutation_response(notices: Vec<Notice>) -> MutationResponse {
    let succeeded = notices
        .iter()
        .any(|notice| notice.kind == NoticeKind::Success);
    MutationResponse { succeeded, notices }
}

fn mutation_service(state: &AppState, notifier: Arc<RecordingNotifier>) -> SurveyMutationService {
    SurveyMutationService::new(
        state.surveys.clone(),
        state.store.clone(),
        state.activity.clone(),
        notifier,
    )
}

async fn create_survey(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SaveSurveyRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    validation::validate(&payload)?;
    let notifier = Arc::new(RecordingNotifier::new());
    let service = mutation_service(&state, notifier.clone());
    service
        .save_survey(&payload.into_draft(), None, auth.viewer.as_ref())
        .await;
    Ok(Json(mutation_response(notifier.take())))
}

async fn update_survey(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(survey_id): Path<String>,
    Json(payload): Json<SaveSurveyRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    validation::validate(&payload)?;
    let notifier = Arc::new(RecordingNotifier::new());
    let service = mutation_service(&state, notifier.clone());
    service
        .save_survey(&payload.into_draft(), Some(&survey_id), auth.viewer.as_ref())
        .await;
    Ok(Json(mutation_response(notifier.take())))
}

async fn delete_survey(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(survey_id): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    let notifier = Arc::new(RecordingNotifier::new());
    let service = mutation_service(&state, notifier.clone());
    service.delete_survey(&survey_id, auth.viewer.as_ref()).await;
    Ok(Json(mutation_response(notifier.take())))
}

#[derive(Serialize)]
struct ResponseListResponse {
    responses: Vec<SurveyResponse>,
}

async fn list_responses(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
) -> Result<Json<ResponseListResponse>, ApiError> {
    let responses = state.store.fetch_survey_responses(&survey_id).await;
    Ok(Json(ResponseListResponse { responses }))
}

#[derive(Debug, Deserialize)]
struct SubmitResponseRequest {
    answers: Vec<Answer>,
}

async fn submit_response(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(survey_id): Path<String>,
    Json(payload): Json<SubmitResponseRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let viewer = auth.require()?.clone();

    let mut survey = state
        .store
        .surveys_snapshot()
        .await
        .into_iter()
        .find(|survey| survey.survey_id == survey_id);
    if survey.is_none() {
        survey = state
            .store
            .fetch_surveys(None, Some(&viewer))
            .await
            .into_iter()
            .find(|survey| survey.survey_id == survey_id);
    }
    let survey = survey.ok_or(ApiError::NotFound)?;

    let notifier = Arc::new(RecordingNotifier::new());
    let service = mutation_service(&state, notifier.clone());
    service
        .save_response(&payload.answers, &survey, Some(&viewer))
        .await;
    Ok(Json(mutation_response(notifier.take())))
}

#[derive(Serialize)]
struct UserListResponse {
    users: Vec<UserProfile>,
}

async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserListResponse>, ApiError> {
    let viewer = auth.require()?;
    if !viewer.role.can_manage_users() {
        return Err(ApiError::forbidden());
    }
    let users = state
        .user_service()
        .list_users(viewer)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(UserListResponse { users }))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateUserRequest {
    #[validate(length(min = 1, max = 120))]
    full_name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 128))]
    password: String,
    role: Role,
    company_id: Option<String>,
    #[serde(default)]
    permissions: HashMap<String, bool>,
}

impl CreateUserRequest {
    fn into_create(self) -> UserCreate {
        UserCreate {
            full_name: self.full_name,
            email: self.email,
            password: self.password,
            role: self.role,
            company_id: self.company_id,
            permissions: self.permissions,
        }
    }
}

async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    validation::validate(&payload)?;
    let viewer = auth.require()?.clone();
    if !viewer.role.can_manage_users() {
        return Err(ApiError::forbidden());
    }
    // Admins only provision inside their own company.
    if !viewer.role.is_developer() && payload.company_id != viewer.company_id {
        return Err(ApiError::forbidden());
    }

    let created = state
        .user_service()
        .create_user(&payload.into_create(), &viewer)
        .await
        .map_err(map_domain_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    let viewer = auth.require()?.clone();
    ensure_can_manage_target(&state, &viewer, &user_id).await?;
    let updated = state
        .user_service()
        .update_user(&user_id, &payload)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(updated))
}

async fn deactivate_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let viewer = auth.require()?.clone();
    ensure_can_manage_target(&state, &viewer, &user_id).await?;
    let updated = state
        .user_service()
        .deactivate_user(&user_id, &viewer)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize, Validate)]
struct ResetPasswordRequest {
    #[validate(length(min = 8, max = 128))]
    new_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validation::validate(&payload)?;
    let viewer = auth.require()?.clone();
    ensure_can_manage_target(&state, &viewer, &user_id).await?;
    state
        .user_service()
        .reset_password(&user_id, &payload.new_password)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct CompanyListResponse {
    companies: Vec<Company>,
}

async fn list_companies(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<CompanyListResponse>, ApiError> {
    let viewer = auth.require()?;
    if !viewer.role.is_developer() {
        return Err(ApiError::forbidden());
    }
    let companies = state
        .user_service()
        .list_companies()
        .await
        .map_err(map_domain_error)?;
    Ok(Json(CompanyListResponse { companies }))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 120))]
    name: String,
    #[validate(nested)]
    admin: CreateUserRequest,
}

#[derive(Serialize)]
struct CreateCompanyResponse {
    company: Company,
    admin: UserProfile,
}

async fn create_company(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<CreateCompanyResponse>), ApiError> {
    validation::validate(&payload)?;
    let viewer = auth.require()?.clone();
    if !viewer.role.is_developer() {
        return Err(ApiError::forbidden());
    }

    let input = CompanyWithAdminCreate {
        company_name: payload.name,
        admin: payload.admin.into_create(),
    };
    let (company, admin) = state
        .user_service()
        .create_company_with_admin(&input, &viewer)
        .await
        .map_err(map_domain_error)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateCompanyResponse { company, admin }),
    ))
}

async fn ensure_can_manage_target(
    state: &AppState,
    viewer: &Viewer,
    target_user_id: &str,
) -> Result<(), ApiError> {
    if !viewer.role.can_manage_users() {
        return Err(ApiError::forbidden());
    }
    if viewer.role.is_developer() {
        return Ok(());
    }
    let target = state
        .directory
        .get_user(target_user_id)
        .await
        .map_err(map_domain_error)?
        .ok_or(ApiError::NotFound)?;
    if target.company_id != viewer.company_id {
        return Err(ApiError::forbidden());
    }
    Ok(())
}
