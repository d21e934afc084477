use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::identity::Viewer;
use crate::ports::activity::{ActivityEntry, ActivityLevel, ActivityLogger};
use crate::ports::surveys::{SurveyChangeFeed, SurveyGateway};
use crate::responses::{flatten_response, SurveyResponse};
use crate::scope::resolve_company_scope;
use crate::DomainResult;

pub const FALLBACK_COMPANY_NAME: &str = "N/A";
pub const FALLBACK_CREATOR_NAME: &str = "Usuário Desconhecido";
pub const ACTIVITY_CATEGORY_SURVEYS: &str = "pesquisas";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    MultipleChoice,
    Checkbox,
    Rating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub survey_id: String,
    pub title: String,
    pub company_id: String,
    pub created_by: String,
    pub created_at_ms: i64,
    pub questions: Vec<Question>,
    pub response_count: usize,
    pub company_name: String,
    pub created_by_name: String,
}

/// Raw question row as returned inside the nested survey fetch. `position`
/// may be absent on legacy rows and is treated as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_id: String,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub position: Option<i64>,
}

/// One survey with its joined relations, exactly as the gateway hands it
/// back: questions unsorted, responses reduced to their ids, company and
/// creator names present only when the join found a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub survey_id: String,
    pub title: String,
    pub company_id: String,
    pub created_by: String,
    pub created_at_ms: i64,
    pub questions: Vec<QuestionRecord>,
    pub response_ids: Vec<String>,
    pub company_name: Option<String>,
    pub created_by_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSurvey {
    pub survey_id: String,
    pub title: String,
    pub company_id: String,
    pub created_by: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPatch {
    pub title: String,
    pub company_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRow {
    pub question_id: String,
    pub survey_id: String,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub position: i64,
}

pub fn flatten_survey(record: SurveyRecord) -> Survey {
    let mut questions: Vec<Question> = record
        .questions
        .into_iter()
        .map(|question| Question {
            question_id: question.question_id,
            text: question.text,
            question_type: question.question_type,
            options: question.options,
            position: question.position.unwrap_or(0),
        })
        .collect();
    questions.sort_by_key(|question| question.position);

    Survey {
        survey_id: record.survey_id,
        title: record.title,
        company_id: record.company_id,
        created_by: record.created_by,
        created_at_ms: record.created_at_ms,
        questions,
        response_count: record.response_ids.len(),
        company_name: record
            .company_name
            .unwrap_or_else(|| FALLBACK_COMPANY_NAME.to_string()),
        created_by_name: record
            .created_by_name
            .unwrap_or_else(|| FALLBACK_CREATOR_NAME.to_string()),
    }
}

#[derive(Clone, Default)]
struct FetchContext {
    company_hint: Option<String>,
    viewer: Option<Viewer>,
}

/// In-memory projection of the viewer's surveys and responses. The snapshot
/// is transient and re-derivable; concurrent refetches race with last write
/// winning.
pub struct SurveyStore {
    gateway: Arc<dyn SurveyGateway>,
    logger: Arc<dyn ActivityLogger>,
    surveys: RwLock<Vec<Survey>>,
    responses: RwLock<Vec<SurveyResponse>>,
    loading_surveys: AtomicBool,
    last_context: RwLock<FetchContext>,
    live: Mutex<Option<JoinHandle<()>>>,
}

impl SurveyStore {
    pub fn new(gateway: Arc<dyn SurveyGateway>, logger: Arc<dyn ActivityLogger>) -> Self {
        Self {
            gateway,
            logger,
            surveys: RwLock::new(Vec::new()),
            responses: RwLock::new(Vec::new()),
            loading_surveys: AtomicBool::new(false),
            last_context: RwLock::new(FetchContext::default()),
            live: Mutex::new(None),
        }
    }

    /// Fetches the surveys visible under the resolved company scope, ordered
    /// newest first. Failures are absorbed: the snapshot is cleared, the
    /// error is logged, and an empty list comes back.
    pub async fn fetch_surveys(
        &self,
        company_hint: Option<&str>,
        viewer: Option<&Viewer>,
    ) -> Vec<Survey> {
        self.loading_surveys.store(true, Ordering::SeqCst);
        {
            let mut context = self.last_context.write().await;
            context.company_hint = company_hint.map(str::to_string);
            context.viewer = viewer.cloned();
        }

        let scope = match resolve_company_scope(company_hint, viewer) {
            Some(scope) => scope,
            None => {
                // An unassigned non-developer simply sees nothing.
                *self.surveys.write().await = Vec::new();
                self.loading_surveys.store(false, Ordering::SeqCst);
                return Vec::new();
            }
        };

        match self.gateway.fetch_survey_tree(&scope).await {
            Ok(records) => {
                let mut surveys: Vec<Survey> = records.into_iter().map(flatten_survey).collect();
                surveys.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
                *self.surveys.write().await = surveys.clone();
                self.loading_surveys.store(false, Ordering::SeqCst);
                surveys
            }
            Err(err) => {
                let mut entry = ActivityEntry::new(
                    ActivityLevel::Error,
                    format!("Erro ao carregar pesquisas: {err}"),
                    ACTIVITY_CATEGORY_SURVEYS,
                );
                if let Some(viewer) = viewer {
                    entry = entry.with_actor(viewer);
                }
                self.logger.log(entry);
                *self.surveys.write().await = Vec::new();
                self.loading_surveys.store(false, Ordering::SeqCst);
                Vec::new()
            }
        }
    }

    /// Fetches all responses for one survey with answers flattened to
    /// `{question_id, value}`. Same failure contract as `fetch_surveys`.
    pub async fn fetch_survey_responses(&self, survey_id: &str) -> Vec<SurveyResponse> {
        match self.gateway.fetch_responses(survey_id).await {
            Ok(records) => {
                let responses: Vec<SurveyResponse> =
                    records.into_iter().map(flatten_response).collect();
                *self.responses.write().await = responses.clone();
                responses
            }
            Err(err) => {
                self.logger.log(ActivityEntry::new(
                    ActivityLevel::Error,
                    format!("Erro ao carregar respostas: {err}"),
                    ACTIVITY_CATEGORY_SURVEYS,
                ));
                *self.responses.write().await = Vec::new();
                Vec::new()
            }
        }
    }

    pub async fn surveys_snapshot(&self) -> Vec<Survey> {
        self.surveys.read().await.clone()
    }

    pub async fn responses_snapshot(&self) -> Vec<SurveyResponse> {
        self.responses.read().await.clone()
    }

    pub fn is_loading_surveys(&self) -> bool {
        self.loading_surveys.load(Ordering::SeqCst)
    }

    /// Subscribes to survey-table changes; every event refetches with the
    /// scope re-resolved from the latest fetch context, not the one captured
    /// at subscribe time. At most one subscription is live: any previous one
    /// is torn down first.
    pub async fn watch_changes(
        self: Arc<Self>,
        feed: Arc<dyn SurveyChangeFeed>,
    ) -> DomainResult<()> {
        let mut receiver = feed.subscribe().await?;

        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            previous.abort();
        }

        let store = Arc::clone(&self);
        *live = Some(tokio::spawn(async move {
            while let Some(change) = receiver.recv().await {
                tracing::debug!(action = ?change.action, "survey change received; refetching");
                let context = store.last_context.read().await.clone();
                store
                    .fetch_surveys(context.company_hint.as_deref(), context.viewer.as_ref())
                    .await;
            }
        }));
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Some(live) = self.live.lock().await.take() {
            live.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::auth::Role;
    use crate::error::DomainError;
    use crate::identity::{UserProfile, UserStatus};
    use crate::ports::surveys::{ChangeAction, SurveyChange};
    use crate::responses::{AnswerRow, NewResponse, ResponseRecord};
    use crate::scope::CompanyScope;
    use crate::DomainResult;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockGateway {
        records: StdMutex<Vec<SurveyRecord>>,
        responses: StdMutex<Vec<ResponseRecord>>,
        fetch_calls: AtomicUsize,
        fail_fetch: AtomicBool,
    }

    impl MockGateway {
        fn with_records(records: Vec<SurveyRecord>) -> Self {
            Self {
                records: StdMutex::new(records),
                ..Self::default()
            }
        }
    }

    impl SurveyGateway for MockGateway {
        fn fetch_survey_tree(
            &self,
            scope: &CompanyScope,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<SurveyRecord>>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let scope = scope.clone();
            Box::pin(async move {
                if self.fail_fetch.load(Ordering::SeqCst) {
                    return Err(DomainError::DataAccess("backend offline".to_string()));
                }
                let records = self.records.lock().expect("records");
                Ok(records
                    .iter()
                    .filter(|record| match &scope {
                        CompanyScope::AllCompanies => true,
                        CompanyScope::Company(company_id) => &record.company_id == company_id,
                    })
                    .cloned()
                    .collect())
            })
        }

        fn fetch_responses(
            &self,
            survey_id: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<ResponseRecord>>> {
            let survey_id = survey_id.to_string();
            Box::pin(async move {
                if self.fail_fetch.load(Ordering::SeqCst) {
                    return Err(DomainError::DataAccess("backend offline".to_string()));
                }
                let responses = self.responses.lock().expect("responses");
                Ok(responses
                    .iter()
                    .filter(|record| record.survey_id == survey_id)
                    .cloned()
                    .collect())
            })
        }

        fn insert_survey(
            &self,
            survey: &NewSurvey,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Option<NewSurvey>>> {
            let survey = survey.clone();
            Box::pin(async move { Ok(Some(survey)) })
        }

        fn update_survey(
            &self,
            _survey_id: &str,
            _patch: &SurveyPatch,
        ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn delete_survey(&self, _survey_id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn delete_questions(
            &self,
            _survey_id: &str,
        ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn insert_questions(
            &self,
            _rows: &[QuestionRow],
        ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn insert_response(
            &self,
            response: &NewResponse,
        ) -> crate::ports::BoxFuture<'_, DomainResult<Option<NewResponse>>> {
            let response = response.clone();
            Box::pin(async move { Ok(Some(response)) })
        }

        fn insert_answers(
            &self,
            _rows: &[AnswerRow],
        ) -> crate::ports::BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[derive(Default)]
    struct RecordingLogger {
        entries: StdMutex<Vec<ActivityEntry>>,
    }

    impl ActivityLogger for RecordingLogger {
        fn log(&self, entry: ActivityEntry) {
            self.entries.lock().expect("entries").push(entry);
        }
    }

    struct ChannelFeed {
        sender: StdMutex<Option<mpsc::Sender<SurveyChange>>>,
    }

    impl SurveyChangeFeed for ChannelFeed {
        fn subscribe(
            &self,
        ) -> crate::ports::BoxFuture<'_, DomainResult<mpsc::Receiver<SurveyChange>>> {
            Box::pin(async move {
                let (sender, receiver) = mpsc::channel(16);
                *self.sender.lock().expect("sender") = Some(sender);
                Ok(receiver)
            })
        }
    }

    fn viewer(role: Role, company_id: Option<&str>) -> Viewer {
        UserProfile {
            user_id: "u-1".to_string(),
            full_name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role,
            company_id: company_id.map(str::to_string),
            permissions: Default::default(),
            status: UserStatus::Active,
        }
    }

    fn record(survey_id: &str, company_id: &str, created_at_ms: i64) -> SurveyRecord {
        SurveyRecord {
            survey_id: survey_id.to_string(),
            title: format!("Pesquisa {survey_id}"),
            company_id: company_id.to_string(),
            created_by: "u-1".to_string(),
            created_at_ms,
            questions: Vec::new(),
            response_ids: Vec::new(),
            company_name: Some("Empresa".to_string()),
            created_by_name: Some("Ana".to_string()),
        }
    }

    #[tokio::test]
    async fn unassigned_viewer_sees_nothing_without_a_gateway_call() {
        let gateway = Arc::new(MockGateway::with_records(vec![record("s-1", "c-1", 1)]));
        let store = SurveyStore::new(gateway.clone(), Arc::new(RecordingLogger::default()));

        let surveys = store
            .fetch_surveys(None, Some(&viewer(Role::User, None)))
            .await;

        assert!(surveys.is_empty());
        assert_eq!(gateway.fetch_calls.load(Ordering::SeqCst), 0);
        assert!(!store.is_loading_surveys());
    }

    #[tokio::test]
    async fn questions_come_back_sorted_with_missing_position_as_zero() {
        let mut rec = record("s-1", "c-1", 1);
        rec.questions = vec![
            QuestionRecord {
                question_id: "q-b".to_string(),
                text: "Segunda".to_string(),
                question_type: QuestionType::Text,
                options: None,
                position: Some(2),
            },
            QuestionRecord {
                question_id: "q-a".to_string(),
                text: "Primeira".to_string(),
                question_type: QuestionType::Rating,
                options: None,
                position: None,
            },
            QuestionRecord {
                question_id: "q-m".to_string(),
                text: "Meio".to_string(),
                question_type: QuestionType::Checkbox,
                options: Some(vec!["a".to_string()]),
                position: Some(1),
            },
        ];
        let gateway = Arc::new(MockGateway::with_records(vec![rec]));
        let store = SurveyStore::new(gateway, Arc::new(RecordingLogger::default()));

        let surveys = store
            .fetch_surveys(None, Some(&viewer(Role::Admin, Some("c-1"))))
            .await;

        let positions: Vec<i64> = surveys[0]
            .questions
            .iter()
            .map(|question| question.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(surveys[0].questions[0].question_id, "q-a");
    }

    #[tokio::test]
    async fn refetch_with_unchanged_data_is_idempotent() {
        let gateway = Arc::new(MockGateway::with_records(vec![
            record("s-1", "c-1", 10),
            record("s-2", "c-1", 20),
        ]));
        let store = SurveyStore::new(gateway, Arc::new(RecordingLogger::default()));
        let viewer = viewer(Role::Admin, Some("c-1"));

        let first = store.fetch_surveys(None, Some(&viewer)).await;
        let second = store.fetch_surveys(None, Some(&viewer)).await;

        assert_eq!(first, second);
        assert_eq!(first[0].survey_id, "s-2");
    }

    #[tokio::test]
    async fn missing_joins_fall_back_to_placeholder_names() {
        let mut rec = record("s-1", "c-1", 1);
        rec.company_name = None;
        rec.created_by_name = None;
        rec.response_ids = vec!["r-1".to_string(), "r-2".to_string()];
        let survey = flatten_survey(rec);

        assert_eq!(survey.company_name, FALLBACK_COMPANY_NAME);
        assert_eq!(survey.created_by_name, FALLBACK_CREATOR_NAME);
        assert_eq!(survey.response_count, 2);
    }

    #[tokio::test]
    async fn fetch_failure_clears_the_snapshot_and_logs() {
        let gateway = Arc::new(MockGateway::with_records(vec![record("s-1", "c-1", 1)]));
        let logger = Arc::new(RecordingLogger::default());
        let store = SurveyStore::new(gateway.clone(), logger.clone());
        let viewer = viewer(Role::Admin, Some("c-1"));

        assert_eq!(store.fetch_surveys(None, Some(&viewer)).await.len(), 1);

        gateway.fail_fetch.store(true, Ordering::SeqCst);
        let surveys = store.fetch_surveys(None, Some(&viewer)).await;

        assert!(surveys.is_empty());
        assert!(store.surveys_snapshot().await.is_empty());
        let entries = logger.entries.lock().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, ActivityLevel::Error);
        assert_eq!(entries[0].actor_id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn response_fetch_failure_clears_and_logs() {
        let gateway = Arc::new(MockGateway::default());
        gateway.responses.lock().expect("responses").push(ResponseRecord {
            response_id: "r-1".to_string(),
            survey_id: "s-1".to_string(),
            respondent_id: "u-2".to_string(),
            answers: vec![AnswerRow {
                answer_id: "a-1".to_string(),
                response_id: "r-1".to_string(),
                question_id: "q-1".to_string(),
                value: crate::responses::AnswerValue::Text("5".to_string()),
            }],
        });
        let logger = Arc::new(RecordingLogger::default());
        let store = SurveyStore::new(gateway.clone(), logger.clone());

        let responses = store.fetch_survey_responses("s-1").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].answers[0].question_id, "q-1");

        gateway.fail_fetch.store(true, Ordering::SeqCst);
        assert!(store.fetch_survey_responses("s-1").await.is_empty());
        assert!(store.responses_snapshot().await.is_empty());
        assert_eq!(logger.entries.lock().expect("entries").len(), 1);
    }

    #[tokio::test]
    async fn change_events_refetch_with_latest_scope() {
        let gateway = Arc::new(MockGateway::with_records(vec![record("s-1", "c-1", 1)]));
        let store = Arc::new(SurveyStore::new(
            gateway.clone(),
            Arc::new(RecordingLogger::default()),
        ));
        let feed = Arc::new(ChannelFeed {
            sender: StdMutex::new(None),
        });

        store
            .clone()
            .watch_changes(feed.clone())
            .await
            .expect("subscribe");
        store
            .fetch_surveys(None, Some(&viewer(Role::Admin, Some("c-1"))))
            .await;
        let calls_before = gateway.fetch_calls.load(Ordering::SeqCst);

        let sender = feed
            .sender
            .lock()
            .expect("sender")
            .clone()
            .expect("subscribed");
        sender
            .send(SurveyChange {
                action: ChangeAction::Create,
                survey_id: Some("s-9".to_string()),
            })
            .await
            .expect("send");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(gateway.fetch_calls.load(Ordering::SeqCst), calls_before + 1);

        store.shutdown().await;
    }

    #[tokio::test]
    async fn resubscribing_tears_down_the_previous_subscription() {
        let gateway = Arc::new(MockGateway::with_records(vec![record("s-1", "c-1", 1)]));
        let store = Arc::new(SurveyStore::new(
            gateway.clone(),
            Arc::new(RecordingLogger::default()),
        ));
        let feed = Arc::new(ChannelFeed {
            sender: StdMutex::new(None),
        });

        store.clone().watch_changes(feed.clone()).await.expect("first");
        let first_sender = feed.sender.lock().expect("sender").clone().expect("first");
        store.clone().watch_changes(feed.clone()).await.expect("second");

        store
            .fetch_surveys(None, Some(&viewer(Role::Admin, Some("c-1"))))
            .await;
        let calls_before = gateway.fetch_calls.load(Ordering::SeqCst);

        // The aborted first subscription no longer drives refetches.
        let _ = first_sender
            .send(SurveyChange {
                action: ChangeAction::Update,
                survey_id: None,
            })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(gateway.fetch_calls.load(Ordering::SeqCst), calls_before);

        store.shutdown().await;
    }
}
