//! End-to-end tests driving the engine and orchestrator over the
//! in-memory adapters with a scripted generation service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use formflow::adapters::ai::MockGenerationService;
use formflow::adapters::cache::TtlCache;
use formflow::adapters::memory::{
    InMemoryChatLogRepository, InMemorySessionRepository, InMemorySnapshotRepository,
};
use formflow::application::{
    EngineError, EngineOptions, FormOrchestrator, ProgressFormEngine, SessionStore,
    ToolDescriptor, ToolHandler, ToolOutcome, ToolRegistry,
};
use formflow::config::GenerationConfig;
use formflow::domain::form::{FieldSpec, FormModel, FormState};
use formflow::domain::foundation::{ClientId, ErrorCode, FormPhase, SessionId, UserId};
use formflow::ports::{GenerationError, GenerationSettings, SnapshotRepository};

/// Test-wide log capture; `RUST_LOG=formflow=debug cargo test` shows
/// the engine's tracing output for failing tests.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct StartupForm {
    #[serde(default)]
    idea_desc: String,
    #[serde(default)]
    target_mkt: String,
    #[serde(default)]
    biz_model: String,
    #[serde(default)]
    team_info: String,
}

impl FormModel for StartupForm {
    fn schema_name() -> &'static str {
        "StartupForm"
    }

    fn field_specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("idea_desc", "string", "What the startup builds"),
            FieldSpec::new("target_mkt", "string", "Who buys it"),
            FieldSpec::new("biz_model", "string", "How it makes money"),
            FieldSpec::new("team_info", "string", "Who is building it"),
        ]
    }
}

struct Harness {
    sessions: Arc<InMemorySessionRepository>,
    snapshots: Arc<InMemorySnapshotRepository>,
    chat_log: Arc<InMemoryChatLogRepository>,
    service: Arc<MockGenerationService>,
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        Self {
            sessions: Arc::new(InMemorySessionRepository::new()),
            snapshots: Arc::new(InMemorySnapshotRepository::new()),
            chat_log: Arc::new(InMemoryChatLogRepository::new()),
            service: Arc::new(MockGenerationService::new()),
        }
    }

    fn store(&self) -> SessionStore {
        // Private cache tiers keep tests independent of each other.
        SessionStore::with_caches(
            self.sessions.clone(),
            self.snapshots.clone(),
            self.chat_log.clone(),
            Arc::new(TtlCache::new()),
            Arc::new(TtlCache::new()),
        )
    }

    fn engine(&self) -> ProgressFormEngine<StartupForm> {
        ProgressFormEngine::new(self.store(), self.service.clone(), EngineOptions::default())
    }

    async fn initialized_engine(&self) -> (ProgressFormEngine<StartupForm>, SessionId) {
        let mut engine = self.engine();
        let id = engine
            .initialize(
                None,
                UserId::new("user-1").unwrap(),
                ClientId::new("test").unwrap(),
            )
            .await
            .unwrap();
        (engine, id)
    }
}

fn turn_response(idea: &str, progress: i64, next_question: &str) -> serde_json::Value {
    json!({
        "form": {
            "idea_desc": idea,
            "target_mkt": "",
            "biz_model": "",
            "team_info": ""
        },
        "progress": progress,
        "feedback": "Good start.",
        "confidence": 0.9,
        "next_question": next_question,
        "next_question_explanation": "The market is still unknown."
    })
}

#[tokio::test]
async fn first_message_advances_progress_and_carries_context() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;
    engine.seed_question("Tell me about your startup idea.");

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who is your target market?"));

    let state = engine.process_form("We build solar drones").await.unwrap();

    assert!(state.progress.value() > 0);
    assert_eq!(state.phase(), FormPhase::InProgress);
    assert_eq!(state.prev_answer, "We build solar drones");
    assert_eq!(state.prev_question, "Tell me about your startup idea.");
    assert_eq!(state.next_question, "Who is your target market?");
    assert_eq!(state.form.idea_desc, "solar drones");
    assert!(!engine.is_dirty());
}

#[tokio::test]
async fn save_is_idempotent_until_state_changes() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();

    let writes_after_turn = harness.snapshots.write_count();
    assert_eq!(writes_after_turn, 1);

    // A clean state saves nothing, no matter how often it is asked.
    assert!(!engine.save_current_state(false).await.unwrap());
    assert!(!engine.save_current_state(false).await.unwrap());
    assert_eq!(harness.snapshots.write_count(), writes_after_turn);

    // Force writes exactly one more snapshot.
    assert!(engine.save_current_state(true).await.unwrap());
    assert_eq!(harness.snapshots.write_count(), writes_after_turn + 1);
}

#[tokio::test]
async fn failed_save_keeps_state_dirty_for_retry() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();

    // Second turn: the latest state is cached, so only the save hits
    // the failing repository.
    harness
        .service
        .push_response(turn_response("solar drones", 50, "How do you earn?"));
    harness.snapshots.set_failing(true);
    assert!(engine.process_form("Farmers").await.is_err());
    assert!(engine.is_dirty());
    assert_eq!(engine.progress().value(), 50);

    harness.snapshots.set_failing(false);
    assert!(engine.save_current_state(false).await.unwrap());
    assert!(!engine.is_dirty());
}

#[tokio::test]
async fn cached_state_survives_repository_outage() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 40, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();

    harness.snapshots.set_failing(true);
    let restored = engine.refresh_current_state().await.unwrap();
    assert!(restored);
    assert_eq!(engine.progress().value(), 40);
}

#[tokio::test]
async fn corrupt_snapshot_degrades_to_fresh_state() {
    let harness = Harness::new();
    let (mut engine, id) = harness.initialized_engine().await;

    // A snapshot whose form field has the wrong shape entirely.
    let corrupt = formflow::domain::session::StateSnapshot::new(
        id,
        json!({"form": 42, "progress": 60}),
        formflow::domain::foundation::Progress::new(60),
    );
    harness.snapshots.append(&corrupt).await.unwrap();
    engine.store().clear_cache(None);

    let restored = engine.refresh_current_state().await.unwrap();
    assert!(!restored);
    assert_eq!(engine.state(), &FormState::<StartupForm>::default());
    // Dirty, so the next save replaces the unusable latest snapshot.
    assert!(engine.is_dirty());
}

#[tokio::test]
async fn repository_outage_during_refresh_propagates() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;
    engine.store().clear_cache(None);

    harness.snapshots.set_failing(true);
    let err = engine.refresh_current_state().await.unwrap_err();
    match err {
        EngineError::Domain(e) => assert_eq!(e.code, ErrorCode::DatabaseError),
        other => panic!("expected domain error, got {:?}", other),
    }
}

#[tokio::test]
async fn generation_errors_propagate_unchanged_and_leave_state_alone() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_error(GenerationError::RateLimited { retry_after_secs: 7 });

    let err = engine.process_form("hello").await.unwrap_err();
    match err {
        EngineError::Generation(GenerationError::RateLimited { retry_after_secs }) => {
            assert_eq!(retry_after_secs, 7)
        }
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert_eq!(engine.state(), &FormState::<StartupForm>::default());
    assert_eq!(harness.snapshots.write_count(), 0);
}

#[tokio::test]
async fn batch_processing_persists_once_at_the_end() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));
    harness
        .service
        .push_response(turn_response("solar drones", 50, "How do you earn?"));

    let messages = vec!["We build solar drones".to_string(), "Farmers".to_string()];
    let state = engine.process_form_batch(&messages).await.unwrap();

    assert_eq!(state.progress.value(), 50);
    assert_eq!(state.prev_answer, "Farmers");
    assert_eq!(harness.snapshots.write_count(), 1);
}

#[tokio::test]
async fn state_round_trips_through_a_new_engine() {
    let harness = Harness::new();
    let (mut engine, id) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 35, "Who buys them?"));
    let saved = engine.process_form("We build solar drones").await.unwrap();

    let mut reloaded = harness.engine();
    reloaded
        .initialize(
            Some(id),
            UserId::new("user-1").unwrap(),
            ClientId::new("test").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(reloaded.state(), &saved);

    // The tail of the history is the same snapshot, field for field.
    let history = reloaded.store().get_snapshot_history(None).await.unwrap();
    let tail = FormState::<StartupForm>::from_document(history.last().unwrap().state()).unwrap();
    assert_eq!(tail, saved);
}

#[tokio::test]
async fn initialize_with_unknown_session_id_fails() {
    let harness = Harness::new();
    let mut engine = harness.engine();

    let err = engine
        .initialize(
            Some(SessionId::new()),
            UserId::new("user-1").unwrap(),
            ClientId::new("test").unwrap(),
        )
        .await
        .unwrap_err();
    match err {
        EngineError::Domain(e) => assert_eq!(e.code, ErrorCode::SessionNotFound),
        other => panic!("expected domain error, got {:?}", other),
    }
}

#[tokio::test]
async fn temporary_session_restores_everything_on_drop() {
    let harness = Harness::new();
    let (mut engine, original_id) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 30, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();
    let state_before = engine.state().clone();

    // A second session with different content.
    let other_id = {
        let (mut other, id) = harness.initialized_engine().await;
        harness
            .service
            .push_response(turn_response("a bakery", 80, "Who is on the team?"));
        other.process_form("We run a bakery").await.unwrap();
        id
    };

    {
        let guard = engine.temporary_session(other_id).await.unwrap();
        assert_eq!(guard.store().bound_session_id(), Some(other_id));
        assert_eq!(guard.progress().value(), 80);
    }

    assert_eq!(engine.store().bound_session_id(), Some(original_id));
    assert_eq!(engine.state(), &state_before);
    assert!(!engine.is_dirty());
}

#[tokio::test]
async fn temporary_session_restores_during_panic() {
    let harness = Harness::new();
    let (mut engine, original_id) = harness.initialized_engine().await;
    let (_, other_id) = harness.initialized_engine().await;

    let guard = engine.temporary_session(other_id).await.unwrap();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _guard = guard;
        panic!("boom");
    }));
    assert!(result.is_err());

    assert_eq!(engine.store().bound_session_id(), Some(original_id));
}

#[tokio::test]
async fn session_history_leaves_binding_untouched() {
    let harness = Harness::new();
    let (mut engine, original_id) = harness.initialized_engine().await;

    let other_id = {
        let (mut other, id) = harness.initialized_engine().await;
        harness
            .service
            .push_response(turn_response("a bakery", 20, "Who buys bread?"));
        harness
            .service
            .push_response(turn_response("a bakery", 60, "How do you earn?"));
        other.process_form("We run a bakery").await.unwrap();
        other.process_form("Locals").await.unwrap();
        id
    };

    let history = engine.get_session_history(other_id, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].progress().value(), 20);
    assert_eq!(history[1].progress().value(), 60);
    assert_eq!(engine.store().bound_session_id(), Some(original_id));

    // A limit keeps the oldest snapshots.
    let head = engine.get_session_history(other_id, Some(1)).await.unwrap();
    assert_eq!(head.len(), 1);
    assert_eq!(head[0].progress().value(), 20);
}

#[tokio::test]
async fn two_sessions_do_not_contaminate_each_other() {
    let harness = Harness::new();
    let (_, id_a) = harness.initialized_engine().await;
    let (_, id_b) = harness.initialized_engine().await;
    assert_ne!(id_a, id_b);

    // Each engine gets its own scripted service so the concurrent
    // turns cannot steal each other's responses.
    let service_a = Arc::new(MockGenerationService::new());
    service_a.push_response(turn_response("solar drones", 30, "Who buys them?"));
    let service_b = Arc::new(MockGenerationService::new());
    service_b.push_response(turn_response("a bakery", 70, "Who is on the team?"));
    let mut engine_a =
        ProgressFormEngine::<StartupForm>::new(harness.store(), service_a, EngineOptions::default());
    let mut engine_b =
        ProgressFormEngine::<StartupForm>::new(harness.store(), service_b, EngineOptions::default());

    let (res_a, res_b) = tokio::join!(
        async {
            engine_a
                .initialize(
                    Some(id_a),
                    UserId::new("user-1").unwrap(),
                    ClientId::new("test").unwrap(),
                )
                .await?;
            engine_a.process_form("We build solar drones").await
        },
        async {
            engine_b
                .initialize(
                    Some(id_b),
                    UserId::new("user-1").unwrap(),
                    ClientId::new("test").unwrap(),
                )
                .await?;
            engine_b.process_form("We run a bakery").await
        }
    );
    res_a.unwrap();
    res_b.unwrap();

    engine_a.refresh_current_state().await.unwrap();
    engine_b.refresh_current_state().await.unwrap();
    assert_eq!(engine_a.state().form.idea_desc, "solar drones");
    assert_eq!(engine_a.progress().value(), 30);
    assert_eq!(engine_b.state().form.idea_desc, "a bakery");
    assert_eq!(engine_b.progress().value(), 70);
}

struct AnalyzeTool;

#[async_trait]
impl ToolHandler<StartupForm> for AnalyzeTool {
    async fn run(
        &self,
        engine: &mut ProgressFormEngine<StartupForm>,
        _message: &str,
    ) -> Result<ToolOutcome<StartupForm>, EngineError> {
        let verdict = json!({
            "verdict": "promising",
            "idea": engine.state().form.idea_desc,
        });
        Ok(ToolOutcome::Custom {
            tool_name: "analyze".to_string(),
            value: verdict,
        })
    }
}

fn registry_with_analyze() -> ToolRegistry<StartupForm> {
    ToolRegistry::new(vec![ToolDescriptor::new(
        "analyze",
        "Analyze the completed startup form and give a verdict.",
        Arc::new(AnalyzeTool),
    )])
    .unwrap()
}

#[tokio::test]
async fn orchestrator_runs_selected_custom_tool_on_completed_form() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 100, ""));
    engine.process_form("Everything else is in the deck").await.unwrap();
    assert_eq!(engine.phase(), FormPhase::Complete);

    let mut orchestrator = FormOrchestrator::new(engine, registry_with_analyze());
    harness.service.push_response(json!({
        "tool_name": "analyze",
        "confidence": 0.95,
        "reasoning": "The form is complete and the user asked for a verdict."
    }));

    let outcome = orchestrator.determine_action("Please analyze my startup").await.unwrap();
    match outcome {
        ToolOutcome::Custom { tool_name, value } => {
            assert_eq!(tool_name, "analyze");
            assert_eq!(value["verdict"], "promising");
            assert_eq!(value["idea"], "solar drones");
        }
        ToolOutcome::FormUpdate(_) => panic!("expected the analyze tool to run"),
    }
}

#[tokio::test]
async fn complete_form_still_accepts_further_turns() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 100, ""));
    engine.process_form("All done").await.unwrap();
    assert_eq!(engine.phase(), FormPhase::Complete);

    harness
        .service
        .push_response(turn_response("solar drones for farms", 100, ""));
    let state = engine.process_form("Actually, they are for farms").await.unwrap();
    assert_eq!(state.form.idea_desc, "solar drones for farms");
    assert_eq!(harness.snapshots.write_count(), 2);
}

#[tokio::test]
async fn unknown_tool_name_falls_back_to_update_form() {
    let harness = Harness::new();
    let (engine, _) = harness.initialized_engine().await;
    let mut orchestrator = FormOrchestrator::new(engine, registry_with_analyze());

    harness.service.push_response(json!({
        "tool_name": "summon_unicorn",
        "confidence": 0.4,
        "reasoning": "No tool really fits."
    }));
    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));

    let outcome = orchestrator.determine_action("We build solar drones").await.unwrap();
    match outcome {
        ToolOutcome::FormUpdate(state) => {
            assert_eq!(state.form.idea_desc, "solar drones");
        }
        ToolOutcome::Custom { .. } => panic!("expected the default tool to run"),
    }
}

#[tokio::test]
async fn empty_registry_is_a_configuration_error() {
    let err = ToolRegistry::<StartupForm>::new(vec![]).err().unwrap();
    assert_eq!(err.code, ErrorCode::ConfigurationInvalid);
}

#[tokio::test]
async fn empty_tool_description_is_a_configuration_error() {
    let err = ToolRegistry::<StartupForm>::new(vec![ToolDescriptor::new(
        "analyze",
        "",
        Arc::new(AnalyzeTool),
    )])
    .err()
    .unwrap();
    assert_eq!(err.code, ErrorCode::ConfigurationInvalid);
}

#[tokio::test]
async fn chat_log_records_both_sides_of_the_turn() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();

    let messages = engine.store().get_messages(10).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content(), "We build solar drones");
    assert_eq!(messages[1].content(), "Who buys them?");
}

#[tokio::test]
async fn prompt_carries_structure_state_and_message() {
    let harness = Harness::new();
    let (mut engine, _) = harness.initialized_engine().await;

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();

    let request = harness.service.last_request().unwrap();
    assert_eq!(request.user_message(), Some("We build solar drones"));
    assert_eq!(request.response_schema().name, "StartupForm");
    let rendered = format!("{:?}", request.blocks());
    assert!(rendered.contains("FORM_STRUCTURE"));
    assert!(rendered.contains("idea_desc"));
    assert!(rendered.contains("CURRENT_STATE"));
}

#[tokio::test]
async fn configured_sampling_settings_reach_the_request() {
    let harness = Harness::new();
    let options = EngineOptions {
        generation: Some(GenerationSettings::from(&GenerationConfig::default())),
        ..Default::default()
    };
    let mut engine =
        ProgressFormEngine::<StartupForm>::new(harness.store(), harness.service.clone(), options);
    engine
        .initialize(
            None,
            UserId::new("user-1").unwrap(),
            ClientId::new("test").unwrap(),
        )
        .await
        .unwrap();

    harness
        .service
        .push_response(turn_response("solar drones", 25, "Who buys them?"));
    engine.process_form("We build solar drones").await.unwrap();

    let request = harness.service.last_request().unwrap();
    let settings = request.settings().unwrap();
    assert_eq!(settings.model, GenerationConfig::default().model);
    assert_eq!(settings.temperature, GenerationConfig::default().temperature);
}
