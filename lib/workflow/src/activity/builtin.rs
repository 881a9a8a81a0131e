//! Activities the built-in workflows schedule.

use crate::activity::{
    Activity, ActivityContext, ActivityError, ActivityRegistry, RetryPolicy, decode_input,
    encode_output,
};
use crate::workflows::daily_reflection::{
    DailyReflectionInput, REFLECTIONS_COLLECTION, ReflectionSummary,
};
use crate::workflows::focus_loop::FEEDBACK_COLLECTION;
use crate::workflows::morning_check::{DayPlan, MorningCheckInput};
use crate::workflows::weekly_growth::{MicroGoal, ProposeGoalsInput, WeeklyGrowthInput, WeeklyStats};
use async_trait::async_trait;
use flowmentor_ai::prompt::{DAILY_SUMMARY, DAY_PLAN_TIPS, MICRO_GOALS};
use flowmentor_ai::{PromptRegistry, TextGenerator};
use flowmentor_core::UserId;
use flowmentor_integration::{DocumentFilter, DocumentStore, Notification, Notifier};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const GENERATE_DAY_PLAN: &str = "generate_day_plan";
pub const SUMMARIZE_DAY: &str = "summarize_day";
pub const AGGREGATE_WEEK: &str = "aggregate_week";
pub const PROPOSE_MICRO_GOALS: &str = "propose_micro_goals";
pub const PUT_DOCUMENT: &str = "put_document";
pub const SEND_NOTIFICATION: &str = "send_notification";

/// Input of [`PUT_DOCUMENT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutDocumentInput {
    pub collection: String,
    pub key: String,
    pub document: JsonValue,
}

/// Input of [`SEND_NOTIFICATION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendNotificationInput {
    pub user_id: String,
    pub message: String,
}

/// The services built-in activities talk to.
#[derive(Clone)]
pub struct ActivityServices {
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,
    pub generator: Arc<dyn TextGenerator>,
    pub prompts: Arc<PromptRegistry>,
}

impl fmt::Debug for ActivityServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityServices")
            .field("model", &self.generator.model())
            .field("prompts", &self.prompts.len())
            .finish_non_exhaustive()
    }
}

impl ActivityServices {
    async fn generate(
        &self,
        template: &str,
        variables: HashMap<String, JsonValue>,
    ) -> Result<String, ActivityError> {
        let request = self.prompts.request(template, &variables)?;
        Ok(self.generator.generate(&request).await?)
    }
}

impl ActivityRegistry {
    /// Creates a registry holding every built-in activity.
    #[must_use]
    pub fn standard(services: &ActivityServices) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GenerateDayPlan(services.clone())));
        registry.register(Arc::new(SummarizeDay(services.clone())));
        registry.register(Arc::new(AggregateWeek(services.clone())));
        registry.register(Arc::new(ProposeMicroGoals(services.clone())));
        registry.register(Arc::new(PutDocument(services.clone())));
        registry.register(Arc::new(SendNotification(services.clone())));
        registry
    }
}

fn generation_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(1)).with_max_interval(Duration::from_secs(10))
}

fn vars<const N: usize>(pairs: [(&str, JsonValue); N]) -> HashMap<String, JsonValue> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Splits generated text into at most three short tips.
fn tips(text: &str) -> Vec<String> {
    text.split(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(3)
        .map(|s| format!("{s}."))
        .collect()
}

struct GenerateDayPlan(ActivityServices);

#[async_trait]
impl Activity for GenerateDayPlan {
    fn kind(&self) -> &'static str {
        GENERATE_DAY_PLAN
    }

    fn retry_policy(&self) -> RetryPolicy {
        generation_policy()
    }

    async fn execute(&self, ctx: &ActivityContext, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let input: MorningCheckInput = decode_input(self.kind(), input)?;
        if !(1..=5).contains(&input.energy_level) {
            return Err(ActivityError::permanent(format!(
                "energy level must be between 1 and 5, got {}",
                input.energy_level
            )));
        }

        tracing::info!(user_id = %input.user_id, date = %input.date, attempt = ctx.attempt, "generating day plan");
        let text = self
            .0
            .generate(
                DAY_PLAN_TIPS,
                vars([
                    ("energy_level", json!(input.energy_level)),
                    ("priorities", json!(input.priorities)),
                    ("morning_reflection", json!(input.morning_reflection)),
                ]),
            )
            .await?;

        encode_output(&DayPlan::build(&input, tips(&text)))
    }
}

struct SummarizeDay(ActivityServices);

#[async_trait]
impl Activity for SummarizeDay {
    fn kind(&self) -> &'static str {
        SUMMARIZE_DAY
    }

    fn retry_policy(&self) -> RetryPolicy {
        generation_policy()
    }

    async fn execute(&self, _ctx: &ActivityContext, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let input: DailyReflectionInput = decode_input(self.kind(), input)?;
        let text = self
            .0
            .generate(
                DAILY_SUMMARY,
                vars([
                    ("completed_blocks", json!(input.completed_blocks)),
                    ("total_blocks", json!(input.total_blocks)),
                    ("overall_productivity", json!(input.overall_productivity)),
                    ("wins", json!(input.wins)),
                    ("challenges", json!(input.challenges)),
                    ("reflection_text", json!(input.reflection_text)),
                ]),
            )
            .await?;

        encode_output(&ReflectionSummary::build(&input, text))
    }
}

struct AggregateWeek(ActivityServices);

#[async_trait]
impl Activity for AggregateWeek {
    fn kind(&self) -> &'static str {
        AGGREGATE_WEEK
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1)).with_max_interval(Duration::from_secs(10))
    }

    async fn execute(&self, _ctx: &ActivityContext, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let input: WeeklyGrowthInput = decode_input(self.kind(), input)?;
        let filter = DocumentFilter::new()
            .eq("user_id", input.user_id.as_str())
            .between("date", input.week_start.as_str(), input.week_end.as_str());

        let reflections = self.0.store.query(REFLECTIONS_COLLECTION, &filter).await?;
        let blocks = self.0.store.query(FEEDBACK_COLLECTION, &filter).await?;

        let reflections: Vec<JsonValue> = reflections.into_iter().map(|d| d.document).collect();
        let blocks: Vec<JsonValue> = blocks.into_iter().map(|d| d.document).collect();
        let stats = aggregate(&reflections, &blocks);
        tracing::info!(
            user_id = %input.user_id,
            reflections = reflections.len(),
            blocks = blocks.len(),
            completion_rate = stats.completion_rate,
            "aggregated week"
        );
        encode_output(&stats)
    }
}

/// Folds a week of reflections and block feedback into stats.
fn aggregate(reflections: &[JsonValue], blocks: &[JsonValue]) -> WeeklyStats {
    let count = |doc: &JsonValue, field: &str| {
        doc.get(field)
            .and_then(JsonValue::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    };
    let strings = |doc: &JsonValue, field: &str| -> Vec<String> {
        doc.get(field)
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let completed: u32 = reflections.iter().map(|r| count(r, "completed_blocks")).sum();
    let planned: u32 = reflections.iter().map(|r| count(r, "total_blocks")).sum();

    let ratings: Vec<u32> = reflections
        .iter()
        .map(|r| count(r, "overall_productivity"))
        .filter(|rating| *rating > 0)
        .collect();
    let average_productivity = if ratings.is_empty() {
        0.0
    } else {
        round1(f64::from(ratings.iter().sum::<u32>()) / ratings.len() as f64)
    };

    let focus_minutes: u32 = blocks.iter().map(|b| count(b, "duration_minutes")).sum();

    let mut top_achievements: Vec<String> = Vec::new();
    for win in reflections.iter().flat_map(|r| strings(r, "wins")) {
        if top_achievements.len() < 3 && !top_achievements.contains(&win) {
            top_achievements.push(win);
        }
    }

    let mut challenge_days: Vec<(String, usize)> = Vec::new();
    for challenge in reflections.iter().flat_map(|r| strings(r, "challenges")) {
        match challenge_days.iter_mut().find(|(name, _)| *name == challenge) {
            Some((_, days)) => *days += 1,
            None => challenge_days.push((challenge, 1)),
        }
    }
    challenge_days.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let recurring_challenges = challenge_days
        .into_iter()
        .filter(|(_, days)| *days >= 2)
        .map(|(name, _)| name)
        .collect();

    let completion_rate = if planned == 0 {
        0.0
    } else {
        round1(f64::from(completed) / f64::from(planned) * 100.0)
    };

    WeeklyStats {
        total_blocks_completed: completed,
        total_blocks_planned: planned,
        average_productivity,
        total_focus_hours: round1(f64::from(focus_minutes) / 60.0),
        top_achievements,
        recurring_challenges,
        completion_rate,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

struct ProposeMicroGoals(ActivityServices);

#[async_trait]
impl Activity for ProposeMicroGoals {
    fn kind(&self) -> &'static str {
        PROPOSE_MICRO_GOALS
    }

    fn retry_policy(&self) -> RetryPolicy {
        generation_policy()
    }

    async fn execute(&self, _ctx: &ActivityContext, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let ProposeGoalsInput { stats, .. } = decode_input(self.kind(), input)?;
        let recurring = if stats.recurring_challenges.is_empty() {
            json!("none recorded")
        } else {
            json!(stats.recurring_challenges)
        };
        let rationale = self
            .0
            .generate(
                MICRO_GOALS,
                vars([
                    ("completion_rate", json!(stats.completion_rate)),
                    ("average_productivity", json!(stats.average_productivity)),
                    ("recurring_challenges", recurring),
                ]),
            )
            .await?;

        encode_output(&micro_goals(&stats, &rationale))
    }
}

/// The three goals offered for next week.
fn micro_goals(stats: &WeeklyStats, rationale: &str) -> Vec<MicroGoal> {
    let target = (stats.completion_rate + 10.0).clamp(50.0, 100.0).round();
    let challenge = stats.recurring_challenges.first();

    vec![
        MicroGoal {
            goal_id: "goal-1".to_string(),
            title: "Increase Focus Block Completion".to_string(),
            description: format!("Complete {target}% of planned focus blocks"),
            rationale: format!(
                "You completed {}% of planned blocks last week. {rationale}",
                stats.completion_rate
            ),
            suggested_actions: vec![
                "Schedule blocks earlier in the day".to_string(),
                "Add buffer time between blocks".to_string(),
            ],
            difficulty: 2,
        },
        MicroGoal {
            goal_id: "goal-2".to_string(),
            title: match challenge {
                Some(challenge) => format!("Tackle: {challenge}"),
                None => "Protect Your Peak Hours".to_string(),
            },
            description: match challenge {
                Some(challenge) => format!("Plan one concrete counter-measure for '{challenge}'"),
                None => "Keep your most focused hours free of meetings".to_string(),
            },
            rationale: format!("Recurring friction costs more than one bad day. {rationale}"),
            suggested_actions: vec![
                "Note when the challenge shows up".to_string(),
                "Try one change for the whole week".to_string(),
            ],
            difficulty: 3,
        },
        MicroGoal {
            goal_id: "goal-3".to_string(),
            title: "Reduce Interruptions".to_string(),
            description: "Batch meetings and messages outside focus blocks".to_string(),
            rationale: format!("Longer uninterrupted stretches raise productivity. {rationale}"),
            suggested_actions: vec![
                "Designate specific meeting hours".to_string(),
                "Use do-not-disturb during blocks".to_string(),
            ],
            difficulty: 4,
        },
    ]
}

struct PutDocument(ActivityServices);

#[async_trait]
impl Activity for PutDocument {
    fn kind(&self) -> &'static str {
        PUT_DOCUMENT
    }

    async fn execute(&self, _ctx: &ActivityContext, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let PutDocumentInput {
            collection,
            key,
            document,
        } = decode_input(self.kind(), input)?;
        self.0.store.put(&collection, &key, document).await?;
        Ok(json!({"collection": collection, "key": key}))
    }
}

struct SendNotification(ActivityServices);

#[async_trait]
impl Activity for SendNotification {
    fn kind(&self) -> &'static str {
        SEND_NOTIFICATION
    }

    async fn execute(&self, ctx: &ActivityContext, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let SendNotificationInput { user_id, message } = decode_input(self.kind(), input)?;
        let user_id = UserId::new(user_id).map_err(|e| ActivityError::permanent(e.to_string()))?;
        self.0
            .notifier
            .send(&Notification {
                user_id,
                message,
                idempotency_key: ctx.idempotency_key.clone(),
            })
            .await?;
        Ok(json!({"delivered": true}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmentor_ai::{GenerationError, StaticTextGenerator};
    use flowmentor_core::WorkflowRunId;
    use flowmentor_integration::{InMemoryDocumentStore, RecordingNotifier};

    struct Fixture {
        registry: ActivityRegistry,
        store: Arc<InMemoryDocumentStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(generator: StaticTextGenerator) -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let services = ActivityServices {
            store: store.clone(),
            notifier: notifier.clone(),
            generator: Arc::new(generator),
            prompts: Arc::new(PromptRegistry::standard()),
        };
        Fixture {
            registry: ActivityRegistry::standard(&services),
            store,
            notifier,
        }
    }

    fn ctx() -> ActivityContext {
        let run_id = WorkflowRunId::new();
        ActivityContext {
            run_id,
            step: 0,
            attempt: 1,
            idempotency_key: format!("{run_id}:0"),
        }
    }

    async fn run(f: &Fixture, kind: &str, input: JsonValue) -> Result<JsonValue, ActivityError> {
        let activity = f.registry.get(kind).expect("registered");
        activity.execute(&ctx(), input).await
    }

    #[test]
    fn standard_registry_kinds() {
        let f = fixture(StaticTextGenerator::sample());
        assert_eq!(
            f.registry.kinds(),
            vec![
                AGGREGATE_WEEK,
                GENERATE_DAY_PLAN,
                PROPOSE_MICRO_GOALS,
                PUT_DOCUMENT,
                SEND_NOTIFICATION,
                SUMMARIZE_DAY
            ]
        );
    }

    #[test]
    fn tips_split_sentences() {
        assert_eq!(
            tips("Start early. Walk a bit.\nStop on time. Extra."),
            vec!["Start early.", "Walk a bit.", "Stop on time."]
        );
    }

    #[tokio::test]
    async fn day_plan_uses_generated_tips() {
        let f = fixture(StaticTextGenerator::sample());
        let plan = run(
            &f,
            GENERATE_DAY_PLAN,
            json!({
                "user_id": "demo-user",
                "date": "2024-06-03",
                "energy_level": 4,
                "priorities": ["Write report"],
            }),
        )
        .await
        .expect("plan");

        assert_eq!(plan["focus_blocks"][0]["duration_minutes"], 90);
        assert_eq!(plan["micro_tips"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn out_of_range_energy_is_permanent() {
        let f = fixture(StaticTextGenerator::sample());
        let err = run(
            &f,
            GENERATE_DAY_PLAN,
            json!({"user_id": "demo-user", "date": "2024-06-03", "energy_level": 9}),
        )
        .await
        .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn generator_outage_is_transient() {
        let f = fixture(StaticTextGenerator::failing(GenerationError::Unavailable {
            reason: "no backend".to_string(),
        }));
        let err = run(
            &f,
            SUMMARIZE_DAY,
            json!({"user_id": "demo-user", "date": "2024-06-03"}),
        )
        .await
        .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn aggregates_reflections_and_feedback_in_range() {
        let f = fixture(StaticTextGenerator::sample());
        let reflection = |date: &str, done: u32, planned: u32, rating: u32, challenges: &[&str]| {
            json!({
                "user_id": "demo-user",
                "date": date,
                "completed_blocks": done,
                "total_blocks": planned,
                "overall_productivity": rating,
                "wins": ["Shipped"],
                "challenges": challenges,
            })
        };
        f.store
            .put("reflections", "demo-user:2024-05-27", reflection("2024-05-27", 2, 3, 4, &["Slack"]))
            .await
            .expect("put");
        f.store
            .put("reflections", "demo-user:2024-05-28", reflection("2024-05-28", 3, 3, 3, &["Slack", "Email"]))
            .await
            .expect("put");
        f.store
            .put("reflections", "demo-user:2024-06-09", reflection("2024-06-09", 9, 9, 5, &[]))
            .await
            .expect("put");
        f.store
            .put(
                "block_feedback",
                "demo-user:2024-05-27:block-1",
                json!({"user_id": "demo-user", "date": "2024-05-27", "duration_minutes": 90}),
            )
            .await
            .expect("put");

        let stats = run(
            &f,
            AGGREGATE_WEEK,
            json!({"user_id": "demo-user", "week_start": "2024-05-27", "week_end": "2024-06-02"}),
        )
        .await
        .expect("stats");

        assert_eq!(stats["total_blocks_completed"], 5);
        assert_eq!(stats["total_blocks_planned"], 6);
        assert_eq!(stats["completion_rate"], 83.3);
        assert_eq!(stats["average_productivity"], 3.5);
        assert_eq!(stats["total_focus_hours"], 1.5);
        assert_eq!(stats["top_achievements"], json!(["Shipped"]));
        assert_eq!(stats["recurring_challenges"], json!(["Slack"]));
    }

    #[tokio::test]
    async fn proposes_three_goals() {
        let f = fixture(StaticTextGenerator::sample());
        let goals = run(
            &f,
            PROPOSE_MICRO_GOALS,
            json!({"user_id": "demo-user", "stats": aggregate(&[], &[])}),
        )
        .await
        .expect("goals");

        let goals: Vec<MicroGoal> = serde_json::from_value(goals).expect("decode");
        let ids: Vec<_> = goals.iter().map(|g| g.goal_id.as_str()).collect();
        assert_eq!(ids, vec!["goal-1", "goal-2", "goal-3"]);
        assert_eq!(goals[1].title, "Protect Your Peak Hours");
    }

    #[tokio::test]
    async fn put_document_writes_to_store() {
        let f = fixture(StaticTextGenerator::sample());
        let output = run(
            &f,
            PUT_DOCUMENT,
            json!({"collection": "plans", "key": "demo-user:2024-06-03", "document": {"a": 1}}),
        )
        .await
        .expect("put");

        assert_eq!(output, json!({"collection": "plans", "key": "demo-user:2024-06-03"}));
        assert_eq!(
            f.store.get("plans", "demo-user:2024-06-03").await.expect("get"),
            Some(json!({"a": 1}))
        );
    }

    #[tokio::test]
    async fn notification_carries_idempotency_key() {
        let f = fixture(StaticTextGenerator::sample());
        let ctx = ctx();
        let activity = f.registry.get(SEND_NOTIFICATION).expect("registered");
        activity
            .execute(&ctx, json!({"user_id": "demo-user", "message": "hello"}))
            .await
            .expect("send");

        let sent = f.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].idempotency_key, ctx.idempotency_key);
    }
}
