//! The goal-driven epoch loop.
//!
//! A session builds a research goal, then runs epochs of
//! plan → retrieve → extract → evaluate until the goal is achieved or the
//! epoch budget runs out. Every collaborator degrades to a fallback value
//! on failure, so [`ResearchController::run`] always returns a result.

use crate::completion::StructuredCompletion;
use crate::config::{ResearchConfig, clamp_epochs};
use crate::research::evaluator::{GoalEvaluation, GoalEvaluator};
use crate::research::extractor::LearningExtractor;
use crate::research::goal::GoalBuilder;
use crate::research::observer::{NoOpObserver, ResearchObserver};
use crate::research::planner::{PlannedQuery, QueryPlanner};
use crate::research::state::{
    EpochOutcome, QueryOutcome, ResearchResult, ResearchState, dedup_preserving_order,
};
use crate::retrieval::RetrievalService;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Lifecycle of a single [`ResearchController::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerPhase {
    BuildingGoal,
    EpochActive { epoch: usize },
    Terminated,
}

impl ControllerPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: &ControllerPhase) -> bool {
        match (self, next) {
            (ControllerPhase::BuildingGoal, ControllerPhase::EpochActive { epoch }) => *epoch == 1,
            (ControllerPhase::EpochActive { epoch }, ControllerPhase::EpochActive { epoch: n }) => {
                *n == epoch + 1
            }
            (ControllerPhase::EpochActive { .. }, ControllerPhase::Terminated) => true,
            _ => false,
        }
    }

    fn transition(&mut self, next: ControllerPhase) {
        if !self.can_transition_to(&next) {
            warn!(from = ?self, to = ?next, "Unexpected research phase transition");
        }
        debug!(from = ?self, to = ?next, "Research phase change");
        *self = next;
    }
}

/// Inputs of one research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchParams {
    pub initial_query: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    /// Target planned queries per epoch; 0 is treated as 1.
    pub breadth: usize,
    /// Epoch cap, clamped into `[1, MAX_EPOCHS]`.
    pub max_epochs: usize,
    /// Simultaneous retrieval pipelines; 0 is treated as 1.
    pub concurrency: usize,
}

impl ResearchParams {
    /// Params for `initial_query` with breadth, epochs and concurrency from `config`.
    pub fn from_config(initial_query: impl Into<String>, config: &ResearchConfig) -> Self {
        Self {
            initial_query: initial_query.into(),
            questions: Vec::new(),
            answers: Vec::new(),
            breadth: config.breadth,
            max_epochs: config.max_epochs(),
            concurrency: config.concurrency,
        }
    }

    pub fn with_follow_ups(mut self, questions: Vec<String>, answers: Vec<String>) -> Self {
        self.questions = questions;
        self.answers = answers;
        self
    }
}

/// Runs research sessions against one completion client and one retrieval backend.
pub struct ResearchController {
    goal_builder: GoalBuilder,
    planner: QueryPlanner,
    extractor: LearningExtractor,
    evaluator: GoalEvaluator,
    retrieval: Arc<dyn RetrievalService>,
    /// Serializes extraction calls across all pipelines.
    extraction_gate: Semaphore,
    config: ResearchConfig,
    observer: Arc<dyn ResearchObserver>,
}

impl ResearchController {
    pub fn new(
        completion: Arc<StructuredCompletion>,
        retrieval: Arc<dyn RetrievalService>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            goal_builder: GoalBuilder::new(completion.clone()),
            planner: QueryPlanner::new(completion.clone()),
            extractor: LearningExtractor::new(completion.clone(), config.content_token_limit),
            evaluator: GoalEvaluator::new(completion),
            retrieval,
            extraction_gate: Semaphore::new(1),
            config,
            observer: Arc::new(NoOpObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResearchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run a full research session.
    pub async fn run(&self, params: ResearchParams) -> ResearchResult {
        let breadth = params.breadth.max(1);
        let max_epochs = clamp_epochs(params.max_epochs);
        let retrieval_gate = Semaphore::new(params.concurrency.max(1));
        info!(
            query = %params.initial_query,
            breadth,
            max_epochs,
            concurrency = params.concurrency.max(1),
            "Starting research session"
        );

        let mut phase = ControllerPhase::BuildingGoal;
        let goal = self
            .goal_builder
            .build(&params.initial_query, &params.questions, &params.answers)
            .await;
        self.observer.on_goal(&goal);

        let mut state = ResearchState::new();
        let mut last_evaluation: Option<GoalEvaluation> = None;
        let mut goal_achieved = false;

        while state.epoch < max_epochs && !goal_achieved {
            state.epoch += 1;
            let epoch = state.epoch;
            phase.transition(ControllerPhase::EpochActive { epoch });

            let context = if epoch == 1 {
                goal.primary_objective.clone()
            } else {
                // Re-evaluate what the previous epochs gathered to steer planning.
                self.evaluator
                    .evaluate(&goal, &state.all_learnings, epoch - 1)
                    .await
                    .planning_context(&goal)
            };
            info!(epoch, max_epochs, "Starting research epoch");
            self.observer.on_epoch_start(epoch, max_epochs, &context);

            let planned = self
                .planner
                .plan(
                    &context,
                    breadth,
                    state.recent_learnings(self.config.recent_learnings_window),
                )
                .await;
            self.observer.on_queries_planned(epoch, &planned);

            // join_all yields outcomes in planner rank order.
            let outcomes = join_all(
                planned
                    .into_iter()
                    .map(|query| self.run_query(epoch, query, &retrieval_gate)),
            )
            .await;

            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            let outcome = EpochOutcome::gather(&outcomes);
            info!(
                epoch,
                queries = outcomes.len(),
                failed,
                learnings = outcome.learnings.len(),
                urls = outcome.urls.len(),
                "Epoch retrieval finished"
            );
            state.absorb(outcome.clone());

            let evaluation = self
                .evaluator
                .evaluate(&goal, &state.all_learnings, epoch)
                .await;
            goal_achieved = evaluation.goal_achieved;
            self.observer.on_epoch_complete(epoch, &outcome, &evaluation);
            last_evaluation = Some(evaluation);
        }

        phase.transition(ControllerPhase::Terminated);
        let epochs_completed = state.epoch;
        let (learnings, visited_urls) = state.finalize();
        let goal_alignment_score = last_evaluation
            .as_ref()
            .map(|e| e.alignment_score)
            .unwrap_or(0.0);

        info!(
            epochs = epochs_completed,
            learnings = learnings.len(),
            urls = visited_urls.len(),
            score = goal_alignment_score,
            achieved = goal_achieved,
            "Research session finished"
        );

        ResearchResult {
            goal,
            learnings,
            visited_urls,
            goal_alignment_score,
            epochs_completed,
            goal_achieved,
            final_evaluation: last_evaluation,
        }
    }

    /// Retrieve and extract for one planned query. Never fails.
    async fn run_query(
        &self,
        epoch: usize,
        query: PlannedQuery,
        retrieval_gate: &Semaphore,
    ) -> QueryOutcome {
        let outcome = match retrieval_gate.acquire().await {
            Ok(_permit) => self.retrieve_and_extract(query).await,
            Err(e) => QueryOutcome::failed(query, e.to_string()),
        };
        self.observer.on_query_complete(epoch, &outcome);
        outcome
    }

    async fn retrieve_and_extract(&self, query: PlannedQuery) -> QueryOutcome {
        let documents = match self
            .retrieval
            .search(&query.query, self.config.results_per_query)
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                warn!(query = %query.query, error = %e, "Retrieval failed for query");
                return QueryOutcome::failed(query, e.to_string());
            }
        };

        let urls = dedup_preserving_order(
            &documents
                .iter()
                .map(|d| d.url.clone())
                .filter(|u| !u.is_empty())
                .collect::<Vec<_>>(),
        );
        let documents_with_content = documents.iter().filter(|d| d.has_content()).count();
        debug!(
            query = %query.query,
            urls = urls.len(),
            with_content = documents_with_content,
            "Retrieved documents"
        );

        let extraction = match self.extraction_gate.acquire().await {
            Ok(_permit) => {
                let extraction = self
                    .extractor
                    .extract(
                        &query.query,
                        &documents,
                        self.config.learnings_per_query,
                        self.config.follow_ups_per_query,
                    )
                    .await;
                if documents_with_content > 0 && self.config.extraction_pause_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.config.extraction_pause_ms))
                        .await;
                }
                extraction
            }
            Err(e) => {
                warn!(query = %query.query, error = %e, "Extraction gate closed");
                Default::default()
            }
        };

        QueryOutcome {
            query,
            urls,
            documents_with_content,
            learnings: extraction.learnings,
            follow_ups: extraction.follow_ups,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{LlmProvider, MockLlmProvider};
    use crate::config::RetryConfig;
    use crate::error::{LlmError, RetrievalError};
    use crate::prompts::{TASK_EVALUATION, TASK_GOAL, TASK_LEARNINGS, TASK_QUERIES};
    use crate::retrieval::RetrievedDocument;
    use crate::types::{CompletionRequest, CompletionResponse, Message};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct StaticRetrieval {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StaticRetrieval {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RetrievalService for StaticRetrieval {
        async fn search(
            &self,
            query: &str,
            _limit: usize,
        ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![RetrievedDocument::new(
                format!("https://example.com/{}", query.replace(' ', "-")),
                query,
                format!("Page about {query}"),
            )])
        }
    }

    /// Delays extraction calls and tracks how many overlap.
    struct SlowExtraction {
        inner: MockLlmProvider,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for SlowExtraction {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let extracting = request
                .messages
                .iter()
                .any(|m| m.content.contains(TASK_LEARNINGS));
            if !extracting {
                return self.inner.complete(request).await;
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.complete(request).await
        }

        fn estimate_tokens(&self, messages: &[Message]) -> usize {
            self.inner.estimate_tokens(messages)
        }

        fn context_window(&self) -> usize {
            self.inner.context_window()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    struct RecordingObserver {
        phases: Mutex<Vec<String>>,
    }

    impl ResearchObserver for RecordingObserver {
        fn on_epoch_start(&self, epoch: usize, _max: usize, context: &str) {
            self.phases
                .lock()
                .unwrap()
                .push(format!("epoch {epoch}: {context}"));
        }
    }

    fn config() -> ResearchConfig {
        ResearchConfig {
            extraction_pause_ms: 0,
            ..ResearchConfig::default()
        }
    }

    fn provider() -> Arc<MockLlmProvider> {
        let provider = Arc::new(MockLlmProvider::new());
        provider.route(
            TASK_GOAL,
            [r#"{"primary_objective": "Map EV battery recycling", "success_criteria": ["Processes"], "specific_questions": ["Who recycles?"]}"#],
        );
        provider.route(
            TASK_QUERIES,
            [r#"{"queries": [{"query": "hydrometallurgy", "research_goal": "a"}, {"query": "pyrometallurgy", "research_goal": "b"}, {"query": "direct recycling", "research_goal": "c"}]}"#],
        );
        provider.route(
            TASK_LEARNINGS,
            [r#"{"learnings": ["Recovery rates exceed 95%"], "followUpQuestions": []}"#],
        );
        provider
    }

    fn controller(provider: Arc<MockLlmProvider>, retrieval: Arc<StaticRetrieval>) -> ResearchController {
        let completion = Arc::new(StructuredCompletion::new(provider, RetryConfig::default()));
        ResearchController::new(completion, retrieval, config())
    }

    #[test]
    fn test_phase_transitions() {
        let building = ControllerPhase::BuildingGoal;
        assert!(building.can_transition_to(&ControllerPhase::EpochActive { epoch: 1 }));
        assert!(!building.can_transition_to(&ControllerPhase::Terminated));
        let active = ControllerPhase::EpochActive { epoch: 2 };
        assert!(active.can_transition_to(&ControllerPhase::EpochActive { epoch: 3 }));
        assert!(!active.can_transition_to(&ControllerPhase::EpochActive { epoch: 2 }));
        assert!(active.can_transition_to(&ControllerPhase::Terminated));
        assert!(!ControllerPhase::Terminated.can_transition_to(&building));
    }

    #[test]
    fn test_params_from_config_clamps_depth() {
        let config = ResearchConfig {
            depth: 9,
            ..ResearchConfig::default()
        };
        let params = ResearchParams::from_config("q", &config);
        assert_eq!(params.max_epochs, 5);
        assert_eq!(params.breadth, config.breadth);
    }

    #[tokio::test]
    async fn test_run_exhausts_epoch_budget() {
        let provider = provider();
        provider.route(TASK_EVALUATION, [r#"{"alignment_score": 0.4, "criteria_met": [], "questions_answered": [], "missing_aspects": ["costs"], "next_research_directions": ["EU policy"], "goal_achieved": false}"#]);
        let retrieval = Arc::new(StaticRetrieval::new());
        let observer = Arc::new(RecordingObserver {
            phases: Mutex::new(Vec::new()),
        });
        let controller = controller(provider, retrieval.clone()).with_observer(observer.clone());

        let result = controller
            .run(ResearchParams {
                initial_query: "EV battery recycling".to_string(),
                questions: Vec::new(),
                answers: Vec::new(),
                breadth: 3,
                max_epochs: 2,
                concurrency: 2,
            })
            .await;

        assert_eq!(result.epochs_completed, 2);
        assert!(!result.goal_achieved);
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 6);
        assert_eq!(result.learnings, vec!["Recovery rates exceed 95%"]);
        assert_eq!(result.visited_urls.len(), 3);

        let phases = observer.phases.lock().unwrap();
        assert_eq!(phases[0], "epoch 1: Map EV battery recycling");
        assert!(phases[1].contains("Missing Aspects: costs"));
        assert!(phases[1].contains("Next Research Directions: EU policy"));
    }

    #[tokio::test]
    async fn test_run_respects_concurrency_limit() {
        let provider = provider();
        provider.route(TASK_EVALUATION, [r#"{"alignment_score": 0.1}"#]);
        let retrieval = Arc::new(StaticRetrieval::new());
        controller(provider, retrieval.clone())
            .run(ResearchParams {
                initial_query: "q".to_string(),
                questions: Vec::new(),
                answers: Vec::new(),
                breadth: 3,
                max_epochs: 1,
                concurrency: 1,
            })
            .await;
        assert_eq!(retrieval.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extraction_runs_one_at_a_time_with_pause() {
        let call = Duration::from_millis(40);
        let pause_ms = 50;
        let inner = MockLlmProvider::new();
        inner.route(
            TASK_GOAL,
            [r#"{"primary_objective": "Map EV battery recycling", "success_criteria": [], "specific_questions": []}"#],
        );
        inner.route(
            TASK_QUERIES,
            [r#"{"queries": [{"query": "hydrometallurgy", "research_goal": "a"}, {"query": "pyrometallurgy", "research_goal": "b"}, {"query": "direct recycling", "research_goal": "c"}, {"query": "black mass", "research_goal": "d"}]}"#],
        );
        inner.route(
            TASK_LEARNINGS,
            [r#"{"learnings": ["Recovery rates exceed 95%"], "followUpQuestions": []}"#],
        );
        inner.route(TASK_EVALUATION, [r#"{"alignment_score": 0.1}"#]);
        let provider = Arc::new(SlowExtraction {
            inner,
            delay: call,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let retrieval = Arc::new(StaticRetrieval::new());
        let completion = Arc::new(StructuredCompletion::new(
            provider.clone(),
            RetryConfig::default(),
        ));
        let config = ResearchConfig {
            extraction_pause_ms: pause_ms,
            ..ResearchConfig::default()
        };

        let started = Instant::now();
        let result = ResearchController::new(completion, retrieval.clone(), config)
            .run(ResearchParams {
                initial_query: "EV battery recycling".to_string(),
                questions: Vec::new(),
                answers: Vec::new(),
                breadth: 4,
                max_epochs: 1,
                concurrency: 4,
            })
            .await;
        let elapsed = started.elapsed();

        assert_eq!(result.visited_urls.len(), 4);
        assert_eq!(provider.peak.load(Ordering::SeqCst), 1);
        assert!(retrieval.peak.load(Ordering::SeqCst) > 1);
        assert!(elapsed >= 4 * (call + Duration::from_millis(pause_ms)));
    }

    #[tokio::test]
    async fn test_run_clamps_zero_inputs() {
        let provider = Arc::new(MockLlmProvider::failing());
        let retrieval = Arc::new(StaticRetrieval::new());
        let completion = Arc::new(StructuredCompletion::new(
            provider,
            RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
        ));
        let result = ResearchController::new(completion, retrieval.clone(), config())
            .run(ResearchParams {
                initial_query: "solid-state batteries".to_string(),
                questions: Vec::new(),
                answers: Vec::new(),
                breadth: 0,
                max_epochs: 0,
                concurrency: 0,
            })
            .await;
        assert_eq!(result.epochs_completed, 1);
        assert_eq!(result.goal.primary_objective, "solid-state batteries");
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.goal_alignment_score, 0.5);
    }
}
