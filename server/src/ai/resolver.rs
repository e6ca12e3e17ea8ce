//! Turns an unreliable suggestion service into one legal move.
//!
//! Each attempt waits out the request spacing, asks the service with a
//! bounded candidate list, races the answer against a timeout, cleans it to a
//! single token and checks it against the full legal list. Retryable
//! failures back off exponentially with jitter up to `max_retries` retries.
//! The resolver never touches the game; it only hands back a token.

use super::fallback::choose_fallback_move;
use super::service::{AiError, MoveSuggester};
use crate::game::AiRequestContext;
use crate::rules::LegalMove;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub request_timeout: Duration,
    /// Minimum spacing between two outbound requests.
    pub min_request_interval: Duration,
    /// How many legal moves are listed in the prompt.
    pub candidate_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
            min_request_interval: Duration::from_secs(1),
            candidate_limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMove {
    pub token: String,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no usable suggestion after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: AiError },

    #[error("suggestion service failed on attempt {attempts}: {error}")]
    Fatal { attempts: u32, error: AiError },

    #[error("no legal moves to choose from")]
    NoLegalMoves,
}

impl ResolveError {
    pub fn attempts(&self) -> u32 {
        match self {
            ResolveError::Exhausted { attempts, .. } | ResolveError::Fatal { attempts, .. } => {
                *attempts
            }
            ResolveError::NoLegalMoves => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveSource {
    Suggested { attempts: u32 },
    Fallback { reason: String },
}

/// Final answer for an AI turn, always a legal move token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiDecision {
    pub token: String,
    pub source: MoveSource,
}

pub struct MoveResolver {
    service: Arc<dyn MoveSuggester>,
    config: ResolverConfig,
    last_request: Option<Instant>,
}

impl MoveResolver {
    pub fn new(service: Arc<dyn MoveSuggester>, config: ResolverConfig) -> Self {
        Self {
            service,
            config,
            last_request: None,
        }
    }

    pub async fn resolve(
        &mut self,
        context: &AiRequestContext,
    ) -> Result<ResolvedMove, ResolveError> {
        if context.legal_moves.is_empty() {
            return Err(ResolveError::NoLegalMoves);
        }

        let prompt = build_prompt(context, self.config.candidate_limit);
        let mut attempt: u32 = 0;

        loop {
            self.wait_for_request_slot().await;

            let started = Instant::now();
            let outcome = self.attempt(&prompt, &context.legal_moves).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(token) => {
                    info!(
                        "{} suggested {} on attempt {} ({:?})",
                        self.service.name(),
                        token,
                        attempt + 1,
                        elapsed
                    );
                    return Ok(ResolvedMove {
                        token,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    warn!(
                        "{} attempt {} failed after {:?}: {}",
                        self.service.name(),
                        attempt + 1,
                        elapsed,
                        error
                    );

                    if !error.is_retryable() {
                        return Err(ResolveError::Fatal {
                            attempts: attempt + 1,
                            error,
                        });
                    }
                    if attempt >= self.config.max_retries {
                        return Err(ResolveError::Exhausted {
                            attempts: attempt + 1,
                            last: error,
                        });
                    }

                    let delay = self.backoff_delay(attempt);
                    debug!("Retrying in {:?}", delay);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Resolves through the service and falls back to the scripted choice on failure.
    ///
    /// Returns `None` only when the position has no legal moves.
    pub async fn decide(&mut self, context: &AiRequestContext) -> Option<AiDecision> {
        match self.resolve(context).await {
            Ok(resolved) => Some(AiDecision {
                token: resolved.token,
                source: MoveSource::Suggested {
                    attempts: resolved.attempts,
                },
            }),
            Err(ResolveError::NoLegalMoves) => None,
            Err(error) => {
                let mut rng = rand::thread_rng();
                let fallback = choose_fallback_move(&context.legal_moves, &mut rng)?;
                warn!(
                    "Falling back to {} after {} attempts ({})",
                    fallback.san_plus,
                    error.attempts(),
                    error
                );
                Some(AiDecision {
                    token: fallback.san_plus.clone(),
                    source: MoveSource::Fallback {
                        reason: error.to_string(),
                    },
                })
            }
        }
    }

    async fn attempt(&mut self, prompt: &str, legal: &[LegalMove]) -> Result<String, AiError> {
        self.last_request = Some(Instant::now());

        let limit = self.config.request_timeout;
        let reply = match timeout(limit, self.service.suggest(prompt)).await {
            Ok(reply) => reply?,
            Err(_) => return Err(AiError::Timeout(limit)),
        };

        validate_suggestion(&reply, legal)
    }

    async fn wait_for_request_slot(&self) {
        if let Some(last) = self.last_request {
            let ready_at = last + self.config.min_request_interval;
            if Instant::now() < ready_at {
                debug!("Rate limit: waiting {:?}", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }

    /// `base_delay * 2^attempt` plus up to `max_jitter` of random slack.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .base_delay
            .saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.config.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        exponential + jitter
    }
}

pub fn build_prompt(context: &AiRequestContext, candidate_limit: usize) -> String {
    let history = if context.move_history.is_empty() {
        "none".to_string()
    } else {
        context.move_history.join(" ")
    };
    let candidates: Vec<&str> = context
        .legal_moves
        .iter()
        .take(candidate_limit)
        .map(|m| m.san_plus.as_str())
        .collect();

    format!(
        "You are playing chess as {side}.\n\
         Position (FEN): {fen}\n\
         Moves so far: {history}\n\
         Legal moves: {candidates}\n\
         Reply with exactly one move from the list above in standard algebraic notation and nothing else.",
        side = context.side_to_move,
        fen = context.position,
        history = history,
        candidates = candidates.join(", "),
    )
}

/// First word of the first line, restricted to characters used in move notation.
pub fn clean_suggestion(raw: &str) -> String {
    raw.trim()
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '=' | '-' | 'O'))
        .collect()
}

/// Accepts the cleaned token only if it names a move in the full legal list.
pub fn validate_suggestion(raw: &str, legal: &[LegalMove]) -> Result<String, AiError> {
    let token = clean_suggestion(raw);
    if token.is_empty() || !legal.iter().any(|m| m.matches(&token)) {
        return Err(AiError::InvalidMove(token));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameState;
    use async_trait::async_trait;
    use shared::MoveInput;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back canned answers; an exhausted script keeps failing with overload.
    struct ScriptedService {
        replies: Mutex<VecDeque<Result<String, AiError>>>,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
        call_times: Mutex<Vec<Instant>>,
    }

    impl ScriptedService {
        fn new(replies: Vec<Result<String, AiError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
                call_times: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MoveSuggester for ScriptedService {
        async fn suggest(&self, prompt: &str) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.call_times.lock().unwrap().push(Instant::now());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AiError::Overloaded("scripted".to_string())))
        }
    }

    struct SlowService {
        delay: Duration,
        reply: String,
    }

    #[async_trait]
    impl MoveSuggester for SlowService {
        async fn suggest(&self, _prompt: &str) -> Result<String, AiError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    fn fast_config() -> ResolverConfig {
        ResolverConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
            request_timeout: Duration::from_secs(2),
            min_request_interval: Duration::from_millis(500),
            candidate_limit: 5,
        }
    }

    fn black_to_move() -> AiRequestContext {
        let mut state = GameState::new();
        assert!(state.apply_move(&MoveInput::coordinates("e2", "e4")));
        state.ai_context()
    }

    #[test]
    fn test_clean_suggestion() {
        assert_eq!(clean_suggestion("e5"), "e5");
        assert_eq!(clean_suggestion("  Nf6\nbecause it develops"), "Nf6");
        assert_eq!(clean_suggestion("**e5** is best"), "e5");
        assert_eq!(clean_suggestion("O-O."), "O-O");
        assert_eq!(clean_suggestion("exd8=Q#!"), "exd8=Q#");
        assert_eq!(clean_suggestion(""), "");
        assert_eq!(clean_suggestion("   \n  "), "");
    }

    #[test]
    fn test_validate_against_full_list_not_candidates() {
        let context = black_to_move();
        // Outside the first five candidates but still legal.
        let last = context.legal_moves.last().unwrap().san.clone();
        assert_eq!(validate_suggestion(&last, &context.legal_moves), Ok(last));

        assert_eq!(
            validate_suggestion("e7e5", &context.legal_moves),
            Ok("e7e5".to_string())
        );
        assert_eq!(
            validate_suggestion("Ke7", &context.legal_moves),
            Err(AiError::InvalidMove("Ke7".to_string()))
        );
        assert_eq!(
            validate_suggestion("?!", &context.legal_moves),
            Err(AiError::InvalidMove(String::new()))
        );
    }

    #[test]
    fn test_prompt_truncates_candidates() {
        let context = black_to_move();
        let prompt = build_prompt(&context, 3);

        assert!(prompt.contains(&context.position));
        assert!(prompt.contains("Moves so far: e4"));
        assert!(prompt.contains("as black"));

        let listed: Vec<&str> = context.legal_moves.iter().map(|m| m.san_plus.as_str()).collect();
        let line = prompt
            .lines()
            .find(|l| l.starts_with("Legal moves: "))
            .unwrap();
        assert_eq!(line, format!("Legal moves: {}", listed[..3].join(", ")));
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let service = ScriptedService::new(vec![]);
        let resolver = MoveResolver::new(service, fast_config());

        assert_eq!(resolver.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(resolver.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(resolver.backoff_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let service = ScriptedService::new(vec![]);
        let config = ResolverConfig {
            max_jitter: Duration::from_millis(50),
            ..fast_config()
        };
        let resolver = MoveResolver::new(service, config);

        for _ in 0..100 {
            let delay = resolver.backoff_delay(2);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(450));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success() {
        let service = ScriptedService::new(vec![Ok("e7e5".to_string())]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());

        let resolved = resolver.resolve(&black_to_move()).await.unwrap();
        assert_eq!(resolved.token, "e7e5");
        assert_eq!(resolved.attempts, 1);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_max_retries_failures() {
        let service = ScriptedService::new(vec![
            Err(AiError::Overloaded("busy".to_string())),
            Err(AiError::Unavailable("down".to_string())),
            Ok("Qz9".to_string()),
            Ok("Nc6".to_string()),
        ]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());

        let resolved = resolver.resolve(&black_to_move()).await.unwrap();
        assert_eq!(resolved.token, "Nc6");
        assert_eq!(resolved.attempts, 4);
        assert_eq!(service.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_retries_plus_one() {
        let service = ScriptedService::new(vec![]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());

        match resolver.resolve(&black_to_move()).await {
            Err(ResolveError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(last, AiError::Overloaded(_)));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(service.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let service = ScriptedService::new(vec![Err(AiError::Rejected("401".to_string()))]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());

        let error = resolver.resolve(&black_to_move()).await.unwrap_err();
        assert!(matches!(error, ResolveError::Fatal { attempts: 1, .. }));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let service = Arc::new(SlowService {
            delay: Duration::from_secs(30),
            reply: "e5".to_string(),
        });
        let config = ResolverConfig {
            max_retries: 1,
            ..fast_config()
        };
        let mut resolver = MoveResolver::new(service, config);

        match resolver.resolve(&black_to_move()).await {
            Err(ResolveError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, AiError::Timeout(Duration::from_secs(2)));
            }
            other => panic!("expected timeout exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_respect_spacing_and_backoff() {
        let service = ScriptedService::new(vec![
            Err(AiError::Overloaded("busy".to_string())),
            Err(AiError::Overloaded("busy".to_string())),
            Ok("e5".to_string()),
        ]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());
        resolver.resolve(&black_to_move()).await.unwrap();

        // A fresh turn right away still waits out the spacing floor.
        service
            .replies
            .lock()
            .unwrap()
            .push_back(Ok("d5".to_string()));
        resolver.resolve(&black_to_move()).await.unwrap();

        let times = service.call_times.lock().unwrap().clone();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_uses_fallback_when_exhausted() {
        let service = ScriptedService::new(vec![]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());
        let context = black_to_move();

        let decision = resolver.decide(&context).await.unwrap();
        assert!(matches!(decision.source, MoveSource::Fallback { .. }));
        assert!(context
            .legal_moves
            .iter()
            .any(|m| m.matches(&decision.token)));
        assert_eq!(service.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decide_reports_suggested_source() {
        let service = ScriptedService::new(vec![Ok("e5".to_string())]);
        let mut resolver = MoveResolver::new(service, fast_config());

        let decision = resolver.decide(&black_to_move()).await.unwrap();
        assert_eq!(decision.token, "e5");
        assert_eq!(decision.source, MoveSource::Suggested { attempts: 1 });
    }

    #[tokio::test]
    async fn test_no_legal_moves() {
        let service = ScriptedService::new(vec![Ok("e5".to_string())]);
        let mut resolver = MoveResolver::new(service.clone(), fast_config());
        let context = AiRequestContext {
            position: "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1".to_string(),
            side_to_move: shared::Color::Black,
            move_history: vec![],
            legal_moves: vec![],
        };

        assert!(matches!(
            resolver.resolve(&context).await,
            Err(ResolveError::NoLegalMoves)
        ));
        assert!(resolver.decide(&context).await.is_none());
        assert_eq!(service.calls(), 0);
    }
}
