use crate::config::{Credentials, ModelConfig};
use crate::session::Turn;
use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const PRIMARY_MODEL: &str = "gemini-3.0-flash-preview";
pub const BACKUP_MODEL: &str = "gemini-2.5-flash";
pub const SPEED_MODEL: &str = "llama-3.3-70b-versatile";

/// Model id reported when every provider has been exhausted.
pub const NO_PROVIDER: &str = "NONE";
pub const EXHAUSTED_MESSAGE: &str =
    "All providers are rate limited or unreachable. Try again later.";

const GEMINI_TIMEOUT: Duration = Duration::from_secs(30);
const GROQ_TIMEOUT: Duration = Duration::from_secs(20);

/// Which providers a turn may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Gemini rotation first, then the Groq speed model.
    Auto,
    /// Gemini rotation only.
    Gemini,
    /// Groq only.
    Speed,
}

impl RouteMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(RouteMode::Auto),
            "gemini" => Some(RouteMode::Gemini),
            "speed" | "groq" => Some(RouteMode::Speed),
            _ => None,
        }
    }
}

/// Why a single provider attempt produced no text. Failures are data here,
/// not errors: the router reacts to them by moving on.
#[derive(Debug, Clone)]
pub enum CallFailure {
    RateLimited,
    Other(String),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::RateLimited => write!(f, "rate limited (429)"),
            CallFailure::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// One hosted completion endpoint. Implemented over HTTP for the real
/// providers and by canned fakes in tests.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(
        &self,
        key: &str,
        model: &str,
        system_prompt: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<String, CallFailure>;
}

pub struct GeminiBackend {
    http: Client,
}

impl GeminiBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    system_instruction: GeminiInstruction<'a>,
}

#[derive(Serialize)]
struct GeminiInstruction<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[async_trait::async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(
        &self,
        key: &str,
        model: &str,
        system_prompt: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<String, CallFailure> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, key
        );

        let mut contents: Vec<GeminiContent> = history
            .iter()
            .map(|t| GeminiContent { role: &t.role, parts: vec![GeminiPart { text: &t.text }] })
            .collect();
        contents.push(GeminiContent { role: "user", parts: vec![GeminiPart { text: prompt }] });

        let body = GeminiRequest {
            contents,
            system_instruction: GeminiInstruction { parts: vec![GeminiPart { text: system_prompt }] },
        };

        #[derive(Deserialize)]
        struct GeminiResponse {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: CandidateContent,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            parts: Vec<CandidatePart>,
        }
        #[derive(Deserialize)]
        struct CandidatePart {
            text: String,
        }

        let res = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallFailure::Other(e.to_string()))?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(CallFailure::RateLimited);
        }
        if res.status() != StatusCode::OK {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(CallFailure::Other(format!("gemini error {}: {}", status, text)));
        }
        let parsed: GeminiResponse = res
            .json()
            .await
            .map_err(|e| CallFailure::Other(format!("gemini response: {}", e)))?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| CallFailure::Other("gemini returned no candidates".into()))
    }
}

pub struct GroqBackend {
    http: Client,
}

impl GroqBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[derive(Serialize)]
struct ChatCompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[async_trait::async_trait]
impl ModelBackend for GroqBackend {
    async fn generate(
        &self,
        key: &str,
        model: &str,
        system_prompt: &str,
        history: &[Turn],
        prompt: &str,
    ) -> Result<String, CallFailure> {
        let url = "https://api.groq.com/openai/v1/chat/completions";

        // Groq speaks the OpenAI dialect, so "model" turns become "assistant".
        let mut messages = vec![ChatCompletionMessage { role: "system", content: system_prompt }];
        for t in history {
            let role = if t.role == "model" { "assistant" } else { "user" };
            messages.push(ChatCompletionMessage { role, content: &t.text });
        }
        messages.push(ChatCompletionMessage { role: "user", content: prompt });

        #[derive(Serialize)]
        struct ChatCompletionRequest<'a> {
            model: &'a str,
            messages: Vec<ChatCompletionMessage<'a>>,
        }

        #[derive(Deserialize)]
        struct ChatCompletionResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let body = ChatCompletionRequest { model, messages };
        let res = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallFailure::Other(e.to_string()))?;
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(CallFailure::RateLimited);
        }
        if res.status() != StatusCode::OK {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(CallFailure::Other(format!("groq error {}: {}", status, text)));
        }
        let parsed: ChatCompletionResponse = res
            .json()
            .await
            .map_err(|e| CallFailure::Other(format!("groq response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CallFailure::Other("groq returned no choices".into()))
    }
}

/// Canned backend used when `DS_MOCK_REPLY` is set: every call succeeds with
/// the same text, letting the whole turn pipeline run offline.
pub struct StaticBackend {
    reply: String,
}

#[async_trait::async_trait]
impl ModelBackend for StaticBackend {
    async fn generate(
        &self,
        _key: &str,
        _model: &str,
        _system_prompt: &str,
        _history: &[Turn],
        _prompt: &str,
    ) -> Result<String, CallFailure> {
        Ok(self.reply.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutedReply {
    pub text: String,
    pub model_id: String,
}

/// Tries providers in priority order until one answers.
///
/// Gemini keys rotate in list order; the first key addresses the primary
/// model, every later key the backup model. Any failure, quota or transport,
/// advances the rotation. In auto mode an exhausted rotation falls through
/// to Groq. Total exhaustion is not an error: it yields the sentinel text
/// under the `NONE` model id.
pub struct Router {
    gemini: Box<dyn ModelBackend>,
    groq: Box<dyn ModelBackend>,
    creds: Credentials,
    models: ModelConfig,
    system_prompt: String,
}

impl Router {
    pub fn new(
        creds: Credentials,
        models: ModelConfig,
        system_prompt: String,
        timeout_override: Option<Duration>,
    ) -> Result<Self> {
        let gemini = GeminiBackend::new(timeout_override.unwrap_or(GEMINI_TIMEOUT))?;
        let groq = GroqBackend::new(timeout_override.unwrap_or(GROQ_TIMEOUT))?;
        Ok(Self::with_backends(creds, models, system_prompt, Box::new(gemini), Box::new(groq)))
    }

    pub fn with_backends(
        creds: Credentials,
        models: ModelConfig,
        system_prompt: String,
        gemini: Box<dyn ModelBackend>,
        groq: Box<dyn ModelBackend>,
    ) -> Self {
        Self { gemini, groq, creds, models, system_prompt }
    }

    /// Offline router for `DS_MOCK_REPLY`: one fake key, canned backends.
    pub fn mock(reply: String) -> Self {
        let creds = Credentials { gemini_keys: vec!["mock-key".into()], groq_key: None };
        let models = ModelConfig { primary: "mock".into(), backup: "mock".into(), speed: "mock".into() };
        Self::with_backends(
            creds,
            models,
            String::new(),
            Box::new(StaticBackend { reply: reply.clone() }),
            Box::new(StaticBackend { reply }),
        )
    }

    pub async fn complete(&self, prompt: &str, history: &[Turn], mode: RouteMode) -> RoutedReply {
        if matches!(mode, RouteMode::Auto | RouteMode::Gemini) {
            if let Some(reply) = self.rotate_gemini(prompt, history).await {
                return reply;
            }
        }
        if matches!(mode, RouteMode::Auto | RouteMode::Speed) {
            if let Some(reply) = self.try_groq(prompt, history).await {
                return reply;
            }
        }
        RoutedReply { text: EXHAUSTED_MESSAGE.to_string(), model_id: NO_PROVIDER.to_string() }
    }

    async fn rotate_gemini(&self, prompt: &str, history: &[Turn]) -> Option<RoutedReply> {
        if self.creds.gemini_keys.is_empty() {
            eprintln!("no Gemini keys configured (GEMINI_KEYS)");
            return None;
        }
        for (i, key) in self.creds.gemini_keys.iter().enumerate() {
            let model = if i == 0 { &self.models.primary } else { &self.models.backup };
            match self
                .gemini
                .generate(key, model, &self.system_prompt, history, prompt)
                .await
            {
                Ok(text) => return Some(RoutedReply { text, model_id: model.clone() }),
                Err(failure) => {
                    eprintln!("gemini key {} failed: {}; trying next", i + 1, failure);
                }
            }
        }
        None
    }

    async fn try_groq(&self, prompt: &str, history: &[Turn]) -> Option<RoutedReply> {
        let Some(key) = self.creds.groq_key.as_deref() else {
            eprintln!("no Groq key configured (GROQ_KEY)");
            return None;
        };
        match self
            .groq
            .generate(key, &self.models.speed, &self.system_prompt, history, prompt)
            .await
        {
            Ok(text) => Some(RoutedReply { text, model_id: self.models.speed.clone() }),
            Err(failure) => {
                eprintln!("groq failed: {}", failure);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted backend: pops one outcome per call and records what it saw.
    struct FakeBackend {
        script: Mutex<Vec<Result<String, CallFailure>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeBackend {
        fn new(script: Vec<Result<String, CallFailure>>) -> Self {
            Self { script: Mutex::new(script), calls: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ModelBackend for FakeBackend {
        async fn generate(
            &self,
            key: &str,
            model: &str,
            _system_prompt: &str,
            _history: &[Turn],
            _prompt: &str,
        ) -> Result<String, CallFailure> {
            self.calls.lock().unwrap().push((key.to_string(), model.to_string()));
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(CallFailure::Other("script exhausted".into()));
            }
            script.remove(0)
        }
    }

    fn creds(gemini: &[&str], groq: Option<&str>) -> Credentials {
        Credentials {
            gemini_keys: gemini.iter().map(|s| s.to_string()).collect(),
            groq_key: groq.map(|s| s.to_string()),
        }
    }

    fn router(
        creds: Credentials,
        gemini: FakeBackend,
        groq: FakeBackend,
    ) -> (Router, std::sync::Arc<FakeBackend>, std::sync::Arc<FakeBackend>) {
        let gemini = std::sync::Arc::new(gemini);
        let groq = std::sync::Arc::new(groq);
        let r = Router::with_backends(
            creds,
            ModelConfig::default(),
            "system".into(),
            Box::new(ArcBackend(gemini.clone())),
            Box::new(ArcBackend(groq.clone())),
        );
        (r, gemini, groq)
    }

    /// Lets a test keep inspecting a backend after handing it to the router.
    struct ArcBackend(std::sync::Arc<FakeBackend>);

    #[async_trait::async_trait]
    impl ModelBackend for ArcBackend {
        async fn generate(
            &self,
            key: &str,
            model: &str,
            system_prompt: &str,
            history: &[Turn],
            prompt: &str,
        ) -> Result<String, CallFailure> {
            self.0.generate(key, model, system_prompt, history, prompt).await
        }
    }

    #[tokio::test]
    async fn rotation_moves_to_backup_tier_and_stops_on_success() {
        let gemini = FakeBackend::new(vec![
            Err(CallFailure::RateLimited),
            Err(CallFailure::RateLimited),
            Ok("third time lucky".into()),
        ]);
        let groq = FakeBackend::new(vec![]);
        let (r, gemini, groq) = router(creds(&["k1", "k2", "k3"], Some("g")), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Auto).await;
        assert_eq!(reply.text, "third time lucky");
        assert_eq!(reply.model_id, BACKUP_MODEL);
        assert_eq!(
            gemini.calls(),
            vec![
                ("k1".to_string(), PRIMARY_MODEL.to_string()),
                ("k2".to_string(), BACKUP_MODEL.to_string()),
                ("k3".to_string(), BACKUP_MODEL.to_string()),
            ]
        );
        assert!(groq.calls().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_advance_the_rotation_like_quota() {
        let gemini = FakeBackend::new(vec![
            Err(CallFailure::Other("connection reset".into())),
            Ok("ok".into()),
        ]);
        let groq = FakeBackend::new(vec![]);
        let (r, gemini, _) = router(creds(&["k1", "k2"], None), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Auto).await;
        assert_eq!(reply.text, "ok");
        assert_eq!(gemini.calls().len(), 2);
    }

    #[tokio::test]
    async fn auto_mode_falls_through_to_groq() {
        let gemini = FakeBackend::new(vec![
            Err(CallFailure::RateLimited),
            Err(CallFailure::RateLimited),
        ]);
        let groq = FakeBackend::new(vec![Ok("speedy".into())]);
        let (r, _, groq) = router(creds(&["k1", "k2"], Some("gk")), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Auto).await;
        assert_eq!(reply.text, "speedy");
        assert_eq!(reply.model_id, SPEED_MODEL);
        assert_eq!(groq.calls(), vec![("gk".to_string(), SPEED_MODEL.to_string())]);
    }

    #[tokio::test]
    async fn total_exhaustion_yields_the_sentinel_not_an_error() {
        let gemini = FakeBackend::new(vec![Err(CallFailure::RateLimited)]);
        let groq = FakeBackend::new(vec![Err(CallFailure::Other("boom".into()))]);
        let (r, _, _) = router(creds(&["k1"], Some("gk")), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Auto).await;
        assert_eq!(reply.text, EXHAUSTED_MESSAGE);
        assert_eq!(reply.model_id, NO_PROVIDER);
    }

    #[tokio::test]
    async fn gemini_mode_never_touches_groq() {
        let gemini = FakeBackend::new(vec![Err(CallFailure::RateLimited)]);
        let groq = FakeBackend::new(vec![Ok("should not be used".into())]);
        let (r, _, groq) = router(creds(&["k1"], Some("gk")), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Gemini).await;
        assert_eq!(reply.model_id, NO_PROVIDER);
        assert!(groq.calls().is_empty());
    }

    #[tokio::test]
    async fn speed_mode_skips_gemini_entirely() {
        let gemini = FakeBackend::new(vec![Ok("should not be used".into())]);
        let groq = FakeBackend::new(vec![Ok("fast".into())]);
        let (r, gemini, _) = router(creds(&["k1"], Some("gk")), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Speed).await;
        assert_eq!(reply.text, "fast");
        assert!(gemini.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_gemini_keys_fall_through_without_a_call() {
        let gemini = FakeBackend::new(vec![]);
        let groq = FakeBackend::new(vec![Ok("fallback".into())]);
        let (r, gemini, _) = router(creds(&[], Some("gk")), gemini, groq);

        let reply = r.complete("hi", &[], RouteMode::Auto).await;
        assert_eq!(reply.text, "fallback");
        assert!(gemini.calls().is_empty());
    }

    #[test]
    fn route_mode_parsing() {
        assert_eq!(RouteMode::from_str("auto"), Some(RouteMode::Auto));
        assert_eq!(RouteMode::from_str("GEMINI"), Some(RouteMode::Gemini));
        assert_eq!(RouteMode::from_str("speed"), Some(RouteMode::Speed));
        assert_eq!(RouteMode::from_str("groq"), Some(RouteMode::Speed));
        assert_eq!(RouteMode::from_str("other"), None);
    }
}
