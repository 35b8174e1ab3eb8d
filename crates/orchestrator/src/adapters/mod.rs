//! Uniform contract for every external collaborator.
//!
//! Each collaborator is a [`Capability`] with its own request and response
//! types. Stages call them only through [`invoke`], which bounds the call
//! with a timeout and turns every failure into an [`AdapterError`].

mod http;
mod messages;

pub use http::HttpCapability;
pub use messages::*;

use async_trait::async_trait;
use pathfinder_core::{Candidate, FitScore, RiskFlag};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CapabilityEndpoints;
use crate::error::AdapterError;

#[async_trait]
pub trait Capability: Send + Sync {
    type Request: Send + Sync;
    type Response: Send;

    /// Name used in logs and adapter errors.
    fn name(&self) -> &str;

    async fn call(&self, request: &Self::Request) -> Result<Self::Response, AdapterError>;
}

/// Call a capability, failing with `Timeout` once `timeout` elapses.
pub async fn invoke<C>(
    capability: &C,
    request: &C::Request,
    timeout: Duration,
) -> Result<C::Response, AdapterError>
where
    C: Capability + ?Sized,
{
    match tokio::time::timeout(timeout, capability.call(request)).await {
        Ok(Ok(response)) => {
            debug!(capability = capability.name(), "Capability call succeeded");
            Ok(response)
        }
        Ok(Err(e)) => {
            warn!(
                capability = capability.name(),
                kind = e.kind(),
                error = %e,
                "Capability call failed"
            );
            Err(e)
        }
        Err(_) => {
            warn!(
                capability = capability.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Capability call timed out"
            );
            Err(AdapterError::timeout(capability.name(), timeout))
        }
    }
}

pub type DynCapability<Req, Resp> = Arc<dyn Capability<Request = Req, Response = Resp>>;

/// Placeholder for a collaborator with no configured endpoint.
pub struct Unconfigured<Req, Resp> {
    name: String,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Unconfigured<Req, Resp> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Resp> Capability for Unconfigured<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _request: &Req) -> Result<Resp, AdapterError> {
        Err(AdapterError::unavailable(&self.name, "no endpoint configured"))
    }
}

fn unconfigured<Req, Resp>(name: &str) -> DynCapability<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    Arc::new(Unconfigured::new(name))
}

/// Every collaborator the pipeline may call.
#[derive(Clone)]
pub struct Capabilities {
    pub intent_model: DynCapability<IntentPrompt, IntentReading>,
    pub fit_scorer: DynCapability<FitQuery, FitScore>,
    pub narrator: DynCapability<NarrationRequest, Narration>,
    /// Discovery sources, queried concurrently in this order
    pub sources: Vec<DynCapability<DiscoveryQuery, Vec<Candidate>>>,
    pub price_lookup: DynCapability<PriceQuery, PriceAnswer>,
    pub risk_signals: DynCapability<RiskQuery, Vec<RiskFlag>>,
    pub risk_history: DynCapability<RiskQuery, Vec<RiskFlag>>,
    /// Raw identity metadata; sanitized before use
    pub identity: DynCapability<ProfileQuery, serde_json::Value>,
    pub consent: DynCapability<ConsentRequest, ConsentDecision>,
}

impl Capabilities {
    /// Nothing configured: every stage runs on its fallback.
    pub fn unconfigured() -> Self {
        Self {
            intent_model: unconfigured("intent_model"),
            fit_scorer: unconfigured("fit_scorer"),
            narrator: unconfigured("narrator"),
            sources: Vec::new(),
            price_lookup: unconfigured("price_lookup"),
            risk_signals: unconfigured("risk_signals"),
            risk_history: unconfigured("risk_history"),
            identity: unconfigured("identity"),
            consent: unconfigured("consent"),
        }
    }

    /// HTTP adapters for every configured endpoint, placeholders for the rest.
    pub fn from_endpoints(endpoints: &CapabilityEndpoints, client: reqwest::Client) -> Self {
        fn http<Req, Resp>(
            name: &str,
            url: &Option<String>,
            client: &reqwest::Client,
            api_key: &Option<String>,
        ) -> DynCapability<Req, Resp>
        where
            Req: serde::Serialize + Send + Sync + 'static,
            Resp: serde::de::DeserializeOwned + Send + 'static,
        {
            match url {
                Some(url) => {
                    let mut cap = HttpCapability::new(name, url).with_client(client.clone());
                    if let Some(key) = api_key {
                        cap = cap.with_api_key(key);
                    }
                    Arc::new(cap)
                }
                None => unconfigured(name),
            }
        }

        let key = &endpoints.api_key;
        let sources = endpoints
            .sources
            .iter()
            .map(|s| http(&s.name, &Some(s.url.clone()), &client, key))
            .collect();

        Self {
            intent_model: http("intent_model", &endpoints.intent_model, &client, key),
            fit_scorer: http("fit_scorer", &endpoints.fit_scorer, &client, key),
            narrator: http("narrator", &endpoints.narrator, &client, key),
            sources,
            price_lookup: http("price_lookup", &endpoints.price_lookup, &client, key),
            risk_signals: http("risk_signals", &endpoints.risk_signals, &client, key),
            risk_history: http("risk_history", &endpoints.risk_history, &client, key),
            identity: http("identity", &endpoints.identity, &client, key),
            consent: http("consent", &endpoints.consent, &client, key),
        }
    }

    pub fn with_intent_model(mut self, cap: DynCapability<IntentPrompt, IntentReading>) -> Self {
        self.intent_model = cap;
        self
    }

    pub fn with_fit_scorer(mut self, cap: DynCapability<FitQuery, FitScore>) -> Self {
        self.fit_scorer = cap;
        self
    }

    pub fn with_narrator(mut self, cap: DynCapability<NarrationRequest, Narration>) -> Self {
        self.narrator = cap;
        self
    }

    pub fn with_source(mut self, cap: DynCapability<DiscoveryQuery, Vec<Candidate>>) -> Self {
        self.sources.push(cap);
        self
    }

    pub fn with_price_lookup(mut self, cap: DynCapability<PriceQuery, PriceAnswer>) -> Self {
        self.price_lookup = cap;
        self
    }

    pub fn with_risk_signals(mut self, cap: DynCapability<RiskQuery, Vec<RiskFlag>>) -> Self {
        self.risk_signals = cap;
        self
    }

    pub fn with_risk_history(mut self, cap: DynCapability<RiskQuery, Vec<RiskFlag>>) -> Self {
        self.risk_history = cap;
        self
    }

    pub fn with_identity(mut self, cap: DynCapability<ProfileQuery, serde_json::Value>) -> Self {
        self.identity = cap;
        self
    }

    pub fn with_consent(mut self, cap: DynCapability<ConsentRequest, ConsentDecision>) -> Self {
        self.consent = cap;
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("intent_model", &self.intent_model.name())
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("narrator", &self.narrator.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted capabilities for unit tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every call with a closure over the request.
    pub struct Scripted<Req, Resp> {
        name: String,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
        respond: Box<dyn Fn(&Req, usize) -> Result<Resp, AdapterError> + Send + Sync>,
    }

    impl<Req, Resp> Scripted<Req, Resp> {
        pub fn new(
            name: &str,
            respond: impl Fn(&Req, usize) -> Result<Resp, AdapterError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                name: name.to_string(),
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
                respond: Box::new(respond),
            }
        }

        pub fn failing(name: &str) -> Self
        where
            Req: 'static,
            Resp: 'static,
        {
            let owned = name.to_string();
            Self::new(name, move |_, _| Err(AdapterError::unavailable(&owned, "scripted failure")))
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Shared call counter, readable after the capability is moved.
        pub fn calls(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl<Req, Resp> Capability for Scripted<Req, Resp>
    where
        Req: Send + Sync + 'static,
        Resp: Send + 'static,
    {
        type Request = Req;
        type Response = Resp;

        fn name(&self) -> &str {
            &self.name
        }

        async fn call(&self, request: &Req) -> Result<Resp, AdapterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.respond)(request, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Scripted;
    use super::*;

    #[tokio::test]
    async fn test_invoke_passes_through_success() {
        let cap = Scripted::new("echo", |req: &String, _| Ok(req.to_uppercase()));
        let out = invoke(&cap, &"hi".to_string(), Duration::from_secs(1)).await;
        assert_eq!(out, Ok("HI".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let cap = Scripted::new("slow", |_: &(), _| Ok(1u32)).with_delay(Duration::from_secs(10));
        let out = invoke(&cap, &(), Duration::from_millis(200)).await;
        assert_eq!(
            out,
            Err(AdapterError::Timeout {
                capability: "slow".into(),
                timeout_ms: 200
            })
        );
    }

    #[tokio::test]
    async fn test_unconfigured_is_unavailable() {
        let caps = Capabilities::unconfigured();
        let err = invoke(
            caps.consent.as_ref(),
            &ConsentRequest {
                user_id: "u1".into(),
                action: "send_email".into(),
                scopes: vec![],
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert!(caps.sources.is_empty());
    }

    #[test]
    fn test_from_endpoints_builds_sources() {
        let endpoints = CapabilityEndpoints {
            sources: vec![crate::config::SourceEndpoint {
                name: "places".into(),
                url: "http://localhost:9/places".into(),
            }],
            ..Default::default()
        };
        let caps = Capabilities::from_endpoints(&endpoints, reqwest::Client::new());
        assert_eq!(caps.sources.len(), 1);
        assert_eq!(caps.sources[0].name(), "places");
        assert_eq!(caps.narrator.name(), "narrator");
    }
}
