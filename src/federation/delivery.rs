//! Activity delivery
//!
//! Fans a plaintext note out to every follower of a local actor. Each
//! follower gets its own Create/Note pair, persisted and signed for that
//! inbox, and POSTed from an independent task.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use super::activity::ActivityFactory;
use super::signature::RequestSigner;
use crate::config::DeliveryConfig;
use crate::data::{Actor, KeyStore, MessageStore};
use crate::error::AppError;
use crate::metrics::{ACTIVITIES_SENT, DELIVERIES_TOTAL, DELIVERY_DURATION_SECONDS};

/// Media type of delivered bodies
pub const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(domain) => {
            let normalized = domain.trim_end_matches('.').to_ascii_lowercase();
            normalized == "localhost" || normalized.ends_with(".localhost")
        }
        url::Host::Ipv4(v4) => is_disallowed_ip(IpAddr::V4(*v4)),
        url::Host::Ipv6(v6) => is_disallowed_ip(IpAddr::V6(*v6)),
    }
}

/// Reject any resolved address that is loopback, private or link-local
fn ensure_public_addrs(
    inbox: &str,
    addrs: impl IntoIterator<Item = SocketAddr>,
) -> Result<(), AppError> {
    let mut resolved_any = false;
    for addr in addrs {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::DeliveryTransport {
                inbox: inbox.to_string(),
                reason: format!("resolves to local or private address {}", addr.ip()),
            });
        }
    }

    if !resolved_any {
        return Err(AppError::DeliveryTransport {
            inbox: inbox.to_string(),
            reason: "no DNS records".to_string(),
        });
    }

    Ok(())
}

/// Where one follower's copy is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    /// Follower actor URI (goes into `cc`)
    pub follower: String,
    /// `{follower}/inbox`
    pub inbox: String,
    /// Authority of the follower URI, port included when explicit
    pub host: String,
    /// Path (and query) of the inbox, used in `(request-target)`
    pub path: String,
    /// Bare host name or IP, for address resolution
    hostname: String,
    /// Explicit port or the scheme default
    port: u16,
}

impl DeliveryTarget {
    /// Derive inbox, host and path from a follower URI
    ///
    /// # Errors
    /// `DeliveryTransport` if the URI is not an absolute http(s) URL, or
    /// points at a local/private host while `allow_private` is false.
    pub fn from_follower(follower: &str, allow_private: bool) -> Result<Self, AppError> {
        let inbox = format!("{}/inbox", follower);
        let reject = |reason: String| AppError::DeliveryTransport {
            inbox: inbox.clone(),
            reason,
        };

        let parsed = url::Url::parse(&inbox).map_err(|e| reject(format!("invalid URL: {}", e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(reject(format!("unsupported scheme: {}", scheme))),
        }

        let host = parsed
            .host()
            .ok_or_else(|| reject("missing host".to_string()))?;
        if !allow_private && is_disallowed_host(&host) {
            return Err(reject("local or private address".to_string()));
        }

        let hostname = match &host {
            url::Host::Ipv6(v6) => v6.to_string(),
            other => other.to_string(),
        };
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| reject("missing port".to_string()))?;

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };

        Ok(Self {
            follower: follower.to_string(),
            inbox,
            host: authority,
            path,
            hostname,
            port,
        })
    }

    /// Resolve the host and fail if any address is local or private
    ///
    /// Catches DNS names that point back into the local network, which the
    /// literal checks in [`DeliveryTarget::from_follower`] cannot see.
    pub async fn ensure_public_addresses(&self) -> Result<(), AppError> {
        let addrs = tokio::net::lookup_host((self.hostname.as_str(), self.port))
            .await
            .map_err(|e| AppError::DeliveryTransport {
                inbox: self.inbox.clone(),
                reason: format!("failed to resolve host: {}", e),
            })?;

        ensure_public_addrs(&self.inbox, addrs)
    }
}

/// Step of a single delivery at which it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    /// Follower URI could not be turned into an inbox target
    Resolve,
    /// Create/Note pair could not be stored
    Persist,
    /// Body could not be serialized or signed
    Sign,
    /// Network error or non-2xx response
    Send,
}

/// Result of a delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Follower actor URI
    pub follower: String,
    /// Target inbox URI
    pub inbox_uri: String,
    /// Id of the Create activity built for this follower
    pub activity_id: Option<String>,
    /// Whether the inbox acknowledged the activity (2xx)
    pub success: bool,
    /// Stage that failed, if any
    pub failed_at: Option<DeliveryStage>,
    /// Error message if failed
    pub error: Option<String>,
    /// HTTP status code if a response was received
    pub status_code: Option<u16>,
}

impl DeliveryResult {
    fn failed(
        follower: &str,
        inbox_uri: &str,
        activity_id: Option<String>,
        stage: DeliveryStage,
        error: &AppError,
    ) -> Self {
        Self {
            follower: follower.to_string(),
            inbox_uri: inbox_uri.to_string(),
            activity_id,
            success: false,
            failed_at: Some(stage),
            error: Some(error.to_string()),
            status_code: None,
        }
    }
}

/// Per-recipient outcomes of one dispatch
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub results: Vec<DeliveryResult>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }
}

/// Outbox delivery service
///
/// Holds the key store, message store and a shared HTTP client. Cloning is
/// cheap; clones share all three.
pub struct DeliveryDispatcher<K, M> {
    keys: Arc<K>,
    messages: Arc<M>,
    http_client: reqwest::Client,
    factory: ActivityFactory,
    max_concurrent: usize,
    allow_private_targets: bool,
}

impl<K, M> Clone for DeliveryDispatcher<K, M> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            messages: Arc::clone(&self.messages),
            http_client: self.http_client.clone(),
            factory: self.factory,
            max_concurrent: self.max_concurrent,
            allow_private_targets: self.allow_private_targets,
        }
    }
}

impl<K: KeyStore, M: MessageStore> DeliveryDispatcher<K, M> {
    /// Create new delivery service
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(keys: Arc<K>, messages: Arc<M>, config: &DeliveryConfig) -> Result<Self, AppError> {
        // A 3xx is a failed delivery; following it would turn the POST into a GET
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            keys,
            messages,
            http_client,
            factory: ActivityFactory::new(),
            max_concurrent: config.max_concurrent.max(1),
            allow_private_targets: config.allow_private_targets,
        })
    }

    /// Deliver `plaintext` as a public Note to every follower of `actor`
    ///
    /// Returns once every delivery has been attempted. Per-recipient
    /// failures are reported in the [`DeliveryReport`], never as `Err`.
    ///
    /// # Errors
    /// - `NoFollowers` if the follower list is empty or absent
    /// - `KeyNotFound`/`InvalidKey` if the actor cannot sign
    ///
    /// Both are raised before anything is persisted or sent.
    pub async fn deliver(&self, plaintext: &str, actor: &Actor) -> Result<DeliveryReport, AppError> {
        let account_id = actor.account_id();

        let followers = self.keys.lookup_followers(&account_id).await?;
        if followers.is_empty() {
            tracing::warn!(account = %account_id, "No followers to deliver to");
            return Err(AppError::NoFollowers(account_id));
        }

        let signer = match RequestSigner::for_actor(self.keys.as_ref(), actor).await {
            Ok(signer) => Arc::new(signer),
            Err(error) => {
                tracing::error!(account = %account_id, %error, "Cannot sign deliveries");
                return Err(error);
            }
        };

        tracing::info!(
            account = %account_id,
            followers = followers.len(),
            "Delivering Create activity to followers"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let actor = Arc::new(actor.clone());
        let plaintext: Arc<str> = Arc::from(plaintext);

        let mut tasks = Vec::with_capacity(followers.len());
        for follower in followers {
            let semaphore = Arc::clone(&semaphore);
            let signer = Arc::clone(&signer);
            let actor = Arc::clone(&actor);
            let plaintext = Arc::clone(&plaintext);
            let self_clone = self.clone();
            let task_follower = follower.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                self_clone
                    .deliver_to_follower(&signer, &actor, &plaintext, &task_follower)
                    .await
            });

            tasks.push((follower, task));
        }

        let (followers, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let joined = futures::future::join_all(handles).await;

        let mut report = DeliveryReport::default();
        for (follower, outcome) in followers.into_iter().zip(joined) {
            let result = outcome.unwrap_or_else(|join_error| {
                tracing::error!(follower = %follower, error = %join_error, "Delivery task aborted");
                DeliveryResult {
                    inbox_uri: format!("{}/inbox", follower),
                    follower,
                    activity_id: None,
                    success: false,
                    failed_at: Some(DeliveryStage::Send),
                    error: Some(join_error.to_string()),
                    status_code: None,
                }
            });
            report.results.push(result);
        }

        tracing::info!(
            account = %account_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch delivery complete"
        );

        Ok(report)
    }

    /// Build → persist → sign → send for a single follower
    async fn deliver_to_follower(
        &self,
        signer: &RequestSigner,
        actor: &Actor,
        plaintext: &str,
        follower: &str,
    ) -> DeliveryResult {
        let target = match self.resolve(follower).await {
            Ok(target) => target,
            Err(error) => {
                tracing::warn!(follower = %follower, %error, "Skipping follower");
                DELIVERIES_TOTAL.with_label_values(&["failure"]).inc();
                return DeliveryResult::failed(
                    follower,
                    &format!("{}/inbox", follower),
                    None,
                    DeliveryStage::Resolve,
                    &error,
                );
            }
        };

        let pair = self.factory.build(plaintext, actor, follower);
        let activity_id = Some(pair.create.id.clone());
        let fail = |stage: DeliveryStage, error: AppError| {
            tracing::warn!(
                inbox = %target.inbox,
                activity = %pair.create.id,
                stage = ?stage,
                %error,
                "Delivery failed"
            );
            DELIVERIES_TOTAL.with_label_values(&["failure"]).inc();
            DeliveryResult::failed(follower, &target.inbox, activity_id.clone(), stage, &error)
        };

        if let Err(error) = self.persist(&pair).await {
            return fail(DeliveryStage::Persist, error);
        }

        let signed = match signer.sign(&pair.create, &target.host, &target.path) {
            Ok(signed) => signed,
            Err(error) => return fail(DeliveryStage::Sign, error),
        };

        match self.post(&target, signed).await {
            Ok(status) => {
                tracing::info!(
                    inbox = %target.inbox,
                    activity = %pair.create.id,
                    status,
                    "Delivered activity"
                );
                DELIVERIES_TOTAL.with_label_values(&["success"]).inc();
                ACTIVITIES_SENT.with_label_values(&["Create"]).inc();
                DeliveryResult {
                    follower: follower.to_string(),
                    inbox_uri: target.inbox.clone(),
                    activity_id: activity_id.clone(),
                    success: true,
                    failed_at: None,
                    error: None,
                    status_code: Some(status),
                }
            }
            Err((error, status_code)) => {
                let mut result = fail(DeliveryStage::Send, error);
                result.status_code = status_code;
                result
            }
        }
    }

    async fn resolve(&self, follower: &str) -> Result<DeliveryTarget, AppError> {
        let target = DeliveryTarget::from_follower(follower, self.allow_private_targets)?;
        if !self.allow_private_targets {
            target.ensure_public_addresses().await?;
        }
        Ok(target)
    }

    async fn persist(&self, pair: &super::activity::ActivityPair) -> Result<(), AppError> {
        for record in pair.records()? {
            self.messages.put(&record.guid, &record.message).await?;
        }
        Ok(())
    }

    /// POST a signed body; returns the 2xx status or the error and any status
    async fn post(
        &self,
        target: &DeliveryTarget,
        signed: super::signature::SignedRequest,
    ) -> Result<u16, (AppError, Option<u16>)> {
        let headers = signed.headers.to_header_map().map_err(|e| (e, None))?;

        let started = Instant::now();
        let response = self
            .http_client
            .post(&target.inbox)
            .headers(headers)
            .header(http::header::CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)
            .body(signed.body)
            .send()
            .await;
        DELIVERY_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let response = response.map_err(|e| {
            (
                AppError::DeliveryTransport {
                    inbox: target.inbox.clone(),
                    reason: e.to_string(),
                },
                None,
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err((
                AppError::DeliveryTransport {
                    inbox: target.inbox.clone(),
                    reason: format!("HTTP {}", status),
                },
                Some(status.as_u16()),
            ));
        }

        Ok(status.as_u16())
    }
}
