//! 🔁 RetryPolicy — "have you tried turning it off and on again?" but for API calls.
//!
//! 🎬 *[the RDS cluster is failing over. every query says "read-only transaction".]*
//! *[the DynamoDB table is throttling. every write says "provisioned throughput exceeded".]*
//! *[the retry policy cracks its knuckles.]*
//!
//! 🧠 Knowledge graph:
//! - [`RemoteError`]: what a cloud call failed with. A code (maybe) and a message. That's all
//!   we ever look at.
//! - [`classify_transient`]: the default opinion on whether an error is worth another go.
//! - [`RetryPolicy::run`]: the loop. Expected codes go back to the caller, transient ones
//!   get another attempt after a backoff, anything else goes back as [`RetryError::Fatal`]
//!   with the original error untouched.
//! - [`RetryPolicy::insist`]: the old-school mode. No ceiling, no delay. Keeps knocking.
//!
//! 🦆 The duck retries too. The duck has a ceiling though.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// 📡 A failure reported by a remote service, boiled down to the two fields we classify on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_remote(.code, .message))]
pub struct RemoteError {
    /// 🏷️ provider error code, e.g. `ResourceNotFoundException`
    pub code: Option<String>,
    /// 💬 the human message
    pub message: String,
}

fn render_remote(code: &Option<String>, message: &str) -> String {
    match code {
        Some(code) => format!("{code}: {message}"),
        None => message.to_string(),
    }
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// 🤷 A failure with no code, just words.
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

/// 🚦 What the policy does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// 🔄 go again
    Retryable,
    /// 💀 stop, tell the caller
    Fatal,
    /// 📬 the caller asked for this one, hand it back as a normal failure
    Expected,
}

/// 🧯 Why a wrapped operation did not produce a value.
#[derive(Debug, Error)]
pub enum RetryError {
    /// 📬 A code the caller listed as expected. Control flow, not a problem.
    #[error("{operation}: expected failure ({source})")]
    Expected {
        operation: String,
        #[source]
        source: RemoteError,
    },
    /// 💀 Not retryable. `context` is whatever the caller attached (a SQL statement, say).
    #[error("{operation} failed{}", render_context(.context))]
    Fatal {
        operation: String,
        context: Option<String>,
        #[source]
        source: RemoteError,
    },
    /// ⏳ Still transient after the last allowed attempt.
    #[error("{operation} still failing after {attempts} attempts{}", render_context(.context))]
    Exhausted {
        operation: String,
        attempts: u32,
        context: Option<String>,
        #[source]
        source: RemoteError,
    },
}

fn render_context(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" (while running: {context})"),
        None => String::new(),
    }
}

impl RetryError {
    /// 🔍 The original remote error, whatever the variant.
    pub fn remote(&self) -> &RemoteError {
        match self {
            RetryError::Expected { source, .. }
            | RetryError::Fatal { source, .. }
            | RetryError::Exhausted { source, .. } => source,
        }
    }

    pub fn is_expected(&self) -> bool {
        matches!(self, RetryError::Expected { .. })
    }

    /// 🏷️ True when this is an expected failure carrying exactly `code`.
    pub fn is_expected_code(&self, code: &str) -> bool {
        self.is_expected() && self.remote().has_code(code)
    }
}

/// 🐢 Throttling and friends, by code.
pub const TRANSIENT_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "NetworkingError",
    "RequestTimeout",
    "RequestTimeoutException",
];

/// 🐌 Database hiccups, by (lowercased) message fragment.
pub const TRANSIENT_MESSAGES: &[&str] = &[
    "request timed out",
    "remaining connection slots are reserved",
    "i/o error occurred",
    // the Data API really does spell it this way sometimes
    "i/o error occured",
    "too many clients already",
    "in a read-only transaction",
];

/// 🔎 Default classifier: transient codes and message fragments retry, everything else is fatal.
pub fn classify_transient(error: &RemoteError) -> Classification {
    if let Some(code) = error.code.as_deref()
        && TRANSIENT_CODES.contains(&code)
    {
        return Classification::Retryable;
    }
    let message = error.message.to_lowercase();
    if TRANSIENT_MESSAGES
        .iter()
        .any(|fragment| message.contains(fragment))
    {
        return Classification::Retryable;
    }
    Classification::Fatal
}

/// 🔧 Knobs for the retry loop. Lives under `[retry]` in the config file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// total attempts including the first; 0 means "never give up"
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// ⏱️ Backoff before retry number `retry` (1-based), before jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

type Classifier = Arc<dyn Fn(&RemoteError) -> Classification + Send + Sync>;

/// 🔁 Wraps remote calls, resubmitting the transient failures.
///
/// Cheap to clone. The builder methods return a new policy, so a shared base
/// policy can be specialised per call site without anyone stepping on anyone.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    expected: Vec<String>,
    context: Option<String>,
    classifier: Classifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("expected", &self.expected)
            .field("context", &self.context)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            expected: Vec::new(),
            context: None,
            classifier: Arc::new(classify_transient),
        }
    }

    /// 🐐 Unbounded, zero-delay. Knocks until the door opens.
    pub fn insist() -> Self {
        Self::new(RetryConfig {
            max_attempts: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: false,
        })
    }

    /// 📬 These codes come back as [`RetryError::Expected`] instead of being classified.
    pub fn expecting<I, S>(&self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = self.clone();
        policy.expected.extend(codes.into_iter().map(Into::into));
        policy
    }

    /// 🧾 Attach diagnostic context (a statement, a request summary) to fatal errors.
    pub fn with_context(&self, context: impl Into<String>) -> Self {
        let mut policy = self.clone();
        policy.context = Some(context.into());
        policy
    }

    pub fn with_classifier<F>(&self, classifier: F) -> Self
    where
        F: Fn(&RemoteError) -> Classification + Send + Sync + 'static,
    {
        let mut policy = self.clone();
        policy.classifier = Arc::new(classifier);
        policy
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 🚦 Expected list first, then the classifier.
    pub fn classify(&self, error: &RemoteError) -> Classification {
        if let Some(code) = error.code.as_deref()
            && self.expected.iter().any(|expected| expected == code)
        {
            return Classification::Expected;
        }
        (self.classifier)(error)
    }

    fn backoff(&self, retry: u32) -> Duration {
        let delay = self.config.delay_for(retry);
        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }

    /// 🚀 Run `op`, retrying transient failures.
    ///
    /// `operation` names the call in logs and errors. `op` is invoked once per
    /// attempt and must build a fresh request each time.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.classify(&error) {
                Classification::Expected => {
                    debug!(operation, code = ?error.code, "📬 expected failure, handing it back");
                    return Err(RetryError::Expected {
                        operation: operation.to_string(),
                        source: error,
                    });
                }
                Classification::Fatal => {
                    return Err(RetryError::Fatal {
                        operation: operation.to_string(),
                        context: self.context.clone(),
                        source: error,
                    });
                }
                Classification::Retryable => {
                    let ceiling = self.config.max_attempts;
                    if ceiling != 0 && attempt >= ceiling {
                        warn!(operation, attempts = attempt, error = %error, "💀 giving up on a transient failure");
                        return Err(RetryError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            context: self.context.clone(),
                            source: error,
                        });
                    }
                    let delay = self.backoff(attempt);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔄 transient failure, going again"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
