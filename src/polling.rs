//! Bounded poll and retry loops
//!
//! Both loops sleep on the calling task between attempts. Callers that need to
//! give up early pass a `watch::Receiver<bool>`; flipping it to `true` aborts the
//! loop with [`WxPayError::Cancelled`] without waiting out the interval.

use crate::client::WxPayClient;
use crate::params::ParamSet;
use crate::response::ResultSet;
use crate::types::{Credentials, QueryRequest, ReverseRequest, TradeState};
use crate::{Result, WxPayError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Time budget and interval for [`WxPayClient::loop_query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total time budget
    pub limit: Duration,
    /// Pause between attempts
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a poll policy
    pub fn new(limit: Duration, interval: Duration) -> Self {
        Self { limit, interval }
    }

    /// Number of queries allowed: `floor(limit / interval)`
    pub fn attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return 0;
        }
        let attempts = self.limit.as_nanos() / self.interval.as_nanos();
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            limit: Duration::from_secs(30),
            interval: Duration::from_secs(2),
        }
    }
}

/// What the poll loop does after one query
#[derive(Debug)]
pub enum PollStep {
    /// Payment succeeded
    Succeeded(ResultSet),
    /// Payment can no longer succeed
    Failed(TradeState),
    /// Transient condition; pause before the next query
    Wait,
    /// State not decided yet; query again without pausing
    Undecided,
}

impl PollStep {
    /// Classify the outcome of one order query
    pub fn from_query(result: Result<ResultSet>) -> Self {
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "Order query failed, will retry");
                return Self::Wait;
            }
        };

        match result.trade_state() {
            None => Self::Wait,
            Some(TradeState::Success) => Self::Succeeded(result),
            Some(state) if state.is_terminal_failure() => Self::Failed(state),
            Some(TradeState::UserPaying) => Self::Wait,
            Some(_) => Self::Undecided,
        }
    }
}

/// Sleep for `interval`, returning early with `Cancelled` if the signal fires
async fn pause(
    interval: Duration,
    cancel: &mut Option<watch::Receiver<bool>>,
    operation: &'static str,
) -> Result<()> {
    let Some(rx) = cancel.as_mut() else {
        tokio::time::sleep(interval).await;
        return Ok(());
    };
    if *rx.borrow() {
        return Err(WxPayError::Cancelled { operation });
    }

    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return Ok(()),
            changed = async { rx.changed().await.map(|_| *rx.borrow()) } => match changed {
                Ok(true) => return Err(WxPayError::Cancelled { operation }),
                Ok(false) => continue,
                Err(_) => {
                    // Sender dropped, nobody can cancel any more
                    (&mut sleep).await;
                    return Ok(());
                }
            },
        }
    }
}

fn check_cancelled(
    cancel: &Option<watch::Receiver<bool>>,
    operation: &'static str,
) -> Result<()> {
    match cancel {
        Some(rx) if *rx.borrow() => Err(WxPayError::Cancelled { operation }),
        _ => Ok(()),
    }
}

impl WxPayClient {
    /// Poll the order until it succeeds, fails, or the budget runs out.
    ///
    /// Query errors and responses without `trade_state` are treated as
    /// transient. Returns the successful query result,
    /// [`WxPayError::PaymentFailed`] for a terminal state, or
    /// [`WxPayError::Timeout`].
    pub async fn loop_query(
        &self,
        req: &QueryRequest,
        credentials: &Credentials,
        policy: PollPolicy,
    ) -> Result<ResultSet> {
        self.run_loop_query(req, credentials, policy, None).await
    }

    /// [`Self::loop_query`] that stops with [`WxPayError::Cancelled`] once
    /// `cancel` reads `true`
    pub async fn loop_query_with_cancel(
        &self,
        req: &QueryRequest,
        credentials: &Credentials,
        policy: PollPolicy,
        cancel: watch::Receiver<bool>,
    ) -> Result<ResultSet> {
        self.run_loop_query(req, credentials, policy, Some(cancel))
            .await
    }

    async fn run_loop_query(
        &self,
        req: &QueryRequest,
        credentials: &Credentials,
        policy: PollPolicy,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ResultSet> {
        const OPERATION: &str = "loop_query";
        if policy.interval.is_zero() {
            return Err(WxPayError::invalid_argument("poll interval must be non-zero"));
        }

        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            check_cancelled(&cancel, OPERATION)?;

            match PollStep::from_query(self.query(req, credentials).await) {
                PollStep::Succeeded(result) => {
                    info!(attempt, out_trade_no = %req.out_trade_no, "Payment succeeded");
                    return Ok(result);
                }
                PollStep::Failed(state) => {
                    info!(attempt, trade_state = %state, "Payment failed");
                    return Err(WxPayError::PaymentFailed {
                        trade_state: state.to_string(),
                    });
                }
                PollStep::Wait => {
                    debug!(attempt, attempts, "Payment not settled yet");
                    if attempt < attempts {
                        pause(policy.interval, &mut cancel, OPERATION).await?;
                    }
                }
                PollStep::Undecided => {
                    debug!(attempt, "Payment state undecided, querying again");
                }
            }
        }

        warn!(attempts, out_trade_no = %req.out_trade_no, "Order polling timed out");
        Err(WxPayError::Timeout {
            operation: OPERATION,
            attempts,
        })
    }

    /// Reverse (cancel) an order over mutual TLS.
    ///
    /// While the gateway answers `recall=Y` the call pauses `interval` and
    /// tries again, at most `attempts` times in total. `recall=N` is success.
    pub async fn reverse(
        &self,
        req: &ReverseRequest,
        credentials: &Credentials,
        attempts: u32,
        interval: Duration,
    ) -> Result<ResultSet> {
        self.run_reverse(req, credentials, attempts, interval, None)
            .await
    }

    /// [`Self::reverse`] that stops with [`WxPayError::Cancelled`] once
    /// `cancel` reads `true`
    pub async fn reverse_with_cancel(
        &self,
        req: &ReverseRequest,
        credentials: &Credentials,
        attempts: u32,
        interval: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Result<ResultSet> {
        self.run_reverse(req, credentials, attempts, interval, Some(cancel))
            .await
    }

    async fn run_reverse(
        &self,
        req: &ReverseRequest,
        credentials: &Credentials,
        attempts: u32,
        interval: Duration,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ResultSet> {
        const OPERATION: &str = "reverse";
        if attempts == 0 {
            return Err(WxPayError::invalid_argument(
                "reverse attempts must be greater than 0",
            ));
        }
        let transport = credentials.mutual_tls_transport(self.config().timeout)?;

        for attempt in 1..=attempts {
            check_cancelled(&cancel, OPERATION)?;

            let mut params = ParamSet::common(&req.account);
            params.set("transaction_id", &req.transaction_id);
            params.set("out_trade_no", &req.out_trade_no);

            info!(attempt, out_trade_no = %req.out_trade_no, "Submitting reverse");
            let result = self
                .submit(
                    transport,
                    &self.config().endpoints.reverse,
                    params,
                    credentials.key(),
                )
                .await?;

            match result.get("recall") {
                Some("N") => return Ok(result),
                Some("Y") => {
                    debug!(attempt, attempts, "Gateway asked to retry reverse");
                    if attempt < attempts {
                        pause(interval, &mut cancel, OPERATION).await?;
                    }
                }
                other => {
                    return Err(WxPayError::ReverseFailed {
                        recall: other.map(str::to_string),
                    })
                }
            }
        }

        warn!(attempts, out_trade_no = %req.out_trade_no, "Reverse retries exhausted");
        Err(WxPayError::Timeout {
            operation: OPERATION,
            attempts,
        })
    }
}
