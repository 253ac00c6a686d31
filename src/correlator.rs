//! Matching outgoing commands to the notifications that answer them
//!
//! The bridge never echoes a request id, so a response is any notification
//! for the right address, observed no earlier than the command was issued,
//! carrying the expected level (or any level for a plain read). When several
//! qualify, the most recently appended one wins.

use crate::error::{BridgeError, Result};
use crate::notification_log::NotificationLog;
use crate::types::{Address, Notification};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Lifecycle of a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Issued,
    Polling,
    Matched,
    TimedOut,
}

impl RequestState {
    /// Whether the request has finished, matched or not
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Matched | RequestState::TimedOut)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Issued => "issued",
            RequestState::Polling => "polling",
            RequestState::Matched => "matched",
            RequestState::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// A command waiting for its notification
#[derive(Debug, Clone)]
pub struct PendingRequest {
    id: Uuid,
    address: Address,
    expected_brightness: Option<f64>,
    issued_at: Instant,
    state: RequestState,
}

impl PendingRequest {
    /// Start a request now; `None` accepts any fresh level
    pub fn issue(address: Address, expected_brightness: Option<f64>) -> Self {
        Self::issued_at(address, expected_brightness, Instant::now())
    }

    /// Start a request with an explicit issue time
    pub fn issued_at(address: Address, expected_brightness: Option<f64>, issued_at: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            expected_brightness,
            issued_at,
            state: RequestState::Issued,
        }
    }

    /// Get the request id used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the address being waited on
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the level that counts as an answer, if any
    pub fn expected_brightness(&self) -> Option<f64> {
        self.expected_brightness
    }

    /// Get the time the command was issued
    pub fn issue_time(&self) -> Instant {
        self.issued_at
    }

    /// Get the current request state
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Whether `notification` answers this request
    pub fn matches(&self, notification: &Notification) -> bool {
        notification.address() == &self.address
            && notification.observed_at() >= self.issued_at
            && self
                .expected_brightness
                .is_none_or(|level| notification.has_brightness(level))
    }

    fn transition(&mut self, next: RequestState) {
        tracing::trace!(
            request = %self.id,
            address = %self.address,
            from = %self.state,
            to = %next,
            "Request state change"
        );
        self.state = next;
    }
}

/// Resolves pending requests against the shared notification log
#[derive(Clone)]
pub struct Correlator {
    log: Arc<NotificationLog>,
    poll_interval: Duration,
    response_timeout: Duration,
}

impl Correlator {
    /// Create a correlator over `log`
    pub fn new(log: Arc<NotificationLog>, poll_interval: Duration, response_timeout: Duration) -> Self {
        Self {
            log,
            // interval() panics on a zero period
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            response_timeout,
        }
    }

    /// Get the shared notification log
    pub fn log(&self) -> &Arc<NotificationLog> {
        &self.log
    }

    /// Get the response budget
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Cache lookup: the latest notification for `address`, regardless of age
    pub fn cached(&self, address: &Address) -> Option<Notification> {
        self.log.latest_for(address)
    }

    /// Wait until the log holds an answer for `request` or the budget runs out
    ///
    /// The log is re-scanned on every append and at least once per poll
    /// interval. On timeout the error names the request's address.
    pub async fn await_match(&self, request: &mut PendingRequest) -> Result<Notification> {
        request.transition(RequestState::Polling);

        let outcome = timeout(self.response_timeout, self.poll(request)).await;
        match outcome {
            Ok(notification) => {
                request.transition(RequestState::Matched);
                tracing::debug!(
                    request = %request.id,
                    address = %request.address,
                    brightness = notification.brightness(),
                    "Request matched"
                );
                Ok(notification)
            }
            Err(_) => {
                request.transition(RequestState::TimedOut);
                tracing::debug!(
                    request = %request.id,
                    address = %request.address,
                    "Request timed out after {:?}",
                    self.response_timeout
                );
                Err(BridgeError::NoResponse {
                    address: request.address.to_string(),
                })
            }
        }
    }

    async fn poll(&self, request: &PendingRequest) -> Notification {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let appended = self.log.appended();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(notification) = self.log.find_last_matching(|n| request.matches(n)) {
                return notification;
            }

            tokio::select! {
                _ = &mut appended => {}
                _ = ticker.tick() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;

    const POLL: Duration = Duration::from_millis(100);
    const BUDGET: Duration = Duration::from_millis(5000);

    fn addr(text: &str) -> Address {
        Address::parse(text).unwrap()
    }

    fn correlator(policy: RetentionPolicy) -> Correlator {
        Correlator::new(Arc::new(NotificationLog::new(policy)), POLL, BUDGET)
    }

    fn report(address: &str, level: f64) -> Notification {
        Notification::new(addr(address), level, Instant::now()).unwrap()
    }

    #[test]
    fn matching_rules() {
        let issued = Instant::now();
        let request = PendingRequest::issued_at(addr("1.4.2"), Some(50.0), issued);

        let later = issued + Duration::from_millis(10);
        let earlier = issued - Duration::from_millis(10);
        let n = |a: &str, level: f64, at: Instant| Notification::new(addr(a), level, at).unwrap();

        assert!(request.matches(&n("1.4.2", 50.0, issued)));
        assert!(request.matches(&n("1.4.2", 50.0, later)));
        assert!(!request.matches(&n("1.4.2", 50.0, earlier)));
        assert!(!request.matches(&n("1.4.2", 40.0, later)));
        assert!(!request.matches(&n("1.4.3", 50.0, later)));

        let any = PendingRequest::issued_at(addr("1.4.2"), None, issued);
        assert!(any.matches(&n("1.4.2", 13.0, later)));
        assert!(!any.matches(&n("1.4.2", 13.0, earlier)));
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_on_fresh_notification() {
        let correlator = correlator(RetentionPolicy::default());
        let mut request = PendingRequest::issue(addr("1.4.2"), Some(75.0));
        assert_eq!(request.state(), RequestState::Issued);

        let log = correlator.log().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            log.append(report("1.4.2", 75.0));
        });

        let start = Instant::now();
        let matched = correlator.await_match(&mut request).await.unwrap();
        assert_eq!(matched.brightness(), 75.0);
        assert_eq!(request.state(), RequestState::Matched);
        assert!(start.elapsed() < Duration::from_millis(250) + POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_stale_notifications() {
        let correlator = correlator(RetentionPolicy::default());
        correlator.log().append(report("1.4.2", 75.0));

        tokio::time::advance(Duration::from_millis(1)).await;
        let mut request = PendingRequest::issue(addr("1.4.2"), Some(75.0));

        let result = correlator.await_match(&mut request).await;
        assert!(matches!(result, Err(BridgeError::NoResponse { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_the_budget() {
        let correlator = correlator(RetentionPolicy::default());
        let mut request = PendingRequest::issue(addr("3.1.7"), None);

        let start = Instant::now();
        let err = correlator.await_match(&mut request).await.unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err.to_string(), "No response from address 3.1.7");
        assert_eq!(request.state(), RequestState::TimedOut);
        assert!(request.state().is_terminal());
        assert!(elapsed >= BUDGET, "timed out early: {:?}", elapsed);
        assert!(elapsed < BUDGET + POLL, "timed out late: {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_level_does_not_resolve() {
        let correlator = correlator(RetentionPolicy::default());
        let mut request = PendingRequest::issue(addr("1.1.1"), Some(100.0));

        let log = correlator.log().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            log.append(report("1.1.1", 40.0));
            log.append(report("1.1.2", 100.0));
        });

        assert!(correlator.await_match(&mut request).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn later_of_two_matches_wins() {
        let correlator = correlator(RetentionPolicy::Unbounded);
        let mut request = PendingRequest::issue(addr("1.4.2"), Some(60.0));

        tokio::time::advance(Duration::from_millis(10)).await;
        let first = report("1.4.2", 60.0);
        tokio::time::advance(Duration::from_millis(10)).await;
        let second = report("1.4.2", 60.0);
        correlator.log().append(first.clone());
        correlator.log().append(second.clone());

        let matched = correlator.await_match(&mut request).await.unwrap();
        assert_eq!(matched.observed_at(), second.observed_at());
        assert!(matched.observed_at() > first.observed_at());
    }

    #[tokio::test(start_paused = true)]
    async fn interleaved_requests_resolve_independently() {
        let correlator = correlator(RetentionPolicy::default());
        let mut first = PendingRequest::issue(addr("1.1.1"), Some(20.0));
        let mut second = PendingRequest::issue(addr("1.1.2"), Some(80.0));

        let log = correlator.log().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            log.append(report("1.1.2", 10.0));
            log.append(report("1.1.1", 20.0));
            tokio::time::sleep(Duration::from_millis(30)).await;
            log.append(report("1.1.2", 80.0));
        });

        let (a, b) = tokio::join!(
            correlator.await_match(&mut first),
            correlator.await_match(&mut second)
        );
        assert_eq!(a.unwrap().address().as_str(), "1.1.1");
        let b = b.unwrap();
        assert_eq!(b.address().as_str(), "1.1.2");
        assert_eq!(b.brightness(), 80.0);
    }

    #[test]
    fn cached_ignores_age() {
        let correlator = correlator(RetentionPolicy::KeyedLatest);
        correlator.log().append(report("2.2.2", 10.0));
        correlator.log().append(report("2.2.2", 35.0));

        let cached = correlator.cached(&addr("2.2.2")).unwrap();
        assert_eq!(cached.brightness(), 35.0);
        assert!(correlator.cached(&addr("2.2.3")).is_none());
    }
}
