//! Coordination backend that elects among candidates in one process

use crate::backend::{Abdication, BackendError, Candidate, CoordinationBackend};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};

struct Leader {
    term: u64,
    candidate: Arc<dyn Candidate>,
}

#[derive(Default)]
struct ElectionState {
    waiting: VecDeque<Arc<dyn Candidate>>,
    leader: Option<Leader>,
    term: u64,
}

impl ElectionState {
    fn is_known(&self, address: &str) -> bool {
        self.leader
            .as_ref()
            .is_some_and(|l| l.candidate.advertised_address() == address)
            || self
                .waiting
                .iter()
                .any(|c| c.advertised_address() == address)
    }

    /// Elect the longest-waiting candidate if nobody leads
    fn promote_next(&mut self) -> Option<(u64, Arc<dyn Candidate>)> {
        if self.leader.is_some() {
            return None;
        }
        let candidate = self.waiting.pop_front()?;
        self.term += 1;
        self.leader = Some(Leader {
            term: self.term,
            candidate: candidate.clone(),
        });
        Some((self.term, candidate))
    }
}

/// Callbacks for every term are delivered under `delivery`, so a candidate
/// never sees `on_defeated` overtaken by the `on_elected` of the same term.
#[derive(Default)]
struct CoordinatorInner {
    state: Mutex<ElectionState>,
    delivery: tokio::sync::Mutex<()>,
}

impl CoordinatorInner {
    fn lock(&self) -> MutexGuard<'_, ElectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, term: u64) -> bool {
        self.lock().leader.as_ref().is_some_and(|l| l.term == term)
    }

    fn announce(self: &Arc<Self>, term: u64, candidate: Arc<dyn Candidate>) {
        info!(term, leader = %candidate.advertised_address(), "Leader elected");
        let inner = self.clone();
        tokio::spawn(async move {
            let _delivery = inner.delivery.lock().await;
            if !inner.is_current(term) {
                debug!(term, leader = %candidate.advertised_address(), "Term ended before announcement, dropped");
                return;
            }
            let abdication = Arc::new(TermAbdication {
                coordinator: Arc::downgrade(&inner),
                term,
            });
            candidate.on_elected(abdication).await;
        });
    }

    /// End the given term; the defeated leader is notified before the next
    /// candidate is elected.
    async fn step_down(self: &Arc<Self>, term: Option<u64>) {
        let (defeated, next) = {
            let mut state = self.lock();
            let matches = state
                .leader
                .as_ref()
                .is_some_and(|l| term.map_or(true, |t| t == l.term));
            if !matches {
                debug!(?term, "Stale step-down ignored");
                return;
            }
            let defeated = state.leader.take().map(|l| l.candidate);
            (defeated, state.promote_next())
        };

        if let Some(defeated) = defeated {
            info!(leader = %defeated.advertised_address(), "Leader stepped down");
            let _delivery = self.delivery.lock().await;
            defeated.on_defeated().await;
        }
        if let Some((term, candidate)) = next {
            self.announce(term, candidate);
        }
    }
}

struct TermAbdication {
    coordinator: Weak<CoordinatorInner>,
    term: u64,
}

#[async_trait]
impl Abdication for TermAbdication {
    async fn abdicate(&self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.step_down(Some(self.term)).await;
        }
    }
}

/// First-come, first-served election between candidates sharing this
/// coordinator.
///
/// Losing leadership ends a candidacy; a candidate has to offer itself again
/// to rejoin the queue. Callbacks are serialized, so a candidate must not
/// wait for its own abdication from inside `on_elected`.
#[derive(Clone, Default)]
pub struct InMemoryCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take leadership away from the current leader, as a lost session would
    pub async fn revoke_leadership(&self) {
        self.inner.step_down(None).await;
    }

    /// Addresses of the candidates waiting behind the leader
    pub fn waiting(&self) -> Vec<String> {
        self.inner
            .lock()
            .waiting
            .iter()
            .map(|c| c.advertised_address())
            .collect()
    }
}

#[async_trait]
impl CoordinationBackend for InMemoryCoordinator {
    async fn offer_leadership(&self, candidate: Arc<dyn Candidate>) -> Result<(), BackendError> {
        let address = candidate.advertised_address();
        let elected = {
            let mut state = self.inner.lock();
            if state.is_known(&address) {
                debug!(address = %address, "Candidate already registered");
                return Ok(());
            }
            debug!(address = %address, "Candidate registered");
            state.waiting.push_back(candidate);
            state.promote_next()
        };

        if let Some((term, candidate)) = elected {
            self.inner.announce(term, candidate);
        }
        Ok(())
    }

    async fn leader_data(&self) -> Option<String> {
        self.inner
            .lock()
            .leader
            .as_ref()
            .map(|l| l.candidate.advertised_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        address: String,
        elected: Mutex<Vec<Arc<dyn Abdication>>>,
        defeated: Mutex<usize>,
        events: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn new(address: &str) -> Arc<Self> {
            Arc::new(Self {
                address: address.to_string(),
                ..Default::default()
            })
        }

        fn elected(&self) -> usize {
            self.elected.lock().unwrap().len()
        }

        fn defeated(&self) -> usize {
            *self.defeated.lock().unwrap()
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }

        fn abdication(&self) -> Arc<dyn Abdication> {
            self.elected.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl Candidate for Recorder {
        fn advertised_address(&self) -> String {
            self.address.clone()
        }

        async fn on_elected(&self, abdication: Arc<dyn Abdication>) {
            self.events.lock().unwrap().push("elected");
            self.elected.lock().unwrap().push(abdication);
        }

        async fn on_defeated(&self) {
            self.events.lock().unwrap().push("defeated");
            *self.defeated.lock().unwrap() += 1;
        }
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_first_candidate_leads() {
        let coordinator = InMemoryCoordinator::new();
        let a = Recorder::new("a:1");
        let b = Recorder::new("b:1");

        coordinator.offer_leadership(a.clone()).await.unwrap();
        coordinator.offer_leadership(b.clone()).await.unwrap();
        coordinator.offer_leadership(b.clone()).await.unwrap();

        let a2 = a.clone();
        eventually(move || a2.elected() == 1).await;
        assert_eq!(b.elected(), 0);
        assert_eq!(coordinator.leader_data().await.as_deref(), Some("a:1"));
        assert_eq!(coordinator.waiting(), vec!["b:1".to_string()]);
    }

    #[tokio::test]
    async fn test_abdication_elects_next() {
        let coordinator = InMemoryCoordinator::new();
        let a = Recorder::new("a:1");
        let b = Recorder::new("b:1");
        coordinator.offer_leadership(a.clone()).await.unwrap();
        coordinator.offer_leadership(b.clone()).await.unwrap();
        let a2 = a.clone();
        eventually(move || a2.elected() == 1).await;

        a.abdication().abdicate().await;

        assert_eq!(a.defeated(), 1);
        let b2 = b.clone();
        eventually(move || b2.elected() == 1).await;
        assert_eq!(coordinator.leader_data().await.as_deref(), Some("b:1"));

        // a second abdication for the finished term changes nothing
        a.abdication().abdicate().await;
        assert_eq!(a.defeated(), 1);
        assert_eq!(b.defeated(), 0);
    }

    #[tokio::test]
    async fn test_revoke_without_waiting_candidates() {
        let coordinator = InMemoryCoordinator::new();
        let a = Recorder::new("a:1");
        coordinator.offer_leadership(a.clone()).await.unwrap();
        let a2 = a.clone();
        eventually(move || a2.elected() == 1).await;

        coordinator.revoke_leadership().await;

        assert_eq!(a.defeated(), 1);
        assert_eq!(coordinator.leader_data().await, None);

        coordinator.offer_leadership(a.clone()).await.unwrap();
        let a2 = a.clone();
        eventually(move || a2.elected() == 2).await;
    }

    #[tokio::test]
    async fn test_revoke_before_announcement_drops_stale_election() {
        let coordinator = InMemoryCoordinator::new();
        let a = Recorder::new("a:1");
        let b = Recorder::new("b:1");
        coordinator.offer_leadership(a.clone()).await.unwrap();
        coordinator.offer_leadership(b.clone()).await.unwrap();

        coordinator.revoke_leadership().await;

        let b2 = b.clone();
        eventually(move || b2.elected() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(a.elected(), 0);
        assert_eq!(a.defeated(), 1);
        assert_eq!(coordinator.leader_data().await.as_deref(), Some("b:1"));
        assert!(coordinator.waiting().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_defeat_is_never_followed_by_election_of_same_term() {
        for round in 0..20 {
            let coordinator = InMemoryCoordinator::new();
            let a = Recorder::new("a:1");
            let b = Recorder::new("b:1");
            coordinator.offer_leadership(a.clone()).await.unwrap();
            coordinator.offer_leadership(b.clone()).await.unwrap();
            if round % 2 == 0 {
                tokio::task::yield_now().await;
            }

            coordinator.revoke_leadership().await;

            let b2 = b.clone();
            eventually(move || b2.elected() == 1).await;
            tokio::time::sleep(Duration::from_millis(5)).await;

            let events = a.events();
            assert!(
                events == vec!["defeated"] || events == vec!["elected", "defeated"],
                "round {round}: {events:?}"
            );
        }
    }
}
