//! Scripted stand-ins for the exchange server and the peer connection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use cradle_proto::{Answer, Envelope, ExchangeKind, Offer, StoreStatus, VersionInfo};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::LinkError;
use crate::peer::{GatheringState, NegotiationPeer};
use crate::signaling::ExchangeApi;

/// In-memory exchange that follows the server's slot rules.
///
/// Reads can be scripted per kind (consumed first) or pinned (returned forever).
#[derive(Default)]
pub struct FakeExchange {
    offer: Mutex<Option<Offer>>,
    answer: Mutex<Option<Answer>>,
    stored: Mutex<Vec<Envelope>>,
    scripted: Mutex<HashMap<ExchangeKind, VecDeque<Result<Option<Envelope>, ()>>>>,
    pinned: Mutex<HashMap<ExchangeKind, Envelope>>,
    failing_stores: AtomicUsize,
    build_id: Mutex<Option<String>>,
    seen_last_update: Mutex<Vec<String>>,
}

impl FakeExchange {
    pub fn script(&self, kind: ExchangeKind, steps: Vec<Result<Option<Envelope>, ()>>) {
        self.scripted.lock().entry(kind).or_default().extend(steps);
    }

    pub fn pin(&self, kind: ExchangeKind, envelope: Envelope) {
        self.pinned.lock().insert(kind, envelope);
    }

    pub fn fail_stores(&self, count: usize) {
        self.failing_stores.store(count, Ordering::SeqCst);
    }

    pub fn serve_build(&self, build_id: &str) {
        *self.build_id.lock() = Some(build_id.to_string());
    }

    pub fn stored(&self) -> Vec<Envelope> {
        self.stored.lock().clone()
    }

    pub fn clear_count(&self) -> usize {
        self.stored
            .lock()
            .iter()
            .filter(|envelope| **envelope == Envelope::Clear)
            .count()
    }

    pub fn seen_last_update(&self) -> Vec<String> {
        self.seen_last_update.lock().clone()
    }

    pub fn current_answer(&self) -> Option<Answer> {
        self.answer.lock().clone()
    }
}

#[async_trait]
impl ExchangeApi for FakeExchange {
    async fn store(&self, envelope: &Envelope) -> Result<StoreStatus, LinkError> {
        let pending = self.failing_stores.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_stores.store(pending - 1, Ordering::SeqCst);
            return Err(LinkError::Rejected {
                status: 503,
                error: "unavailable".into(),
            });
        }
        self.stored.lock().push(envelope.clone());
        let status = match envelope {
            Envelope::Clear => {
                *self.offer.lock() = None;
                *self.answer.lock() = None;
                StoreStatus::ExchangeCleared
            }
            Envelope::Offer(offer) => {
                *self.offer.lock() = Some(offer.clone());
                *self.answer.lock() = None;
                StoreStatus::OfferStored
            }
            Envelope::Answer(answer) => {
                *self.answer.lock() = Some(answer.clone());
                StoreStatus::AnswerStored
            }
        };
        Ok(status)
    }

    async fn load(&self, kind: ExchangeKind) -> Result<Option<Envelope>, LinkError> {
        let step = self
            .scripted
            .lock()
            .get_mut(&kind)
            .and_then(|steps| steps.pop_front());
        if let Some(step) = step {
            return step.map_err(|()| LinkError::Rejected {
                status: 500,
                error: "scripted failure".into(),
            });
        }
        if let Some(pinned) = self.pinned.lock().get(&kind) {
            return Ok(Some(pinned.clone()));
        }
        Ok(match kind {
            ExchangeKind::Offer => self.offer.lock().clone().map(Envelope::Offer),
            ExchangeKind::Answer => self.answer.lock().clone().map(Envelope::Answer),
        })
    }

    async fn version(&self, last_update: &str) -> Result<VersionInfo, LinkError> {
        self.seen_last_update.lock().push(last_update.to_string());
        let build_id = self.build_id.lock().clone().ok_or(LinkError::Rejected {
            status: 503,
            error: "offline".into(),
        })?;
        Ok(VersionInfo {
            app_name: "baby-monitor".into(),
            is_updated: last_update != build_id,
            last_update: build_id,
        })
    }
}

/// Peer that records every negotiation step instead of talking to a network.
pub struct FakePeer {
    gathering: watch::Sender<GatheringState>,
    local: Mutex<Option<String>>,
    remote_offers: Mutex<Vec<String>>,
    remote_answers: Mutex<Vec<String>>,
    parent_id: Mutex<Option<String>>,
    fail_apply: AtomicBool,
    closes: AtomicUsize,
}

impl FakePeer {
    fn with_gathering(state: GatheringState) -> Self {
        Self {
            gathering: watch::channel(state).0,
            local: Mutex::new(None),
            remote_offers: Mutex::new(Vec::new()),
            remote_answers: Mutex::new(Vec::new()),
            parent_id: Mutex::new(None),
            fail_apply: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn completed() -> Self {
        Self::with_gathering(GatheringState::Complete)
    }

    /// Gathering starts but never completes.
    pub fn stalled() -> Self {
        Self::with_gathering(GatheringState::Gathering)
    }

    pub fn fail_remote_answers(&self) {
        self.fail_apply.store(true, Ordering::SeqCst);
    }

    pub fn applied_answers(&self) -> Vec<String> {
        self.remote_answers.lock().clone()
    }

    pub fn applied_offers(&self) -> Vec<String> {
        self.remote_offers.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NegotiationPeer for FakePeer {
    async fn create_local_offer(&self) -> Result<(), LinkError> {
        *self.local.lock() = Some("local-offer".into());
        Ok(())
    }

    async fn create_local_answer(&self) -> Result<(), LinkError> {
        if self.remote_offers.lock().is_empty() {
            return Err(LinkError::Peer("no remote offer".into()));
        }
        *self.local.lock() = Some("local-answer".into());
        Ok(())
    }

    async fn apply_remote_offer(&self, sdp: &str) -> Result<(), LinkError> {
        self.remote_offers.lock().push(sdp.to_string());
        Ok(())
    }

    async fn apply_remote_answer(&self, sdp: &str) -> Result<(), LinkError> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(LinkError::Peer("rejected remote answer".into()));
        }
        self.remote_answers.lock().push(sdp.to_string());
        Ok(())
    }

    async fn local_sdp(&self) -> Result<String, LinkError> {
        self.local
            .lock()
            .clone()
            .ok_or(LinkError::MissingLocalDescription)
    }

    async fn has_remote_description(&self) -> bool {
        !self.remote_answers.lock().is_empty() || !self.remote_offers.lock().is_empty()
    }

    fn gathering(&self) -> watch::Receiver<GatheringState> {
        self.gathering.subscribe()
    }

    fn set_parent_id(&self, parent_id: Option<String>) {
        *self.parent_id.lock() = parent_id;
    }

    fn parent_id(&self) -> Option<String> {
        self.parent_id.lock().clone()
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
