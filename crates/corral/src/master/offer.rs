use chrono::{DateTime, Utc};

use crate::resources::ResourceSet;
use crate::{AgentId, FrameworkId, Map, OfferId, Set};

/// Immutable snapshot of resources proposed to one framework on one agent.
/// An offer is never mutated after it is issued; a ledger change that could
/// affect it must rescind it first.
#[derive(Debug, Clone)]
pub struct Offer {
    pub id: OfferId,
    pub framework_id: FrameworkId,
    pub agent_id: AgentId,
    pub resources: ResourceSet,
    pub created: DateTime<Utc>,
}

/// Live offers, indexed by id and by agent.
#[derive(Default)]
pub struct OfferTracker {
    offers: Map<OfferId, Offer>,
    agent_offers: Map<AgentId, Set<OfferId>>,
}

impl OfferTracker {
    pub fn record(&mut self, offer: Offer) {
        self.agent_offers
            .entry(offer.agent_id)
            .or_default()
            .insert(offer.id);
        assert!(self.offers.insert(offer.id, offer).is_none());
    }

    /// Removes an offer and returns its snapshot. Rescinding an id that is
    /// already gone is a no-op, tolerating races with accept/decline.
    pub fn rescind(&mut self, offer_id: OfferId) -> Option<Offer> {
        let offer = self.offers.remove(&offer_id)?;
        if let Some(ids) = self.agent_offers.get_mut(&offer.agent_id) {
            ids.remove(&offer_id);
            if ids.is_empty() {
                self.agent_offers.remove(&offer.agent_id);
            }
        }
        Some(offer)
    }

    pub fn get(&self, offer_id: OfferId) -> Option<&Offer> {
        self.offers.get(&offer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Offer> {
        self.offers.values()
    }

    /// Ids of all outstanding offers on an agent, in issue order.
    pub fn offers_for(&self, agent_id: AgentId) -> Vec<OfferId> {
        let mut ids: Vec<OfferId> = self
            .agent_offers
            .get(&agent_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
