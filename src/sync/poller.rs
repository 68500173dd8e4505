//! Scheduled orchestrator for one round of peer resynchronization.

use crate::network::client::P2pClient;
use crate::network::discovery::Discovery;
use crate::sync::resend_party_store::ResendPartyStore;
use crate::sync::transaction_requester::TransactionRequester;
use crate::types::{NodeInfo, NodeUri, Party, SyncableParty};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Contacts every outstanding party that needs transactions resent, one
/// round per invocation. Driven by a fixed-interval timer in the daemon.
pub struct SyncPoller {
    resend_party_store: Arc<ResendPartyStore>,
    transaction_requester: Arc<TransactionRequester>,
    discovery: Arc<dyn Discovery>,
    p2p_client: Arc<dyn P2pClient>,
}

impl SyncPoller {
    pub fn new(
        resend_party_store: Arc<ResendPartyStore>,
        transaction_requester: Arc<TransactionRequester>,
        discovery: Arc<dyn Discovery>,
        p2p_client: Arc<dyn P2pClient>,
    ) -> Self {
        Self {
            resend_party_store,
            transaction_requester,
            discovery,
            p2p_client,
        }
    }

    /// One polling round: queue newly-discovered peers, then drain the queue
    /// and fan each party out to its own task. The scheduling thread never
    /// blocks on peer I/O; the returned handles let the driver (or a test)
    /// await the round's completion.
    pub async fn run(&self) -> Vec<JoinHandle<()>> {
        let node_info = self.discovery.get_current();
        let own_uri = NodeUri::parse(&node_info.url).ok();

        let candidates: HashSet<Party> = node_info
            .recipients
            .iter()
            .filter(|recipient| match NodeUri::parse(&recipient.url) {
                Ok(uri) => Some(&uri) != own_uri.as_ref(),
                // unreachable by construction; nothing to contact
                Err(_) => false,
            })
            .map(|recipient| Party::new(recipient.url.clone()))
            .collect();

        tracing::debug!("Sync round: {} candidate peer(s)", candidates.len());
        self.resend_party_store.add_unseen_parties(candidates);

        let mut handles = Vec::new();
        while let Some(party) = self.resend_party_store.get_next_party() {
            let p2p_client = self.p2p_client.clone();
            let requester = self.transaction_requester.clone();
            let store = self.resend_party_store.clone();
            let info = node_info.clone();

            handles.push(tokio::spawn(async move {
                sync_party(p2p_client, requester, store, info, party).await;
            }));
        }
        handles
    }
}

/// Push our node info to the party, then pull everything it holds for us.
/// Any failure, thrown or returned, feeds the bounded-retry bookkeeping;
/// nothing propagates past this task.
async fn sync_party(
    p2p_client: Arc<dyn P2pClient>,
    transaction_requester: Arc<TransactionRequester>,
    resend_party_store: Arc<ResendPartyStore>,
    node_info: NodeInfo,
    party: SyncableParty,
) {
    let url = party.party.url.clone();

    // ensure the target node has us as a recipient before asking for data
    let announced = match p2p_client.send_party_info(&url, &node_info).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("Failed to send node info to {}: {}", url, e);
            false
        }
    };

    if !announced {
        resend_party_store.increment_failed_attempt(party);
        return;
    }

    if !transaction_requester
        .request_all_transactions_from_node(&url)
        .await
    {
        resend_party_store.increment_failed_attempt(party);
    }
}
