//! Peer resynchronization: the retry queue, the per-peer requester, and the
//! scheduled poller that ties them together.

pub mod poller;
pub mod resend_party_store;
pub mod transaction_requester;
