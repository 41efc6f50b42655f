//! Shared signing key store with snapshot reads.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::RwLock;
// self
use crate::{_prelude::*, keys::fetch::SigningKey};

/// Immutable view of the key store at one point in time.
#[derive(Clone, Debug, Default)]
pub struct KeySnapshot {
	/// Validated keys indexed by key identifier.
	pub keys: HashMap<String, Arc<SigningKey>>,
	/// When the most recent merge completed.
	pub updated_at: Option<DateTime<Utc>>,
}
impl KeySnapshot {
	/// Look up a key by identifier.
	pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
		self.keys.get(kid).cloned()
	}

	/// Number of keys held.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Whether the snapshot holds no keys.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

/// Signing keys shared between the key fetcher and verification callers.
///
/// Writers build a new map and swap it in; readers clone the current `Arc`, so a reader sees
/// either the state before a merge or after it, never an intermediate one.
#[derive(Debug, Default)]
pub struct KeyStore {
	current: RwLock<Arc<KeySnapshot>>,
}
impl KeyStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Capture the current contents.
	pub async fn snapshot(&self) -> Arc<KeySnapshot> {
		self.current.read().await.clone()
	}

	/// Look up a key by identifier.
	pub async fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
		self.snapshot().await.get(kid)
	}

	/// Merge validated keys, replacing entries with the same identifier and keeping the rest.
	///
	/// Returns the number of keys held after the merge.
	pub async fn merge(&self, keys: Vec<SigningKey>) -> usize {
		let mut current = self.current.write().await;
		let mut next = KeySnapshot { keys: current.keys.clone(), updated_at: Some(Utc::now()) };

		for key in keys {
			next.keys.insert(key.key_id.clone(), Arc::new(key));
		}

		let len = next.len();

		*current = Arc::new(next);

		len
	}
}
