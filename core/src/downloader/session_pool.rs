//! Session (HTTP client) assignment policy for segment workers (§4.2
//! "Session policy"), grounded on the teacher's single shared `Arc<Client>`
//! in `MultipartDownloadStrategy`, generalized into three explicit modes.

use reqwest::Client;

pub enum SessionPool {
    /// All workers share one client.
    Shared(Client),
    /// A fixed-size pool, round-robin-assigned; slots are never closed early.
    Pooled(Vec<Client>),
    /// Each worker gets a fresh client, dropped (closed) when it's done with it.
    PerWorker,
}

impl SessionPool {
    pub fn new(multi_session: bool, pool_size: Option<usize>) -> Self {
        if !multi_session {
            return SessionPool::Shared(build_client());
        }
        match pool_size {
            Some(k) if k > 0 => SessionPool::Pooled((0..k).map(|_| build_client()).collect()),
            _ => SessionPool::PerWorker,
        }
    }

    /// Client to use for the `index`-th worker out of `total`.
    pub fn client_for(&self, index: usize) -> Client {
        match self {
            SessionPool::Shared(c) => c.clone(),
            SessionPool::Pooled(pool) => pool[index % pool.len()].clone(),
            SessionPool::PerWorker => build_client(),
        }
    }
}

fn build_client() -> Client {
    Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .tcp_nodelay(true)
        .build()
        .expect("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_mode_is_selected_when_multi_session_is_false() {
        let pool = SessionPool::new(false, None);
        assert!(matches!(pool, SessionPool::Shared(_)));
    }

    #[test]
    fn pooled_mode_round_robins() {
        let pool = SessionPool::new(true, Some(2));
        match pool {
            SessionPool::Pooled(ref clients) => assert_eq!(clients.len(), 2),
            _ => panic!("expected pooled session"),
        }
    }

    #[test]
    fn no_pool_size_falls_back_to_per_worker() {
        let pool = SessionPool::new(true, None);
        assert!(matches!(pool, SessionPool::PerWorker));
    }
}
