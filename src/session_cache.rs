use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::{
    data_types::samad_data_types::Credentials,
    errors::SelfServiceError,
    selfservice::{login, CaptchaSolver, PortalConfig, Session},
};

pub type SharedSession = Arc<Mutex<Session>>;

struct CachedSession {
    session: SharedSession,
    credentials: Credentials,
    last_used: Instant,
}

/// Logged in portal sessions per chat, so that a burst of commands costs one captcha.
#[derive(Clone)]
pub struct SessionCache {
    portal: PortalConfig,
    solver: Arc<dyn CaptchaSolver>,
    ttl: Duration,
    sessions: Arc<Mutex<HashMap<i64, CachedSession>>>,
}

impl SessionCache {
    pub fn new(portal: PortalConfig, solver: Arc<dyn CaptchaSolver>, ttl: Duration) -> Self {
        SessionCache {
            portal,
            solver,
            ttl,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    /// The cached session of `chat_id`, or a fresh login if there is none or it belongs to
    /// other credentials.
    pub async fn get_or_login(
        &self,
        chat_id: i64,
        credentials: &Credentials,
    ) -> Result<SharedSession, SelfServiceError> {
        if let Some(cached) = self.sessions.lock().await.get_mut(&chat_id) {
            if cached.credentials == *credentials {
                cached.last_used = Instant::now();
                return Ok(cached.session.clone());
            }
        }

        // no lock held while logging in, other chats keep working
        let session = login(
            &self.portal,
            self.solver.clone(),
            &credentials.student_id,
            &credentials.password,
        )
        .await?;
        let session = Arc::new(Mutex::new(session));

        self.sessions.lock().await.insert(
            chat_id,
            CachedSession {
                session: session.clone(),
                credentials: credentials.clone(),
                last_used: Instant::now(),
            },
        );

        Ok(session)
    }

    pub async fn evict(&self, chat_id: i64) {
        if self.sessions.lock().await.remove(&chat_id).is_some() {
            log::debug!("Evicted session of {}", chat_id);
        }
    }

    /// Drops sessions idle for longer than the ttl, returns how many.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, cached| cached.last_used.elapsed() < self.ttl);

        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
