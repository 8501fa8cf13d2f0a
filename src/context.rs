use std::sync::Arc;

use crate::auth::AuthManager;
use crate::cache::MessageCache;
use crate::config::Config;
use crate::db::DbPool;
use crate::gateway::ChatGateway;
use crate::kafka::EventProducer;
use crate::presence::PresenceRegistry;
use crate::rate_limit::RateLimiter;
use crate::services::{MessageService, RoomService, UserService};
use crate::store::KeyedStore;
use crate::tokens::TokenDenylist;

/// Shared dependencies handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub store: KeyedStore,
    pub auth: Arc<AuthManager>,
    pub denylist: TokenDenylist,
    pub limiter: RateLimiter,
    pub presence: PresenceRegistry,
    pub cache: MessageCache,
    pub producer: EventProducer,
    pub users: UserService,
    pub rooms: RoomService,
    pub messages: MessageService,
    pub gateway: Arc<ChatGateway>,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        pool: DbPool,
        store: KeyedStore,
        producer: EventProducer,
    ) -> Self {
        let auth = Arc::new(AuthManager::new(&config));
        let denylist = TokenDenylist::new(store.clone());
        let limiter = RateLimiter::new(store.clone());
        let presence = PresenceRegistry::new(store.clone());
        let cache = MessageCache::new(store.clone());

        let users = UserService::new(pool.clone());
        let rooms = RoomService::new(pool.clone());
        let messages = MessageService::new(
            pool.clone(),
            limiter.clone(),
            cache.clone(),
            producer.clone(),
        );

        let gateway = Arc::new(ChatGateway::new(
            Arc::clone(&auth),
            denylist.clone(),
            presence.clone(),
            limiter.clone(),
            pool.clone(),
            messages.clone(),
            rooms.clone(),
        ));

        Self {
            config,
            pool,
            store,
            auth,
            denylist,
            limiter,
            presence,
            cache,
            producer,
            users,
            rooms,
            messages,
            gateway,
        }
    }
}
