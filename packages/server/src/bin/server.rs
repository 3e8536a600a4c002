//! Participant matching chat server.
//!
//! Pairs anonymous participants into chat rooms, relays messages over
//! WebSocket, and injects a delayed automated participant when enabled.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tsunagi-server
//! cargo run --bin tsunagi-server -- --host 0.0.0.0 --port 3000
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;

use tsunagi_server::{
    domain::{
        AgentRegistry, ContextRegistry, ConversationStore, MatchQueue, MessagePusher,
        ReplyGenerator, RoomRegistry,
    },
    infrastructure::{
        ConfigStore, ContextArchive, InMemoryConversationStore, OpenAiConfig,
        OpenAiReplyGenerator, WebSocketMessagePusher,
    },
    ui::{AppState, Server},
    usecase::{
        AdminUseCase, ConnectParticipantUseCase, DisconnectParticipantUseCase, EndRoomUseCase,
        JoinQueueUseCase, LeaveQueueUseCase, ReplyScheduler, RoomQueryUseCase, SendMessageUseCase,
    },
};
use tsunagi_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Participant matching chat server with delayed automated replies", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Path to the admin configuration JSON file
    #[arg(long, default_value = "config/admin_config.json")]
    config_path: PathBuf,

    /// Directory for archived conversation snapshots
    #[arg(long, default_value = "conversations")]
    archive_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_PKG_NAME"), env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. Shared state (registry, queue, contexts, agents)
    // 2. Config store
    // 3. Infrastructure (store, pusher, generator, archive)
    // 4. ReplyScheduler
    // 5. UseCases
    // 6. AppState + Server

    // 1. Shared mutable state, each behind its own lock
    let registry = Arc::new(Mutex::new(RoomRegistry::new()));
    let queue = Arc::new(Mutex::new(MatchQueue::new()));
    let contexts = Arc::new(Mutex::new(ContextRegistry::new()));
    let agents = Arc::new(Mutex::new(AgentRegistry::new()));

    // 2. Admin configuration with file persistence
    let config = Arc::new(ConfigStore::load_or_default(args.config_path).await);
    {
        let snapshot = config.snapshot().await;
        tracing::info!(
            "admin configuration: group_size={}, duration={}m, bot_enabled={}, bot_delay={}s, bot_name='{}'",
            snapshot.group_size,
            snapshot.duration,
            snapshot.bot_enabled,
            snapshot.bot_delay,
            snapshot.bot_name
        );
    }

    // 3. Infrastructure implementations of the domain interfaces
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    let pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
    let generator: Arc<dyn ReplyGenerator> = match OpenAiConfig::from_env() {
        Some(openai_config) => Arc::new(OpenAiReplyGenerator::new(openai_config)),
        None => {
            tracing::warn!(
                "OPENAI_API_KEY not set; automated replies will use fixed fallback responses"
            );
            Arc::new(OpenAiReplyGenerator::new(OpenAiConfig::new("")))
        }
    };
    let archive = Arc::new(ContextArchive::new(args.archive_dir));

    // 4. Delayed reply scheduler
    let scheduler = Arc::new(ReplyScheduler::new(
        registry.clone(),
        contexts.clone(),
        agents.clone(),
        config.clone(),
        store.clone(),
        pusher.clone(),
        generator,
    ));

    // 5. UseCases
    let join_queue_usecase = Arc::new(JoinQueueUseCase::new(
        registry.clone(),
        queue.clone(),
        config.clone(),
        store.clone(),
    ));
    let leave_queue_usecase = Arc::new(LeaveQueueUseCase::new(queue.clone()));
    let connect_participant_usecase = Arc::new(ConnectParticipantUseCase::new(
        registry.clone(),
        agents.clone(),
        config.clone(),
        store.clone(),
        pusher.clone(),
    ));
    let disconnect_participant_usecase = Arc::new(DisconnectParticipantUseCase::new(
        registry.clone(),
        pusher.clone(),
    ));
    let send_message_usecase = Arc::new(SendMessageUseCase::new(
        registry.clone(),
        contexts.clone(),
        config.clone(),
        store.clone(),
        pusher.clone(),
        scheduler,
    ));
    let end_room_usecase = Arc::new(EndRoomUseCase::new(
        registry.clone(),
        contexts.clone(),
        agents.clone(),
        pusher.clone(),
        archive.clone(),
    ));
    let room_query_usecase = Arc::new(RoomQueryUseCase::new(
        registry.clone(),
        contexts.clone(),
        store.clone(),
    ));
    let admin_usecase = Arc::new(AdminUseCase::new(
        config.clone(),
        registry.clone(),
        contexts.clone(),
        agents.clone(),
        join_queue_usecase.clone(),
        end_room_usecase.clone(),
        archive,
    ));

    // 6. Wire the state and run the server
    let state = AppState {
        join_queue_usecase,
        leave_queue_usecase,
        connect_participant_usecase,
        disconnect_participant_usecase,
        send_message_usecase,
        end_room_usecase,
        room_query_usecase,
        admin_usecase,
    };
    let server = Server::new(state);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
