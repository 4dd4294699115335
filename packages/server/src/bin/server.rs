//! Ephemeral room-scoped messaging server.
//!
//! Rooms live in a shared store with a TTL, messages travel through a
//! per-room pub/sub channel, and each instance relays them to its own
//! WebSocket connections.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin utakata-server
//! cargo run --bin utakata-server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;

use utakata_server::{
    infrastructure::{ConnectionRegistry, InMemoryBroker, InMemoryRoomStore},
    ui::Server,
    usecase::{
        CloseRoomUseCase, ConnectUseCase, CreateRoomUseCase, DisconnectUseCase,
        GetRoomDetailUseCase, PublishMessageUseCase, RoomRelay,
    },
};
use utakata_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Ephemeral room-scoped messaging server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. Store and broker (shared collaborators)
    // 2. Connection registry and relay (per-instance state)
    // 3. UseCases
    // 4. Server

    // 1. Create the shared room store and message broker
    let store: Arc<dyn utakata_server::domain::RoomStore> = Arc::new(InMemoryRoomStore::new());
    let broker: Arc<dyn utakata_server::domain::MessageBroker> = Arc::new(InMemoryBroker::new());

    // 2. Create this instance's connection registry and relay manager
    let registry = Arc::new(ConnectionRegistry::new());
    let relay = Arc::new(RoomRelay::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::clone(&broker),
    ));

    // 3. Create UseCases
    let connect_usecase = Arc::new(ConnectUseCase::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&relay),
        Arc::clone(&broker),
    ));
    let disconnect_usecase = Arc::new(DisconnectUseCase::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&relay),
        Arc::clone(&broker),
    ));
    let publish_message_usecase = Arc::new(PublishMessageUseCase::new(
        Arc::clone(&store),
        Arc::clone(&broker),
    ));
    let create_room_usecase = Arc::new(CreateRoomUseCase::new(Arc::clone(&store)));
    let get_room_detail_usecase = Arc::new(GetRoomDetailUseCase::new(Arc::clone(&store)));
    let close_room_usecase = Arc::new(CloseRoomUseCase::new(
        Arc::clone(&store),
        Arc::clone(&broker),
    ));

    // 4. Create and run the server
    let server = Server::new(
        connect_usecase,
        disconnect_usecase,
        publish_message_usecase,
        create_room_usecase,
        get_room_detail_usecase,
        close_room_usecase,
    );
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
