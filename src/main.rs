//! MCP server for MongoDB.
//!
//! Run with `mongo-mcp mongodb://localhost:27017/mydb` or add `--read-only`
//! to reject writes.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mongo_mcp::{McpServer, McpSession, MongoGateway, NormalizationMode, ServerConfig};

/// MCP server for MongoDB.
///
/// Exposes MongoDB operations as MCP tools for AI agents.
/// Communicates via JSON-RPC 2.0 over stdin/stdout.
#[derive(Parser)]
#[command(name = "mongo-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// MongoDB connection string.
    #[arg(value_name = "URI", env = "MCP_MONGODB_URI")]
    uri: String,

    /// Database to use. Defaults to the database named in the URI.
    #[arg(long, value_name = "NAME")]
    database: Option<String>,

    /// Reject update, insert and createIndex, and prefer secondaries for reads.
    #[arg(long, env = "MCP_MONGODB_READONLY")]
    read_only: bool,

    /// How string arguments are turned into ObjectIds: auto, none or force.
    #[arg(long, value_name = "MODE", default_value = "auto", env = "MCP_MONGODB_OBJECTID_MODE")]
    object_id_mode: String,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Set up logging
    if args.verbose {
        let filter = EnvFilter::from_default_env()
            .add_directive("mongo_mcp=debug".parse().expect("static directive"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let object_id_mode: NormalizationMode = match args.object_id_mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: --object-id-mode: {}", e);
            std::process::exit(1);
        }
    };

    // Connect to the database
    let gateway =
        match MongoGateway::connect(&args.uri, args.database.as_deref(), args.read_only).await {
            Ok(gateway) => Arc::new(gateway),
            Err(e) => {
                eprintln!("Error: Failed to connect to MongoDB: {}", e);
                std::process::exit(1);
            }
        };

    tracing::info!(database = gateway.database_name(), "serving MCP over stdio");

    // Create session and server
    let config = ServerConfig {
        read_only: args.read_only,
        object_id_mode,
    };
    let session = McpSession::new(gateway.clone(), config);
    let mut server = McpServer::new(session);

    // Run the server
    let result = server.run().await;
    server.shutdown_token().cancel();
    drop(server);

    // The server held the only other reference to the gateway.
    if let Ok(gateway) = Arc::try_unwrap(gateway) {
        gateway.shutdown().await;
    }

    if let Err(e) = result {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}
