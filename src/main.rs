use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Parser;
use futures::future::join_all;
use thiserror::Error;

use crate::api::middleware::MiddlewareErr;
use crate::api::middleware::auth::{TokenSigner, TokenSubject};
use crate::api::server::{AppState, start_server};
use crate::args::{Cli, Command, SubjectKind};
use crate::booking::Lifecycle;
use crate::db::prelude::{MemoryStore, PgStore, Store, StoreError, db_pool};
use crate::events::EventQueue;
use crate::events::dispatch::Dispatcher;
use crate::events::push::{LogTransport, PushError, PushTransport, WebPushGateway};
use crate::util::env::{self, EnvErr, StorageBackend, Var};
use crate::util::telemetry;

mod api;
mod args;
mod booking;
mod constants;
mod db;
mod events;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareErr),

    #[error(transparent)]
    Push(#[from] PushError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::IssueToken { kind, id, ttl_secs } => {
            let signer = TokenSigner::new(var!(Var::AuthTokenSecret).await?);
            let subject = match kind {
                SubjectKind::User => TokenSubject::User(id.into()),
                SubjectKind::Employee => TokenSubject::Employee(id.into()),
            };

            println!("{}", signer.issue(subject, Utc::now() + Duration::seconds(ttl_secs)));
            Ok(())
        }
    }
}

async fn serve() -> Result<()> {
    let env = env::env().await?;
    let telemetry_registry = telemetry::Telemetry::new(env).await?.register();

    tracing::info!(backend = ?env.storage_backend, "starting salonbook api");

    let store: Arc<dyn Store> = match env.storage_backend {
        StorageBackend::Postgres => Arc::new(PgStore::new(db_pool().await?)),
        StorageBackend::Memory => match env.seed_file.as_deref() {
            Some(path) => Arc::new(MemoryStore::from_seed_file(path).await?),
            None => Arc::new(MemoryStore::new()),
        },
    };

    let transport: Arc<dyn PushTransport> = match env.push_gateway_url.as_deref() {
        Some(url) => Arc::new(WebPushGateway::new(url)?),
        None => Arc::new(LogTransport),
    };

    let (events, rx_events) = EventQueue::new();
    let dispatcher_handle = Dispatcher::new(store.clone(), transport).spawn(rx_events);

    let state = Arc::new(AppState {
        lifecycle: Lifecycle::new(store.clone(), events),
        store,
        signer: TokenSigner::new(var!(Var::AuthTokenSecret).await?),
    });

    let cors = api::middleware::cors().await?;
    let (tx_server_ready, rx_server_ready) = tokio::sync::mpsc::unbounded_channel::<SocketAddr>();

    let mut handles = start_server(
        state,
        cors,
        env.server_api_port,
        tx_server_ready,
        rx_server_ready,
    )
    .await;
    handles.push(dispatcher_handle);

    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}
