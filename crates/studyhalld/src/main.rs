//! studyhalld - The study hall background service
//!
//! This is the main entry point for the studyhalld service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Presence board fed by the chat gateway
//! - Study service (sessions, credit, leaderboards)
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use studyhall_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload, API_VERSION,
};
use studyhall_config::{load_config, Settings};
use studyhall_core::{CoreError, StudyService};
use studyhall_ipc::{IpcServer, ServerMessage};
use studyhall_presence::{ChannelSink, PresenceBoard};
use studyhall_store::{SqliteStore, Store};
use studyhall_util::{default_config_path, format_datetime_full, is_mock_time_active, ClientId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long active sessions get to wind down on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// studyhalld - Study session timer and leaderboard service
#[derive(Parser, Debug)]
#[command(name = "studyhalld")]
#[command(about = "Study session timer and leaderboard service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/studyhall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set STUDYHALL_SOCKET env var)
    #[arg(short, long, env = "STUDYHALL_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set STUDYHALL_DATA_DIR env var)
    #[arg(short, long, env = "STUDYHALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Daemon {
    service: Arc<StudyService>,
    board: Arc<PresenceBoard>,
    ipc: Arc<IpcServer>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl Daemon {
    async fn new(args: &Args) -> Result<Self> {
        let settings = if args.config.exists() {
            let settings = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(
                config_path = %args.config.display(),
                organizations = settings.organizations.len(),
                "Configuration loaded"
            );
            settings
        } else {
            warn!(config_path = %args.config.display(), "Config file not found, using defaults");
            Settings::default()
        };

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("studyhall.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        let stats = store.storage_stats().context("Failed to read storage statistics")?;
        info!(
            db_path = %db_path.display(),
            sessions = stats.total_sessions,
            users = stats.total_users,
            disk_mb = format!("{:.2}", stats.disk_usage_mb()),
            "Store initialized"
        );

        let board = Arc::new(PresenceBoard::new());
        let (sink, events) = ChannelSink::new();
        let service = Arc::new(StudyService::new(
            settings,
            store,
            board.clone(),
            Arc::new(sink),
        ));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to start IPC server at {:?}", socket_path))?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            service,
            board,
            ipc: Arc::new(ipc),
            events,
        })
    }

    async fn run(self) -> Result<()> {
        let Self {
            service,
            board,
            ipc,
            mut events,
        } = self;

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Session notifications fan out to subscribed gateways
                Some(event) = events.recv() => {
                    ipc.broadcast_event(event);
                }

                Some(msg) = ipc_messages.recv() => {
                    handle_ipc_message(&service, &board, &ipc, msg).await;
                }
            }
        }

        info!("Shutting down studyhalld");

        let cancelled = service.shutdown(SHUTDOWN_GRACE).await;
        if cancelled > 0 {
            info!(sessions = cancelled, "Active sessions cancelled");
        }

        // Deliver what the sessions emitted while winding down
        while let Ok(event) = events.try_recv() {
            ipc.broadcast_event(event);
        }
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        // Give client writers a moment to flush the shutdown notice
        tokio::time::sleep(Duration::from_millis(100)).await;
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle_ipc_message(
    service: &StudyService,
    board: &PresenceBoard,
    ipc: &IpcServer,
    msg: ServerMessage,
) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            let response = if request.api_version != API_VERSION {
                Response::error(
                    request.request_id,
                    ErrorInfo::new(
                        ErrorCode::InvalidRequest,
                        format!(
                            "unsupported api version {} (expected {})",
                            request.api_version, API_VERSION
                        ),
                    ),
                )
            } else {
                handle_command(service, board, &client_id, request.request_id, request.command)
                    .await
            };

            if let Err(e) = ipc.send_response(&client_id, response).await {
                debug!(client_id = %client_id, error = %e, "Could not deliver response");
            }
        }

        ServerMessage::ClientConnected { client_id } => {
            info!(client_id = %client_id, "Gateway connected");
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Gateway disconnected");
        }
    }
}

fn core_error(request_id: u64, e: CoreError) -> Response {
    Response::error(request_id, ErrorInfo::new(e.code(), e.to_string()))
}

async fn handle_command(
    service: &StudyService,
    board: &PresenceBoard,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    match command {
        Command::StartSession {
            channel_id,
            channel_name,
            study_minutes,
            break_minutes,
        } => {
            match service
                .start_session(channel_id, channel_name, study_minutes, break_minutes)
                .await
            {
                Ok(started) => Response::success(
                    request_id,
                    ResponsePayload::SessionStarted {
                        session_id: started.session_id,
                        channel_id: started.channel_id,
                        participants: started.participants,
                        study_minutes: started.study_minutes,
                        break_minutes: started.break_minutes,
                    },
                ),
                Err(e) => core_error(request_id, e),
            }
        }

        Command::StopSession { channel_id } => match service.stop_session(&channel_id) {
            Ok(session_id) => {
                Response::success(request_id, ResponsePayload::SessionStopping { session_id })
            }
            Err(e) => core_error(request_id, e),
        },

        Command::ListSessions => Response::success(
            request_id,
            ResponsePayload::Sessions(service.list_active_sessions()),
        ),

        Command::GetLeaderboard { month } => match service.get_leaderboard(month) {
            Ok(report) => Response::success(request_id, ResponsePayload::Leaderboard(report)),
            Err(e) => core_error(request_id, e),
        },

        Command::GetStorageStats => match service.get_storage_stats() {
            Ok(stats) => Response::success(request_id, ResponsePayload::StorageStats(stats)),
            Err(e) => core_error(request_id, e),
        },

        Command::SetOrganization {
            user_id,
            username,
            organization,
        } => match service.set_organization(user_id, username, organization) {
            Ok(profile) => Response::success(
                request_id,
                ResponsePayload::OrganizationSet {
                    user_id: profile.user_id,
                    organization: profile.organization,
                },
            ),
            Err(e) => core_error(request_id, e),
        },

        Command::ListOrganizations => Response::success(
            request_id,
            ResponsePayload::Organizations(service.list_organizations()),
        ),

        Command::UpdatePresence {
            channel_id,
            occupants,
        } => match board.update(channel_id.clone(), occupants) {
            Ok(occupant_count) => Response::success(
                request_id,
                ResponsePayload::PresenceUpdated {
                    channel_id,
                    occupant_count,
                },
            ),
            Err(e) => Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::PresenceUnavailable, e.to_string()),
            ),
        },

        Command::SubscribeEvents => Response::success(
            request_id,
            ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            },
        ),

        Command::UnsubscribeEvents => Response::success(request_id, ResponsePayload::Unsubscribed),

        Command::GetHealth => Response::success(request_id, ResponsePayload::Health(service.health())),

        Command::Ping => Response::success(request_id, ResponsePayload::Pong),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "studyhalld starting");

    if is_mock_time_active() {
        warn!(
            now = %format_datetime_full(&studyhall_util::now()),
            "Mock time is active; session records use the mocked wall clock"
        );
    }

    let daemon = Daemon::new(&args).await?;
    daemon.run().await
}
